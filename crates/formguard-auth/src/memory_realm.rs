//! In-memory realm backed by configured users and constraints.
//!
//! # Security
//!
//! Password comparison uses constant-time comparison to prevent timing attacks.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::Method;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::constraint::{SecurityConstraint, find_matching};
use crate::principal::Principal;
use crate::realm::Realm;

#[derive(Debug, Clone)]
struct User {
    password: String,
    roles: Vec<String>,
}

/// Realm holding users and constraints in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRealm {
    users: HashMap<String, User>,
    constraints: Vec<SecurityConstraint>,
    redirect_port: Option<u16>,
}

impl MemoryRealm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, replacing any existing user with the same name.
    pub fn with_user<I, S>(mut self, username: impl Into<String>, password: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users.insert(
            username.into(),
            User {
                password: password.into(),
                roles: roles.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    pub fn with_constraint(mut self, constraint: SecurityConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = Some(port);
        self
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn constraints(&self) -> &[SecurityConstraint] {
        &self.constraints
    }
}

/// Compare two strings in constant time.
///
/// Unequal lengths still run a comparison so the timing does not reveal
/// how much of the password matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() == b_bytes.len() {
        a_bytes.ct_eq(b_bytes).into()
    } else {
        let _ = a_bytes.ct_eq(a_bytes);
        false
    }
}

#[async_trait]
impl Realm for MemoryRealm {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let Some(user) = self.users.get(username) else {
            // Same work as a wrong password
            let _ = constant_time_eq(password, password);
            debug!(username, "Unknown user");
            return None;
        };

        if constant_time_eq(password, &user.password) {
            Some(Principal::new(username).with_roles(user.roles.iter().cloned()))
        } else {
            debug!(username, "Password mismatch");
            None
        }
    }

    async fn find_security_constraints(
        &self,
        uri: &str,
        method: &Method,
    ) -> Vec<SecurityConstraint> {
        find_matching(&self.constraints, uri, method)
            .into_iter()
            .cloned()
            .collect()
    }

    fn redirect_port(&self) -> Option<u16> {
        self.redirect_port
    }
}
