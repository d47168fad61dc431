//! The realm: credential verification and security constraint lookup.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, StatusCode, header::HOST, header::LOCATION},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::constraint::{SecurityConstraint, TransportGuarantee, required_transport};
use crate::exchange::Exchange;
use crate::principal::Principal;

/// Outcome of a transport (user data) permission check.
#[derive(Debug)]
pub enum UserDataPermission {
    Granted,
    /// Denied; the response (redirect to HTTPS or 403) must be sent as-is.
    Denied(Response),
}

impl UserDataPermission {
    pub fn is_granted(&self) -> bool {
        matches!(self, UserDataPermission::Granted)
    }
}

/// Source of users, roles and security constraints.
#[async_trait]
pub trait Realm: Send + Sync {
    /// Verify a username and password.
    async fn authenticate(&self, username: &str, password: &str) -> Option<Principal>;

    /// Constraints covering `uri` for `method`.
    async fn find_security_constraints(&self, uri: &str, method: &Method)
    -> Vec<SecurityConstraint>;

    /// HTTPS port plain HTTP requests are redirected to, if any.
    fn redirect_port(&self) -> Option<u16> {
        None
    }

    /// Check the transport guarantee of `constraints` against the connection.
    fn has_user_data_permission(
        &self,
        exchange: &Exchange,
        constraints: &[SecurityConstraint],
    ) -> UserDataPermission {
        if exchange.is_secure() {
            return UserDataPermission::Granted;
        }
        if required_transport(constraints) == TransportGuarantee::None {
            return UserDataPermission::Granted;
        }

        let Some(port) = self.redirect_port() else {
            debug!(uri = exchange.request_uri(), "Confidential transport required, no redirect port");
            return UserDataPermission::Denied(StatusCode::FORBIDDEN.into_response());
        };

        let host = exchange
            .request()
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| exchange.request().uri().host())
            .unwrap_or("localhost");
        let host = strip_port(host);

        let mut location = if port == 443 {
            format!("https://{host}{}", exchange.request_uri())
        } else {
            format!("https://{host}:{port}{}", exchange.request_uri())
        };
        if let Some(query) = exchange.query_string() {
            location.push('?');
            location.push_str(query);
        }
        debug!(location, "Redirecting to confidential transport");

        let response = Response::builder()
            .status(StatusCode::FOUND)
            .header(LOCATION, location)
            .body(Body::empty())
            .unwrap_or_else(|_| StatusCode::FORBIDDEN.into_response());
        UserDataPermission::Denied(response)
    }

    /// Check the authorization constraints of `constraints` against a principal.
    fn has_resource_permission(
        &self,
        principal: Option<&Principal>,
        constraints: &[SecurityConstraint],
    ) -> bool {
        for constraint in constraints {
            let Some(roles) = constraint.roles() else {
                continue;
            };
            let Some(principal) = principal else {
                return false;
            };
            if roles.iter().any(|r| r == "*") {
                continue;
            }
            if !roles.iter().any(|r| principal.has_role(r)) {
                return false;
            }
        }
        true
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 keeps its colons
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}
