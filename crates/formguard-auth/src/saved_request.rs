//! Saving a request across the login detour and replaying it afterwards.
//!
//! When an unauthenticated client hits a protected resource, its request is
//! captured into the session before the login page is served. Once the
//! client authenticates and is redirected back to the original URI, the
//! captured request replaces the redirected GET so the application sees the
//! original method, headers, cookies, locales and body.

use axum::{
    body::{Body, Bytes},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method,
        header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, IF_MODIFIED_SINCE, IF_NONE_MATCH},
    },
};
use formguard_session::SessionId;
use tracing::debug;

use crate::cookies::{RequestCookie, RequestCookies, cookie_header_value};
use crate::error::{FormAuthError, Result};
use crate::exchange::{Exchange, FORM_URLENCODED};
use crate::locale::RequestLocales;
use crate::state::AuthSessions;

/// Request headers in arrival order, values grouped per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedHeaders {
    entries: Vec<(HeaderName, Vec<HeaderValue>)>,
}

impl SavedHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let entries = headers
            .keys()
            .map(|name| (name.clone(), headers.get_all(name).iter().cloned().collect()))
            .collect();
        Self { entries }
    }

    /// Values of `name` in arrival order.
    pub fn values(&self, name: &HeaderName) -> &[HeaderValue] {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &[HeaderValue])> {
        self.entries
            .iter()
            .map(|(name, values)| (name, values.as_slice()))
    }
}

/// Snapshot of a request taken before the client is sent to the login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRequest {
    pub method: Method,
    pub request_uri: String,
    pub query_string: Option<String>,
    /// Only recorded alongside a body.
    pub content_type: Option<String>,
    /// `-1` when the request carried no usable `Content-Length`.
    pub content_length: i64,
    /// `None` for an empty body; never `Some` of an empty buffer.
    pub body: Option<Bytes>,
    pub cookies: Vec<RequestCookie>,
    pub headers: SavedHeaders,
    pub locales: Vec<String>,
}

impl Default for SavedRequest {
    fn default() -> Self {
        Self {
            method: Method::GET,
            request_uri: String::new(),
            query_string: None,
            content_type: None,
            content_length: -1,
            body: None,
            cookies: Vec::new(),
            headers: SavedHeaders::default(),
            locales: Vec::new(),
        }
    }
}

impl SavedRequest {
    /// The URI the client should be redirected back to.
    pub fn redirect_target(&self) -> String {
        match &self.query_string {
            Some(query) => format!("{}?{}", self.request_uri, query),
            None => self.request_uri.clone(),
        }
    }
}

/// Saves and restores requests in the authentication session.
#[derive(Debug, Clone)]
pub struct SavedRequestStore {
    max_save_post_size: usize,
}

impl SavedRequestStore {
    pub fn new(max_save_post_size: usize) -> Self {
        Self { max_save_post_size }
    }

    pub fn max_save_post_size(&self) -> usize {
        self.max_save_post_size
    }

    /// Capture the replayable state of `exchange`, consuming its body.
    ///
    /// A body larger than the save limit fails with
    /// [`FormAuthError::BodyTooLarge`].
    pub async fn capture(&self, exchange: &mut Exchange) -> Result<SavedRequest> {
        let mut saved = {
            let request = exchange.request();
            let headers = request.headers();
            SavedRequest {
                method: request.method().clone(),
                request_uri: exchange.request_uri().to_string(),
                query_string: exchange.query_string().map(str::to_string),
                content_type: None,
                content_length: headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .unwrap_or(-1),
                body: None,
                cookies: exchange.cookies(),
                headers: SavedHeaders::from_header_map(headers),
                locales: exchange.locales(),
            }
        };

        exchange.acknowledge_continue();
        let body = exchange.read_body(self.max_save_post_size).await?;
        if !body.is_empty() {
            saved.content_type = exchange
                .request()
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            saved.body = Some(body);
        }
        Ok(saved)
    }

    /// Capture `exchange` and store it in the session, replacing any earlier request.
    pub async fn save(
        &self,
        exchange: &mut Exchange,
        sessions: &AuthSessions,
        session_id: &SessionId,
    ) -> Result<()> {
        let saved = self.capture(exchange).await?;
        debug!(
            session_id = %session_id,
            method = %saved.method,
            uri = %saved.request_uri,
            body_len = saved.body.as_ref().map_or(0, Bytes::len),
            "Saved request for replay after login"
        );
        sessions
            .update(session_id, |state| state.set_saved_request(saved))
            .await?;
        Ok(())
    }

    /// Replace the current request with the one saved in the session.
    ///
    /// The form principal is cleared whether or not a request was saved.
    /// Returns `Ok(false)` when the session holds no saved request.
    pub async fn restore(
        &self,
        exchange: &mut Exchange,
        sessions: &AuthSessions,
        session_id: &SessionId,
    ) -> Result<bool> {
        let saved = sessions
            .with_mut(session_id, |state| {
                state.clear_form_principal();
                state.saved_request().cloned()
            })
            .await
            .flatten();
        let Some(saved) = saved else {
            debug!(session_id = %session_id, "No saved request to restore");
            return Ok(false);
        };

        // The current body is the login POST, not the original request's
        exchange.drain_body().await?;

        let cacheable = saved.method == Method::GET || saved.method == Method::HEAD;
        let mut headers = HeaderMap::new();
        for (name, values) in saved.headers.iter() {
            if *name == IF_MODIFIED_SINCE || (cacheable && *name == IF_NONE_MATCH) {
                continue;
            }
            if *name == COOKIE || *name == CONTENT_LENGTH {
                continue;
            }
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }
        if let Some(cookie) = cookie_header_value(&saved.cookies)? {
            headers.insert(COOKIE, cookie);
        }
        if saved.content_length >= 0 {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(saved.content_length));
        }

        let mut body = Body::empty();
        if let Some(bytes) = saved.body.clone() {
            body = Body::from(bytes);
            let content_type = saved.content_type.clone().or_else(|| {
                (saved.method == Method::POST).then(|| FORM_URLENCODED.to_string())
            });
            match content_type {
                Some(ct) => {
                    let value = HeaderValue::from_str(&ct).map_err(|e| {
                        FormAuthError::InvalidRequest(format!("saved content type: {e}"))
                    })?;
                    headers.insert(CONTENT_TYPE, value);
                }
                None => {
                    headers.remove(CONTENT_TYPE);
                }
            }
        }

        exchange.clear_parameters();
        {
            let request = exchange.request_mut();
            *request.headers_mut() = headers;
            *request.body_mut() = body;
            *request.method_mut() = saved.method.clone();
            let extensions = request.extensions_mut();
            extensions.insert(RequestCookies(saved.cookies.clone()));
            extensions.insert(RequestLocales(saved.locales.clone()));
        }
        exchange.set_query_string(saved.query_string.as_deref())?;

        debug!(
            session_id = %session_id,
            method = %saved.method,
            uri = %saved.request_uri,
            "Restored saved request"
        );
        Ok(true)
    }

    /// Where to send the client after a successful login, if a request was saved.
    pub async fn redirect_target(
        &self,
        sessions: &AuthSessions,
        session_id: &SessionId,
    ) -> Option<String> {
        sessions
            .with_ref(session_id, |state| {
                state.saved_request().map(SavedRequest::redirect_target)
            })
            .await
            .flatten()
    }
}
