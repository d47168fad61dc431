//! Request cookie parsing and session cookie construction.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE};
use formguard_session::SessionId;

use crate::config::FormAuthConfig;
use crate::error::{FormAuthError, Result};

/// One `name=value` pair from a `Cookie` request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCookie {
    pub name: String,
    pub value: String,
}

impl RequestCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parsed cookies of a request, installed as an extension when a saved
/// request is replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookies(pub Vec<RequestCookie>);

/// Parse every `Cookie` header in order.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<RequestCookie> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(RequestCookie::new(name, value.trim()))
        })
        .collect()
}

/// Value of the first cookie called `name`.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    parse_cookies(headers)
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.value)
}

/// Serialize cookies back into a single `Cookie` header value.
pub fn cookie_header_value(cookies: &[RequestCookie]) -> Result<Option<HeaderValue>> {
    if cookies.is_empty() {
        return Ok(None);
    }
    let joined = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&joined)
        .map(Some)
        .map_err(|e| FormAuthError::InvalidRequest(format!("cookie header: {e}")))
}

/// `Set-Cookie` value binding the client to `session_id`.
pub fn session_cookie(config: &FormAuthConfig, session_id: &SessionId) -> Result<HeaderValue> {
    let mut cookie = format!(
        "{}={}; Path={}; HttpOnly; SameSite=Lax",
        config.session_cookie_name,
        session_id.as_cookie_value(),
        config.cookie_path()
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| FormAuthError::Internal(format!("session cookie: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for v in values {
            headers.append(COOKIE, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn test_parse_multiple_headers_in_order() {
        let cookies = parse_cookies(&headers(&["a=1; b=2", "c=3"]));
        assert_eq!(
            cookies,
            vec![
                RequestCookie::new("a", "1"),
                RequestCookie::new("b", "2"),
                RequestCookie::new("c", "3"),
            ]
        );
    }

    #[test]
    fn test_parse_skips_malformed_pairs() {
        let cookies = parse_cookies(&headers(&["junk; =nameless; ok=yes"]));
        assert_eq!(cookies, vec![RequestCookie::new("ok", "yes")]);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let cookies = parse_cookies(&headers(&["token=abc==; x=1"]));
        assert_eq!(cookies[0].value, "abc==");
    }

    #[test]
    fn test_find_cookie() {
        let h = headers(&["FGSESSIONID=abc; theme=dark"]);
        assert_eq!(find_cookie(&h, "theme").as_deref(), Some("dark"));
        assert_eq!(find_cookie(&h, "missing"), None);
    }

    #[test]
    fn test_cookie_header_value() {
        let value = cookie_header_value(&[RequestCookie::new("a", "1"), RequestCookie::new("b", "2")])
            .unwrap()
            .unwrap();
        assert_eq!(value, "a=1; b=2");
        assert!(cookie_header_value(&[]).unwrap().is_none());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let config = FormAuthConfig::new("/app")
            .with_session_cookie_name("SID")
            .with_secure_cookie(true);
        let id = SessionId::new();
        let value = session_cookie(&config, &id).unwrap();
        let value = value.to_str().unwrap();

        assert!(value.starts_with(&format!("SID={}", id.as_cookie_value())));
        assert!(value.contains("Path=/app"));
        assert!(value.contains("HttpOnly"));
        assert!(value.ends_with("; Secure"));
    }
}
