//! Security constraints: which URIs need authentication, which roles, which transport.

use axum::http::Method;

/// Transport protection required for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TransportGuarantee {
    #[default]
    None,
    Integral,
    Confidential,
}

/// One protected resource collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConstraint {
    url_patterns: Vec<String>,
    /// Empty means every method.
    methods: Vec<Method>,
    transport: TransportGuarantee,
    /// `None`: no authorization constraint. `Some([])`: nobody. `"*"`: any authenticated user.
    roles: Option<Vec<String>>,
}

impl SecurityConstraint {
    pub fn new<I, S>(url_patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url_patterns: url_patterns.into_iter().map(Into::into).collect(),
            methods: Vec::new(),
            transport: TransportGuarantee::None,
            roles: None,
        }
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn with_transport(mut self, transport: TransportGuarantee) -> Self {
        self.transport = transport;
        self
    }

    /// Require one of `roles`. An empty list denies everyone.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Require any authenticated user.
    pub fn with_any_authenticated(self) -> Self {
        self.with_roles(["*"])
    }

    pub fn url_patterns(&self) -> &[String] {
        &self.url_patterns
    }

    pub fn transport(&self) -> TransportGuarantee {
        self.transport
    }

    pub fn roles(&self) -> Option<&[String]> {
        self.roles.as_deref()
    }

    pub fn requires_authentication(&self) -> bool {
        self.roles.is_some()
    }

    /// Whether this constraint covers a request.
    pub fn matches(&self, uri: &str, method: &Method) -> bool {
        self.applies_to(method) && self.best_match(uri).is_some()
    }

    fn applies_to(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    fn best_match(&self, uri: &str) -> Option<MatchKind> {
        self.url_patterns
            .iter()
            .filter_map(|p| pattern_matches(p, uri))
            .max()
    }
}

/// How specifically a URL pattern matched. Greater wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    Default,
    Extension,
    Prefix(usize),
    Exact,
}

/// Servlet URL pattern matching: exact, `/path/*`, `*.ext` and `/`.
fn pattern_matches(pattern: &str, uri: &str) -> Option<MatchKind> {
    if pattern == "/" {
        return Some(MatchKind::Default);
    }
    if pattern == uri {
        return Some(MatchKind::Exact);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        let rest = uri.strip_prefix(prefix)?;
        return (rest.is_empty() || rest.starts_with('/')).then_some(MatchKind::Prefix(prefix.len()));
    }
    if let Some(ext) = pattern.strip_prefix("*.") {
        let last_segment = uri.rsplit('/').next().unwrap_or(uri);
        let (_, uri_ext) = last_segment.rsplit_once('.')?;
        return (uri_ext == ext).then_some(MatchKind::Extension);
    }
    None
}

/// Constraints covering a request, keeping only the most specific pattern match.
///
/// Exact beats the longest `/path/*` prefix, which beats `*.ext`, which
/// beats `/`. Every constraint matching at that level is returned.
pub fn find_matching<'a>(
    constraints: &'a [SecurityConstraint],
    uri: &str,
    method: &Method,
) -> Vec<&'a SecurityConstraint> {
    let candidates: Vec<(MatchKind, &SecurityConstraint)> = constraints
        .iter()
        .filter(|c| c.applies_to(method))
        .filter_map(|c| c.best_match(uri).map(|kind| (kind, c)))
        .collect();

    let Some(best) = candidates.iter().map(|(kind, _)| *kind).max() else {
        return Vec::new();
    };
    candidates
        .into_iter()
        .filter(|(kind, _)| *kind == best)
        .map(|(_, c)| c)
        .collect()
}

/// Strongest transport guarantee among `constraints`.
pub fn required_transport(constraints: &[SecurityConstraint]) -> TransportGuarantee {
    constraints
        .iter()
        .map(SecurityConstraint::transport)
        .max()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_kinds() {
        assert_eq!(pattern_matches("/app/admin", "/app/admin"), Some(MatchKind::Exact));
        assert_eq!(pattern_matches("/app/*", "/app/x/y"), Some(MatchKind::Prefix(4)));
        assert_eq!(pattern_matches("/app/*", "/app"), Some(MatchKind::Prefix(4)));
        assert_eq!(pattern_matches("/app/*", "/apple"), None);
        assert_eq!(pattern_matches("*.jsp", "/app/a/page.jsp"), Some(MatchKind::Extension));
        assert_eq!(pattern_matches("*.jsp", "/app/a.jsp/page"), None);
        assert_eq!(pattern_matches("/", "/anything"), Some(MatchKind::Default));
        assert_eq!(pattern_matches("/app/admin", "/app/admin/x"), None);
    }

    #[test]
    fn test_method_filter() {
        let c = SecurityConstraint::new(["/app/*"]).with_methods([Method::POST]);
        assert!(c.matches("/app/x", &Method::POST));
        assert!(!c.matches("/app/x", &Method::GET));
    }

    #[test]
    fn test_find_matching_prefers_most_specific() {
        let constraints = vec![
            SecurityConstraint::new(["/app/*"]).with_any_authenticated(),
            SecurityConstraint::new(["/app/admin/*"]).with_roles(["admin"]),
            SecurityConstraint::new(["/app/login.html"]),
        ];

        let found = find_matching(&constraints, "/app/admin/users", &Method::GET);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].roles(), Some(&["admin".to_string()][..]));

        let found = find_matching(&constraints, "/app/login.html", &Method::GET);
        assert_eq!(found.len(), 1);
        assert!(!found[0].requires_authentication());

        assert!(find_matching(&constraints, "/health", &Method::GET).is_empty());
    }

    #[test]
    fn test_required_transport() {
        let constraints = vec![
            SecurityConstraint::new(["/a"]).with_transport(TransportGuarantee::Integral),
            SecurityConstraint::new(["/a"]).with_transport(TransportGuarantee::Confidential),
        ];
        assert_eq!(required_transport(&constraints), TransportGuarantee::Confidential);
        assert_eq!(required_transport(&[]), TransportGuarantee::None);
    }
}
