//! Caller credentials forwarded to the remote inventory service.

/// Whatever the remote inventory service needs to authorize a call.
///
/// The core never inspects the value; it only forwards it.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// A bearer token, forwarded as `Authorization: Bearer <token>`.
    Bearer(String),
    /// A user identifier already validated upstream, forwarded as `iv-user`.
    User(String),
}

impl AuthContext {
    /// Builds a context from a raw `Authorization` header value.
    ///
    /// Accepts `Bearer <token>` or a bare token. Returns `None` for other
    /// schemes and for an empty token.
    pub fn from_authorization_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let token = match value.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
            Some(_) => return None,
            None if value.eq_ignore_ascii_case("bearer") => "",
            None => value,
        };
        (!token.is_empty()).then(|| AuthContext::Bearer(token.to_string()))
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthContext::Bearer(_) => f.write_str("Bearer(..)"),
            AuthContext::User(id) => f.debug_tuple("User").field(id).finish(),
        }
    }
}
