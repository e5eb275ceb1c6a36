use warden_auth::SessionContextData;

/// Who a request is, as resolved by the attribution middleware.
///
/// Downstream middleware and handlers read the normalized
/// [`SessionContextData`] regardless of which channel produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIdentity {
    /// Browser session; the context was rebuilt from live membership data.
    Cookie {
        session_token: String,
        context: SessionContextData,
    },
    /// Stateless bearer token; the context is the snapshot it carried.
    Token(SessionContextData),
    Anonymous,
}

impl RequestIdentity {
    pub fn session_context(&self) -> Option<&SessionContextData> {
        match self {
            RequestIdentity::Cookie { context, .. } | RequestIdentity::Token(context) => Some(context),
            RequestIdentity::Anonymous => None,
        }
    }

    /// Opaque server-side session token, for cookie-attributed requests.
    pub fn session_token(&self) -> Option<&str> {
        match self {
            RequestIdentity::Cookie { session_token, .. } => Some(session_token),
            _ => None,
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            RequestIdentity::Cookie { .. } => "cookie",
            RequestIdentity::Token(_) => "token",
            RequestIdentity::Anonymous => "anonymous",
        }
    }
}
