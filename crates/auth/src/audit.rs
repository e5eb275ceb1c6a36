use serde::Serialize;

use warden_core::UserId;

/// Security-relevant authentication events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    SuccessfulLogin { user_id: UserId },
    BadPassword { user_id: UserId },
    BadTwoFactorToken { user_id: UserId },
    BannedUserLoginAttempt { user_id: UserId },
    Logout { user_id: UserId },
    CookieSecretCycled { user_id: UserId },
}

impl AuthEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuthEvent::SuccessfulLogin { .. } => "auth.login.succeeded",
            AuthEvent::BadPassword { .. } => "auth.login.bad_password",
            AuthEvent::BadTwoFactorToken { .. } => "auth.login.bad_two_factor",
            AuthEvent::BannedUserLoginAttempt { .. } => "auth.login.banned_user",
            AuthEvent::Logout { .. } => "auth.logout",
            AuthEvent::CookieSecretCycled { .. } => "auth.cookie_secret.cycled",
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            AuthEvent::SuccessfulLogin { user_id }
            | AuthEvent::BadPassword { user_id }
            | AuthEvent::BadTwoFactorToken { user_id }
            | AuthEvent::BannedUserLoginAttempt { user_id }
            | AuthEvent::Logout { user_id }
            | AuthEvent::CookieSecretCycled { user_id } => *user_id,
        }
    }
}

/// Fire-and-forget audit sink. Implementations must not block the caller.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: AuthEvent);
}
