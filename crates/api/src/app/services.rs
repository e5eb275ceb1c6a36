//! Auth service: collaborator wiring plus the login, session, token and
//! secret-cycling flows the routes and middleware delegate to.

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use warden_auth::signing::{check_request_time, verify_signature};
use warden_auth::{
    AccountMembershipManager, ApiClientLookup, AuditLog, AuthEvent, Authenticator, AuthenticatorError, AuthzError,
    DirectoryError, IssuedToken, Permission, PermissionModel, SessionContextData, TokenError, TokenIssuer,
    TokenRequest, User, UserLookup, require_service_permission,
};
use warden_core::{AccountId, UserId};
use warden_infra::{BcryptTotpAuthenticator, InMemoryApiClients, InMemoryDirectory, TracingAuditLog};
use warden_session::{
    CookieCodec, InMemorySessionStore, SessionError, SessionManager, SessionStore, SessionValue, find_cookie,
};

use crate::app::dto::LoginRequest;
use crate::app::errors::ApiError;
use crate::config::AuthConfig;
use crate::context::RequestIdentity;

/// External collaborators the service consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserLookup>,
    pub memberships: Arc<dyn AccountMembershipManager>,
    pub api_clients: Arc<dyn ApiClientLookup>,
    pub authenticator: Arc<dyn Authenticator>,
    pub audit: Arc<dyn AuditLog>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Handles on the in-memory collaborators, for seeding.
#[derive(Clone, Default)]
pub struct InMemoryCollaborators {
    pub directory: Arc<InMemoryDirectory>,
    pub api_clients: Arc<InMemoryApiClients>,
    pub sessions: Arc<InMemorySessionStore>,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self, audit: Arc<dyn AuditLog>) -> Collaborators {
        Collaborators {
            users: self.directory.clone(),
            memberships: self.directory.clone(),
            api_clients: self.api_clients.clone(),
            authenticator: Arc::new(BcryptTotpAuthenticator::default()),
            audit,
            sessions: self.sessions.clone(),
        }
    }
}

/// In-memory wiring for dev: every collaborator lives in process.
pub fn build_in_memory_service(config: AuthConfig) -> (Arc<AuthService>, InMemoryCollaborators) {
    let handles = InMemoryCollaborators::new();
    let service = AuthService::new(
        config,
        PermissionModel::standard(),
        handles.collaborators(Arc::new(TracingAuditLog)),
    );
    (Arc::new(service), handles)
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("{0}")]
    Validation(String),

    #[error("user not found")]
    UserNotFound,

    #[error("user is banned")]
    Banned { explanation: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("login failed: {0}")]
    Internal(String),
}

impl From<LoginError> for ApiError {
    fn from(value: LoginError) -> Self {
        match value {
            LoginError::Validation(msg) => ApiError::InvalidInput(msg),
            LoginError::UserNotFound => ApiError::NotFound,
            LoginError::Banned { explanation } => ApiError::Forbidden(explanation),
            LoginError::InvalidCredentials => ApiError::Unauthorized("login was invalid"),
            LoginError::Internal(_) => ApiError::Internal,
        }
    }
}

pub struct AuthService {
    config: AuthConfig,
    model: PermissionModel,
    sessions: SessionManager,
    cookies: CookieCodec,
    tokens: TokenIssuer,
    users: Arc<dyn UserLookup>,
    memberships: Arc<dyn AccountMembershipManager>,
    api_clients: Arc<dyn ApiClientLookup>,
    authenticator: Arc<dyn Authenticator>,
    audit: Arc<dyn AuditLog>,
}

impl AuthService {
    pub fn new(config: AuthConfig, model: PermissionModel, collaborators: Collaborators) -> Self {
        let sessions = SessionManager::new(collaborators.sessions, config.session_lifetime, config.store_timeout);
        let cookies = CookieCodec::new(config.cookie_block_key);
        let tokens = TokenIssuer::new(config.token_key.clone(), config.token_issuer.clone(), config.token_lifetime);

        Self {
            config,
            model,
            sessions,
            cookies,
            tokens,
            users: collaborators.users,
            memberships: collaborators.memberships,
            api_clients: collaborators.api_clients,
            authenticator: collaborators.authenticator,
            audit: collaborators.audit,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn model(&self) -> &PermissionModel {
        &self.model
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attribution
    // ─────────────────────────────────────────────────────────────────────────

    /// Session token carried by a valid session cookie, if any.
    ///
    /// Cookies that fail verification (tampered, expired, signed under a
    /// cycled secret) are treated as absent.
    pub fn session_token_from_cookie(&self, headers: &HeaderMap) -> Option<String> {
        let name = &self.config.cookie.name;
        let raw = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|h| find_cookie(h, name))?;

        match self.cookies.decode(name, raw, self.config.session_lifetime) {
            Ok(token) => Some(token),
            Err(e) => {
                debug!(error = %e, "ignoring undecodable session cookie");
                None
            }
        }
    }

    /// Resolve who is making the request: cookie first, then bearer token,
    /// else anonymous. Store failures on the cookie path are errors, never a
    /// silent downgrade to anonymous.
    pub async fn attribute(&self, headers: &HeaderMap) -> Result<RequestIdentity, ApiError> {
        if let Some(token) = self.session_token_from_cookie(headers) {
            let session = self.sessions.load(Some(&token)).await.map_err(|e| {
                error!(error = %e, "loading session for cookie");
                ApiError::Internal
            })?;

            if let Some(user_id) = session.user_id() {
                debug!(%user_id, "cookie attached to request");
                match self.memberships.build_session_context_data_for_user(user_id).await {
                    Ok(mut context) => {
                        if let Some(active) = session.active_account_id() {
                            context.active_account_id = active;
                        }
                        return Ok(RequestIdentity::Cookie {
                            session_token: token,
                            context,
                        });
                    }
                    Err(DirectoryError::NotFound) => {
                        debug!(%user_id, "session refers to a user with no memberships");
                    }
                    Err(e) => {
                        error!(%user_id, error = %e, "building session context for cookie");
                        return Err(ApiError::Internal);
                    }
                }
            }
        }

        if let Some(raw) = bearer_token(headers) {
            match self.tokens.verify(raw) {
                Ok(context) => return Ok(RequestIdentity::Token(context)),
                Err(TokenError::TokenExpired) => debug!("expired token attached to request"),
                Err(e) => warn!(error = %e, "rejecting token attached to request"),
            }
        }

        Ok(RequestIdentity::Anonymous)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cookie sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// Load, renew, stage, commit, encode. Any failure leaves no cookie.
    ///
    /// Returns the `Set-Cookie` header value.
    pub async fn issue_session_cookie(
        &self,
        existing_token: Option<&str>,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<String, SessionCookieError> {
        let mut session = self.sessions.load(existing_token).await?;
        self.sessions.renew_token(&mut session).await?;
        session.put(SessionValue::UserId(user_id))?;
        session.put(SessionValue::ActiveAccount(account_id))?;

        let (token, expiry) = self.sessions.commit(&mut session).await?;
        let value = self.cookies.encode(&self.config.cookie.name, &token)?;

        Ok(self.config.cookie.set_header(&value, expiry - Utc::now()))
    }

    /// Validate credentials and open a session in the user's default account.
    pub async fn authenticate_user(
        &self,
        input: &LoginRequest,
        existing_token: Option<&str>,
    ) -> Result<(User, AccountId, String), LoginError> {
        input
            .validate(self.config.min_username_length, self.config.min_password_length)
            .map_err(|e| LoginError::Validation(e.to_string()))?;

        let user = match self.users.get_user_by_username(input.username.trim()).await {
            Ok(u) => u,
            Err(DirectoryError::NotFound) => return Err(LoginError::UserNotFound),
            Err(e) => return Err(LoginError::Internal(format!("fetching user: {e}"))),
        };

        if user.is_banned() {
            self.audit.record(AuthEvent::BannedUserLoginAttempt { user_id: user.id });
            return Err(LoginError::Banned {
                explanation: user.reputation_explanation.clone(),
            });
        }

        let valid = self
            .authenticator
            .validate_login(
                &user.hashed_password,
                &input.password,
                &user.two_factor_secret,
                input.totp_token.trim(),
            )
            .await;

        match valid {
            Ok(true) => {}
            Ok(false) | Err(AuthenticatorError::PasswordDoesNotMatch) => {
                self.audit.record(AuthEvent::BadPassword { user_id: user.id });
                return Err(LoginError::InvalidCredentials);
            }
            Err(AuthenticatorError::InvalidTotpToken) => {
                self.audit.record(AuthEvent::BadTwoFactorToken { user_id: user.id });
                return Err(LoginError::InvalidCredentials);
            }
            Err(e) => return Err(LoginError::Internal(format!("validating login: {e}"))),
        }

        let account_id = self
            .memberships
            .get_default_account_id_for_user(user.id)
            .await
            .map_err(|e| LoginError::Internal(format!("fetching default account: {e}")))?;

        let cookie = self
            .issue_session_cookie(existing_token, account_id, user.id)
            .await
            .map_err(|e| LoginError::Internal(format!("issuing cookie: {e}")))?;

        self.audit.record(AuthEvent::SuccessfulLogin { user_id: user.id });
        info!(user_id = %user.id, account_id = %account_id, "user logged in");

        Ok((user, account_id, cookie))
    }

    /// Re-issue the caller's session pointing at `account_id`.
    ///
    /// Non-members get 401 and their session is left untouched.
    pub async fn change_active_account(
        &self,
        existing_token: Option<&str>,
        requester: UserId,
        account_id: AccountId,
    ) -> Result<String, ApiError> {
        let is_member = self
            .memberships
            .user_is_member_of_account(requester, account_id)
            .await
            .map_err(|e| {
                error!(user_id = %requester, error = %e, "checking account membership");
                ApiError::Internal
            })?;

        if !is_member {
            debug!(user_id = %requester, account_id = %account_id, "invalid account requested for activation");
            return Err(ApiError::Unauthorized("unauthenticated"));
        }

        let cookie = self
            .issue_session_cookie(existing_token, account_id, requester)
            .await
            .map_err(|e| {
                error!(user_id = %requester, error = %e, "issuing cookie for account switch");
                ApiError::Internal
            })?;

        info!(user_id = %requester, account_id = %account_id, "changed active session account");
        Ok(cookie)
    }

    /// Destroy the server-side session. The returned clearing cookie must be
    /// sent whether or not destruction succeeded.
    pub async fn logout(&self, session_token: Option<&str>, user_id: UserId) -> (String, Result<(), SessionError>) {
        let clear = self.config.cookie.clear_header();

        let result = async {
            let mut session = self.sessions.load(session_token).await?;
            self.sessions.destroy(&mut session).await
        }
        .await;

        if result.is_ok() {
            self.audit.record(AuthEvent::Logout { user_id });
            debug!(%user_id, "user logged out");
        }

        (clear, result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stateless tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// Authenticate a signed token request and issue a token for the client's
    /// owner. Every rejection is the same 401 to the caller.
    pub async fn issue_token(&self, request: &TokenRequest, signature: Option<&str>) -> Result<IssuedToken, ApiError> {
        const DENIED: ApiError = ApiError::Unauthorized("unauthorized");

        if request.client_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("clientID is required".to_string()));
        }
        if request.request_time == 0 {
            return Err(ApiError::InvalidInput("requestTime is required".to_string()));
        }

        let client_id = request.client_id.as_str();

        if let Err(e) = check_request_time(request, Utc::now()) {
            debug!(client_id, error = %e, "token request outside time window");
            return Err(DENIED);
        }
        let Some(signature) = signature.filter(|s| !s.trim().is_empty()) else {
            debug!(client_id, "token request without signature");
            return Err(DENIED);
        };

        let client = match self.api_clients.get_api_client_by_client_id(client_id).await {
            Ok(c) => c,
            Err(e) => {
                debug!(client_id, error = %e, "fetching api client");
                return Err(DENIED);
            }
        };

        if let Err(e) = verify_signature(&client.client_secret, request, signature) {
            info!(client_id, error = %e, "invalid credentials passed to token route");
            return Err(DENIED);
        }

        let user = self.users.get_user(client.owner).await.map_err(|e| {
            debug!(client_id, error = %e, "retrieving api client owner");
            DENIED
        })?;

        let mut context = self
            .memberships
            .build_session_context_data_for_user(user.id)
            .await
            .map_err(|e| {
                debug!(client_id, user_id = %user.id, error = %e, "retrieving permissions for api client");
                DENIED
            })?;

        if let Some(requested) = request.account_id {
            if !context.is_member_of(requested) {
                debug!(client_id, account_id = %requested, "invalid account requested for token");
                return Err(DENIED);
            }
            context.active_account_id = requested;
        }

        let issued = self
            .tokens
            .issue(&context, &client, request.requested_lifetime())
            .map_err(|e| {
                error!(client_id, error = %e, "building token");
                ApiError::Internal
            })?;

        info!(client_id, user_id = %user.id, account_id = %context.active_account_id, "token issued");
        Ok(issued)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Secret cycling
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the cookie signing key, logging every cookie session out.
    pub fn cycle_cookie_secret(&self, context: &SessionContextData) -> Result<(), AuthzError> {
        require_service_permission(context, &self.model, Permission::CycleCookieSecret)?;

        self.cookies.rotate();
        self.audit.record(AuthEvent::CookieSecretCycled {
            user_id: context.user_id(),
        });
        warn!(user_id = %context.user_id(), "cookie secret cycled");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SessionCookieError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Cookie(#[from] warden_session::CookieError),
}

/// Raw token from `Authorization`, with or without a `Bearer` prefix.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_prefix_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer v2.local.abc"));
        assert_eq!(bearer_token(&headers), Some("v2.local.abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("v2.local.abc"));
        assert_eq!(bearer_token(&headers), Some("v2.local.abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("  "));
        assert_eq!(bearer_token(&headers), None);
    }
}
