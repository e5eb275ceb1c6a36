//! `warden-auth`: permission model, authorization snapshots and stateless tokens.
//!
//! This crate is intentionally decoupled from HTTP and storage; the lookups it
//! needs are expressed as traits in [`directory`], [`credentials`] and [`audit`].

pub mod audit;
pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod directory;
pub mod model;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod signing;
pub mod token;

pub use audit::{AuditLog, AuthEvent};
pub use authorize::{
    AuthorizationExplanation, AuthzError, DenialKind, authorize_permissions, authorize_request, explain,
    require_service_admin, require_service_permission,
};
pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use credentials::{Authenticator, AuthenticatorError};
pub use directory::{AccountMembershipManager, ApiClient, ApiClientLookup, DirectoryError, User, UserLookup};
pub use model::{
    AccountRolePermissionsChecker, ModelError, PermissionModel, PermissionModelBuilder,
    ServiceRolePermissionChecker,
};
pub use permissions::Permission;
pub use principal::{AccountMembershipInfo, Reputation, RequesterInfo, SessionContextData, SessionContextError};
pub use roles::Role;
pub use signing::{SIGNATURE_HEADER, SignatureError, TokenRequest};
pub use token::{IssuedToken, LocalKey, TOKEN_HEADER, TokenError, TokenIssuer};
