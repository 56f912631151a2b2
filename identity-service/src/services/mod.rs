//! Services layer for identity-service.
//!
//! Business logic for sign-in, sessions, password lifecycle, claims-based
//! authorization and audited tenant management, plus the storage, cache
//! and notification ports they depend on.

pub mod audit;
mod authorization;
mod cache;
mod claims;
mod context;
mod credentials;
mod database;
mod directory;
pub mod error;
mod jwt;
mod memory;
pub mod notifier;
mod password;
mod session;
mod tenant;

pub use audit::{AuditRecorder, Auditable, ChangeSet};
pub use authorization::{AuthorizationGate, Decision};
pub use cache::{CacheStore, DisabledCache, MockCache, RedisCache};
pub use claims::{cache_key, ClaimsResolver, RoleClaimAdmin, CLAIMS_CACHE_PREFIX};
pub use context::{PrincipalContext, RequestContext};
pub use credentials::{CredentialVerifier, SignIn};
pub use database::{IdentityStore, PgIdentityStore};
pub use directory::{NewPrincipal, PrincipalDirectory};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService};
pub use memory::MemoryIdentityStore;
pub use notifier::{MockNotifier, Notification, Notifier, SmtpNotifier};
pub use password::{PasswordLifecycle, RESET_REQUESTED_MESSAGE};
pub use session::{ClientInfo, Session, SessionIssuer, SessionSettings};
pub use tenant::TenantService;
