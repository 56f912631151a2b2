pub mod audit_log;
pub mod claim;
pub mod password_history;
pub mod password_reset_token;
pub mod principal;
pub mod refresh_token;
pub mod role_claim;
pub mod tenant;

pub use audit_log::{AuditAction, AuditLog};
pub use claim::{Permission, Role};
pub use password_history::{PasswordHistory, PASSWORD_HISTORY_CAPACITY};
pub use password_reset_token::PasswordResetToken;
pub use principal::{Principal, PrincipalResponse};
pub use refresh_token::RefreshToken;
pub use role_claim::RoleClaim;
pub use tenant::Tenant;
