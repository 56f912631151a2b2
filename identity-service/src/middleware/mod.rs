pub mod auth;

pub use auth::{auth_middleware, client_info, AuthUser};
