//! HTTP handlers for identity-service.

pub mod auth;
pub mod tenant;
pub mod user;
