//! services/api/src/auth/mod.rs
//!
//! Authentication: password hashing, token minting and verification, the
//! refresh-token lifecycle, and the middleware that guards routes.

pub mod handlers;
pub mod middleware;
pub mod password;
pub mod session;
pub mod tokens;
