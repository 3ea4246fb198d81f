//! Authentication for the hospital API.
//!
//! - [`password`]: Argon2id hashing and verification
//! - [`token`]: HS256 bearer tokens
//! - [`service`]: login and token authentication against a storage backend

pub mod config;
pub mod error;
pub mod password;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use password::{hash_password, verify_password};
pub use service::{AuthContext, AuthService, LoginResult};
pub use token::{Claims, JwtError, JwtService};
