//! Authentication: password hashing, bearer tokens and the request gate

pub mod middleware;
pub mod password;
pub mod token;

pub use middleware::require_auth;
pub use password::{decoy_hash, hash_password, verify_password};
pub use token::{bearer_token, AuthUser, Claims, TokenService};
