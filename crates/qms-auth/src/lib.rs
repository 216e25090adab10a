//! # qms-auth
//!
//! Authentication and authorization for QMS RS.
//!
//! ## Features
//!
//! - JWT issue and validation (HS256)
//! - One-time e-mail codes
//! - Bearer-token authentication of requests
//! - Role-based `CurrentUser` used by the contracts

pub mod jwt;
pub mod middleware;
pub mod otp;
pub mod permissions;

pub use jwt::{extract_bearer_token, Claims, JwtError, JwtService};
pub use middleware::{AuthError, Authenticator};
pub use otp::{codes_match, generate_code, OTP_LENGTH};
pub use permissions::CurrentUser;
