//! Authentication
//!
//! Dashboard users are identified by a signed bearer token (HS256 JWT). The
//! token's `sub` claim is the uid that selects the user's storage namespace;
//! `email` is optional and only shown in the user details.

mod jwt;

pub use jwt::{AuthError, Claims, TokenVerifier};
