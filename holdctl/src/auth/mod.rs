//! Bearer token authentication.
//!
//! Callers authenticate with `Authorization: Bearer <token>`, where the token is an HS256 JWT
//! signed with the configured `secret_key` whose `sub` claim is the caller's user ID. User
//! accounts themselves are managed elsewhere; this service only trusts the ID it is handed.
//!
//! - [`session`]: token issuing and verification
//! - [`current_user`]: the [`CurrentUser`](crate::api::models::users::CurrentUser) extractor

pub mod current_user;
pub mod session;
