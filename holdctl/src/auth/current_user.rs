use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    errors::{Error, Result},
    storage::Storage,
};

/// Extract the bearer token from the Authorization header
/// Returns:
/// - None: No Authorization header or not a Bearer token
/// - Some(Ok(token)): Bearer token present
/// - Some(Err(error)): Header present but not valid UTF-8
fn bearer_token(parts: &Parts) -> Option<Result<&str>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    auth_str.strip_prefix("Bearer ").map(|token| Ok(token.trim()))
}

impl<S: Storage> FromRequestParts<AppState<S>> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState<S>) -> Result<Self> {
        let token = match bearer_token(parts) {
            Some(token) => token?,
            None => {
                trace!("No bearer token present");
                return Err(Error::Unauthenticated { message: None });
            }
        };

        let user = session::verify_session_token(token, &state.config)?;
        debug!(user_id = user.id, "Authenticated bearer token");
        Ok(user)
    }
}
