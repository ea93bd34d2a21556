use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::UserId;

/// The authenticated caller, as extracted from a verified bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: UserId,
}
