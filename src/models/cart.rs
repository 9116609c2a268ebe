//! Cart model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::copy::CopyState;

/// One entry of a user's cart; also the serialized form stored in Redis.
///
/// A cart item holds no claim on the copy. Availability shown alongside it
/// is advisory only and may change before checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub copy_id: i32,
    pub added_at: DateTime<Utc>,
}

/// Cart entry enriched with the copy's current (advisory) state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartEntry {
    pub copy_id: i32,
    pub added_at: DateTime<Utc>,
    pub state: CopyState,
}
