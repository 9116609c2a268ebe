//! Read-only copy (inventory) endpoints
//!
//! Copy creation, deletion and condition updates belong to the external
//! inventory management surface; this core only exposes the state it owns.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{error::AppResult, models::copy::CopyView, repository::copies::CopyStore};

use super::AuthenticatedUser;

/// Get a copy's identity, condition and current availability
#[utoipa::path(
    get,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy details", body = CopyView),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(copy_id): Path<i32>,
) -> AppResult<Json<CopyView>> {
    let copy = state.services.copies.get(copy_id).await?;
    Ok(Json(CopyView::from(copy)))
}
