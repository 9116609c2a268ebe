//! Cart endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::cart::{CartEntry, CartItem},
};

use super::AuthenticatedUser;

/// Add-to-cart request
#[derive(Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    /// Copy to stage for reservation
    pub copy_id: i32,
}

/// Cart contents response
#[derive(Serialize, ToSchema)]
pub struct CartResponse {
    /// Entries in insertion order, with advisory availability
    pub items: Vec<CartEntry>,
}

/// Get the authenticated user's cart
#[utoipa::path(
    get,
    path = "/cart",
    tag = "cart",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cart contents", body = CartResponse)
    )
)]
pub async fn get_cart(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<CartResponse>> {
    let items = state.services.cart.view(claims.sub).await?;
    Ok(Json(CartResponse { items }))
}

/// Add a copy to the cart
#[utoipa::path(
    post,
    path = "/cart/items",
    tag = "cart",
    security(("bearer_auth" = [])),
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Copy added", body = CartItem),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Already in cart, cart full, or copy unavailable")
    )
)]
pub async fn add_cart_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<AddCartItemRequest>,
) -> AppResult<(StatusCode, Json<CartItem>)> {
    let item = state.services.cart.add(claims.sub, request.copy_id).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Remove a copy from the cart (no-op if absent)
#[utoipa::path(
    delete,
    path = "/cart/items/{copy_id}",
    tag = "cart",
    security(("bearer_auth" = [])),
    params(
        ("copy_id" = i32, Path, description = "Copy ID")
    ),
    responses(
        (status = 204, description = "Copy removed (or was not in the cart)")
    )
)]
pub async fn remove_cart_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(copy_id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.cart.remove(claims.sub, copy_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Empty the cart (no-op if already empty)
#[utoipa::path(
    delete,
    path = "/cart",
    tag = "cart",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Cart emptied")
    )
)]
pub async fn clear_cart(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<StatusCode> {
    state.services.cart.clear(claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
