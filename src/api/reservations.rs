//! Reservation endpoints: checkout for users, decisions for administrators

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::reservation::{
        LifecycleAlert, ReservationDetails, ReservationFilter, ReservationStatus,
    },
};

use super::AuthenticatedUser;

/// Checkout request: converts the cart into a reservation
#[derive(Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    /// First day of the requested borrowing period
    pub start_date: NaiveDate,
    /// Last day of the requested borrowing period (inclusive)
    pub end_date: NaiveDate,
    /// Candidate pickup timeslots, most preferred first
    #[validate(length(min = 1))]
    pub pickup_slots: Vec<DateTime<Utc>>,
    /// Candidate return timeslots, most preferred first
    #[validate(length(min = 1))]
    pub return_slots: Vec<DateTime<Utc>>,
}

/// Approval request: the administrator picks one candidate of each list
#[derive(Deserialize, ToSchema)]
pub struct ApproveRequest {
    pub pickup_slot: DateTime<Utc>,
    pub return_slot: DateTime<Utc>,
}

/// Listing filter for administrators
#[derive(Deserialize, IntoParams)]
pub struct ReservationListQuery {
    /// Filter by status (pending, approved, rejected, returned)
    pub status: Option<ReservationStatus>,
    /// Filter by owning user
    pub user_id: Option<i32>,
}

/// Submit the cart as a reservation request
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Reservation created", body = ReservationDetails),
        (status = 400, description = "Empty cart or invalid dates/timeslots"),
        (status = 409, description = "A copy was claimed by another reservation")
    )
)]
pub async fn checkout(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<ReservationDetails>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let reservation = state
        .services
        .reservations
        .checkout(
            claims.sub,
            request.start_date,
            request.end_date,
            request.pickup_slots,
            request.return_slots,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// List the authenticated user's reservations
#[utoipa::path(
    get,
    path = "/reservations/mine",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The user's reservations", body = Vec<ReservationDetails>)
    )
)]
pub async fn list_my_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    let reservations = state.services.reservations.list_for_user(claims.sub).await?;
    Ok(Json(reservations))
}

/// List reservations (administrators)
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationListQuery),
    responses(
        (status = 200, description = "Matching reservations", body = Vec<ReservationDetails>),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReservationListQuery>,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    claims.require_admin()?;

    let reservations = state
        .services
        .reservations
        .list(ReservationFilter {
            status: query.status,
            user_id: query.user_id,
        })
        .await?;
    Ok(Json(reservations))
}

/// List reservations with a missed pickup or return (administrators)
#[utoipa::path(
    get,
    path = "/reservations/attention",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Advisory alerts", body = Vec<LifecycleAlert>),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_attention(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LifecycleAlert>>> {
    claims.require_admin()?;

    let alerts = state.services.clock.sweep(Utc::now()).await?;
    Ok(Json(alerts))
}

/// Get one reservation (owner or administrator)
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation details", body = ReservationDetails),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.get(reservation_id).await?;
    if reservation.user_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Authorization(
            "Not the owner of this reservation".to_string(),
        ));
    }
    Ok(Json(reservation))
}

/// Approve a pending reservation (administrators)
#[utoipa::path(
    post,
    path = "/reservations/{id}/approve",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Reservation approved", body = ReservationDetails),
        (status = 400, description = "Chosen slot is not among the candidates"),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation is not pending")
    )
)]
pub async fn approve_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(reservation_id): Path<i32>,
    Json(request): Json<ApproveRequest>,
) -> AppResult<Json<ReservationDetails>> {
    claims.require_admin()?;

    let reservation = state
        .services
        .reservations
        .approve(reservation_id, request.pickup_slot, request.return_slot)
        .await?;
    Ok(Json(reservation))
}

/// Reject a pending reservation and release its copies (administrators)
#[utoipa::path(
    post,
    path = "/reservations/{id}/reject",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation rejected", body = ReservationDetails),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation is not pending")
    )
)]
pub async fn reject_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    claims.require_admin()?;

    let reservation = state.services.reservations.reject(reservation_id).await?;
    Ok(Json(reservation))
}

/// Confirm pickup of an approved reservation (administrators)
#[utoipa::path(
    post,
    path = "/reservations/{id}/pickup",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Pickup confirmed, copies borrowed", body = ReservationDetails),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation is not approved or already picked up")
    )
)]
pub async fn mark_picked_up(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    claims.require_admin()?;

    let reservation = state
        .services
        .reservations
        .mark_picked_up(reservation_id)
        .await?;
    Ok(Json(reservation))
}

/// Confirm return of a picked-up reservation (administrators)
#[utoipa::path(
    post,
    path = "/reservations/{id}/return",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Return confirmed, copies available", body = ReservationDetails),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation was not picked up or already returned")
    )
)]
pub async fn mark_returned(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    claims.require_admin()?;

    let reservation = state
        .services
        .reservations
        .mark_returned(reservation_id)
        .await?;
    Ok(Json(reservation))
}
