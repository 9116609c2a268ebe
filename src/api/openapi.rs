//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{cart, copies, health, reservations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Carrel API",
        version = "0.9.0",
        description = "Book Reservation System REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Copies
        copies::get_copy,
        // Cart
        cart::get_cart,
        cart::add_cart_item,
        cart::remove_cart_item,
        cart::clear_cart,
        // Reservations
        reservations::checkout,
        reservations::list_my_reservations,
        reservations::list_reservations,
        reservations::list_attention,
        reservations::get_reservation,
        reservations::approve_reservation,
        reservations::reject_reservation,
        reservations::mark_picked_up,
        reservations::mark_returned,
    ),
    components(
        schemas(
            // Copies
            crate::models::copy::CopyView,
            crate::models::copy::CopyState,
            crate::models::copy::CopyCondition,
            // Cart
            crate::models::cart::CartItem,
            crate::models::cart::CartEntry,
            cart::AddCartItemRequest,
            cart::CartResponse,
            // Reservations
            crate::models::reservation::ReservationDetails,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::LifecycleAlert,
            crate::models::reservation::AlertKind,
            reservations::CheckoutRequest,
            reservations::ApproveRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "copies", description = "Physical copy availability"),
        (name = "cart", description = "Per-user reservation cart"),
        (name = "reservations", description = "Reservation negotiation and lifecycle")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
