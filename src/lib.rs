//! Carrel Book Reservation System
//!
//! A Rust server for negotiated book reservations: users stage physical
//! copies in a cart and submit a date range with candidate pickup/return
//! timeslots; an administrator confirms one slot of each or rejects the
//! request. Copies are claimed atomically so no two reservations ever hold
//! the same copy.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    /// Database pool handle, kept for the readiness probe
    pub pool: sqlx::PgPool,
}
