//! Repository layer for persistent and ephemeral storage

pub mod carts;
pub mod copies;
pub mod reservations;

use sqlx::{Pool, Postgres};

/// Main repository struct holding database-backed stores
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub copies: copies::CopiesRepository,
    pub reservations: reservations::ReservationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            copies: copies::CopiesRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            pool,
        }
    }
}
