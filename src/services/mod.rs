//! Business logic services

pub mod allocator;
pub mod cart;
pub mod clock;
pub mod reservations;

use std::sync::Arc;

use crate::{
    config::ReservationsConfig,
    repository::{carts::CartStore, copies::CopyStore, Repository},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    /// Read-only inventory view for the copy endpoints
    pub copies: Arc<dyn CopyStore>,
    /// Raw cart storage handle, kept for the readiness probe
    pub carts: Arc<dyn CartStore>,
    pub cart: cart::CartService,
    pub reservations: reservations::ReservationsService,
    pub clock: clock::LifecycleClock,
}

impl Services {
    /// Create all services with the given repositories
    pub fn new(
        repository: Repository,
        cart_store: Arc<dyn CartStore>,
        policy: ReservationsConfig,
    ) -> Self {
        let copies: Arc<dyn CopyStore> = Arc::new(repository.copies.clone());
        let reservation_store = Arc::new(repository.reservations.clone());
        let allocator = allocator::Allocator::new(copies.clone());

        Self {
            cart: cart::CartService::new(cart_store.clone(), copies.clone(), &policy),
            reservations: reservations::ReservationsService::new(
                reservation_store.clone(),
                cart_store.clone(),
                allocator,
                policy,
            ),
            clock: clock::LifecycleClock::new(reservation_store),
            copies,
            carts: cart_store,
        }
    }
}
