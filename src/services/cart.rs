//! Cart service: a per-user wish list with advisory availability
//!
//! The cart never mutates copy state; availability shown or checked here can
//! go stale between add and checkout. Correctness is enforced only by the
//! allocator at checkout time.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::ReservationsConfig,
    error::{AppError, AppResult},
    models::cart::{CartEntry, CartItem},
    models::copy::CopyState,
    repository::{carts::CartStore, copies::CopyStore},
};

#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartStore>,
    copies: Arc<dyn CopyStore>,
    max_items: usize,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        copies: Arc<dyn CopyStore>,
        policy: &ReservationsConfig,
    ) -> Self {
        Self {
            carts,
            copies,
            max_items: policy.max_cart_items,
        }
    }

    /// Add a copy to the user's cart.
    ///
    /// The availability check is advisory only; no claim is taken.
    pub async fn add(&self, user_id: i32, copy_id: i32) -> AppResult<CartItem> {
        let items = self.carts.list(user_id).await?;

        if items.iter().any(|i| i.copy_id == copy_id) {
            return Err(AppError::AlreadyInCart(copy_id));
        }
        if items.len() >= self.max_items {
            return Err(AppError::CartFull(self.max_items));
        }

        let copy = self.copies.get(copy_id).await?;
        if copy.state() != CopyState::Available {
            return Err(AppError::CopyUnavailable(copy_id));
        }

        let item = CartItem {
            copy_id,
            added_at: Utc::now(),
        };
        self.carts.push(user_id, item.clone()).await?;
        Ok(item)
    }

    /// Remove a copy from the cart; a no-op if it is not there
    pub async fn remove(&self, user_id: i32, copy_id: i32) -> AppResult<()> {
        self.carts.remove(user_id, copy_id).await
    }

    /// Empty the cart; a no-op if already empty
    pub async fn clear(&self, user_id: i32) -> AppResult<()> {
        self.carts.clear(user_id).await
    }

    /// Cart contents in insertion order
    pub async fn list(&self, user_id: i32) -> AppResult<Vec<CartItem>> {
        self.carts.list(user_id).await
    }

    /// Cart contents enriched with each copy's current (advisory) state
    pub async fn view(&self, user_id: i32) -> AppResult<Vec<CartEntry>> {
        let items = self.carts.list(user_id).await?;
        let ids: Vec<i32> = items.iter().map(|i| i.copy_id).collect();
        let states = self.copies.list_states(ids).await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let state = states
                    .iter()
                    .find(|(id, _)| *id == item.copy_id)
                    .map(|(_, s)| *s)
                    // A copy deleted since it was added reads as unavailable
                    .unwrap_or(CopyState::Borrowed);
                CartEntry {
                    copy_id: item.copy_id,
                    added_at: item.added_at,
                    state,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::copies::MockCopyStore;
    use crate::repository::memory::{InMemoryCartStore, InMemoryCopyStore};

    fn service(
        copies: &[(i32, CopyState)],
    ) -> (CartService, Arc<InMemoryCartStore>, Arc<InMemoryCopyStore>) {
        let carts = Arc::new(InMemoryCartStore::default());
        let copies = Arc::new(InMemoryCopyStore::with_copies(copies));
        let policy = ReservationsConfig::default();
        (
            CartService::new(carts.clone(), copies.clone(), &policy),
            carts,
            copies,
        )
    }

    #[tokio::test]
    async fn add_lists_in_insertion_order() {
        let (service, _, _) = service(&[
            (10, CopyState::Available),
            (5, CopyState::Available),
            (7, CopyState::Available),
        ]);

        service.add(1, 10).await.unwrap();
        service.add(1, 5).await.unwrap();
        service.add(1, 7).await.unwrap();

        let items = service.list(1).await.unwrap();
        let ids: Vec<i32> = items.iter().map(|i| i.copy_id).collect();
        assert_eq!(ids, vec![10, 5, 7]);
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_full_cart() {
        let copies: Vec<(i32, CopyState)> =
            (1..=6).map(|id| (id, CopyState::Available)).collect();
        let (service, _, _) = service(&copies);

        service.add(1, 1).await.unwrap();
        let err = service.add(1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyInCart(1)));

        for id in 2..=5 {
            service.add(1, id).await.unwrap();
        }
        let err = service.add(1, 6).await.unwrap_err();
        assert!(matches!(err, AppError::CartFull(5)));
    }

    #[tokio::test]
    async fn add_rejects_unavailable_and_unknown_copies() {
        let (service, _, _) = service(&[(1, CopyState::Reserved)]);

        let err = service.add(1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::CopyUnavailable(1)));

        let err = service.add(1, 99).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_and_clear_are_idempotent() {
        let (service, _, _) = service(&[(1, CopyState::Available)]);

        // Absent item and empty cart are fine
        service.remove(1, 42).await.unwrap();
        service.clear(1).await.unwrap();

        service.add(1, 1).await.unwrap();
        service.remove(1, 1).await.unwrap();
        service.remove(1, 1).await.unwrap();
        assert!(service.list(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_does_not_touch_copy_state() {
        let (service, _, copies) = service(&[(1, CopyState::Available)]);
        service.add(1, 1).await.unwrap();
        assert_eq!(copies.state_of(1), Some(CopyState::Available));
    }

    #[tokio::test]
    async fn add_propagates_inventory_failures() {
        let carts = Arc::new(InMemoryCartStore::default());
        let mut copies = MockCopyStore::new();
        copies
            .expect_get()
            .returning(|_| Err(AppError::Unavailable("db down".into())));
        let policy = ReservationsConfig::default();
        let service = CartService::new(carts, Arc::new(copies), &policy);

        let err = service.add(1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
