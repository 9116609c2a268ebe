//! Availability allocator: the sole writer of copy state transitions
//!
//! All transitions go through the inventory compare-and-set primitive, so
//! two callers racing for the same copy are serialized by storage: exactly
//! one observes `Available` and wins. Claiming several copies acquires them
//! in ascending id order, which rules out cyclic waits between concurrent
//! checkouts without any lock manager.

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::copy::CopyState,
    repository::copies::CopyStore,
};

#[derive(Clone)]
pub struct Allocator {
    copies: Arc<dyn CopyStore>,
}

impl Allocator {
    pub fn new(copies: Arc<dyn CopyStore>) -> Self {
        Self { copies }
    }

    /// Atomically claim every listed copy (Available -> Reserved).
    ///
    /// On the first conflict, every copy already claimed by this call is
    /// rolled back in reverse order and the whole operation fails naming
    /// the contested copy. Conflicts are never retried here; the caller
    /// surfaces them so the user can drop the contested copy and resubmit.
    ///
    /// Returns the claimed ids in claim (ascending) order.
    pub async fn claim_all(&self, copy_ids: &[i32]) -> AppResult<Vec<i32>> {
        if copy_ids.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let mut ordered = copy_ids.to_vec();
        ordered.sort_unstable();
        if ordered.windows(2).any(|w| w[0] == w[1]) {
            return Err(AppError::Validation(
                "Duplicate copy in claim set".to_string(),
            ));
        }

        let mut claimed: Vec<i32> = Vec::with_capacity(ordered.len());
        for &copy_id in &ordered {
            match self
                .copies
                .compare_and_set_state(copy_id, CopyState::Available, CopyState::Reserved)
                .await
            {
                Ok(true) => claimed.push(copy_id),
                Ok(false) => {
                    self.unwind(&claimed).await;
                    return Err(AppError::CopyAlreadyClaimed(copy_id));
                }
                Err(e) => {
                    self.unwind(&claimed).await;
                    return Err(e);
                }
            }
        }

        Ok(claimed)
    }

    /// Release a set of claims taken by this call, newest first
    pub async fn release_all(&self, claimed: &[i32]) -> AppResult<()> {
        let mut first_err = None;
        for &copy_id in claimed.iter().rev() {
            if let Err(e) = self.release(copy_id).await {
                tracing::error!("Failed to release copy {}: {}", copy_id, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Confirm pickup of every claimed copy (Reserved -> Borrowed).
    ///
    /// Idempotent: a copy already Borrowed counts as done, so the caller
    /// can re-run the loop after a transient storage fault and finish the
    /// remaining transitions.
    pub async fn borrow_all(&self, claimed: &[i32]) -> AppResult<()> {
        for &copy_id in claimed {
            if self
                .copies
                .compare_and_set_state(copy_id, CopyState::Reserved, CopyState::Borrowed)
                .await?
            {
                continue;
            }
            if self.copies.get(copy_id).await?.state() == CopyState::Borrowed {
                continue;
            }
            return Err(AppError::StateViolation);
        }
        Ok(())
    }

    /// Return a copy to the shelf from any active state.
    ///
    /// Idempotent: releasing an already-available copy is a no-op.
    pub async fn release(&self, copy_id: i32) -> AppResult<()> {
        if self
            .copies
            .compare_and_set_state(copy_id, CopyState::Reserved, CopyState::Available)
            .await?
        {
            return Ok(());
        }
        if self
            .copies
            .compare_and_set_state(copy_id, CopyState::Borrowed, CopyState::Available)
            .await?
        {
            return Ok(());
        }
        Ok(())
    }

    /// Best-effort rollback of a partially-completed claim loop
    async fn unwind(&self, claimed: &[i32]) {
        for &copy_id in claimed.iter().rev() {
            match self
                .copies
                .compare_and_set_state(copy_id, CopyState::Reserved, CopyState::Available)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::error!("Rollback found copy {} in an unexpected state", copy_id)
                }
                Err(e) => tracing::error!("Rollback failed for copy {}: {}", copy_id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryCopyStore;

    fn allocator_with(states: &[(i32, CopyState)]) -> (Allocator, Arc<InMemoryCopyStore>) {
        let store = Arc::new(InMemoryCopyStore::with_copies(states));
        (Allocator::new(store.clone()), store)
    }

    #[tokio::test]
    async fn claims_every_copy_in_ascending_order() {
        let (allocator, store) = allocator_with(&[
            (3, CopyState::Available),
            (1, CopyState::Available),
            (2, CopyState::Available),
        ]);

        let claimed = allocator.claim_all(&[3, 1, 2]).await.unwrap();
        assert_eq!(claimed, vec![1, 2, 3]);
        for id in [1, 2, 3] {
            assert_eq!(store.state_of(id), Some(CopyState::Reserved));
        }
    }

    #[tokio::test]
    async fn conflict_rolls_back_earlier_claims() {
        let (allocator, store) = allocator_with(&[
            (1, CopyState::Available),
            (2, CopyState::Reserved),
            (3, CopyState::Available),
        ]);

        let err = allocator.claim_all(&[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, AppError::CopyAlreadyClaimed(2)));

        // Copy 1 was claimed before the conflict and must be released again;
        // copy 3 was never touched.
        assert_eq!(store.state_of(1), Some(CopyState::Available));
        assert_eq!(store.state_of(2), Some(CopyState::Reserved));
        assert_eq!(store.state_of(3), Some(CopyState::Available));
    }

    #[tokio::test]
    async fn empty_claim_set_is_rejected() {
        let (allocator, _) = allocator_with(&[]);
        let err = allocator.claim_all(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));
    }

    #[tokio::test]
    async fn duplicate_copy_ids_are_rejected_before_any_claim() {
        let (allocator, store) = allocator_with(&[(1, CopyState::Available)]);
        let err = allocator.claim_all(&[1, 1]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.state_of(1), Some(CopyState::Available));
    }

    #[tokio::test]
    async fn exactly_one_of_many_racing_claims_wins_the_shared_copy() {
        let (allocator, store) = allocator_with(&[
            (1, CopyState::Available),
            (2, CopyState::Available),
            (3, CopyState::Available),
            (4, CopyState::Available),
        ]);

        // Every task wants copy 1 plus a private copy
        let mut handles = Vec::new();
        for private in [2, 3, 4] {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator.claim_all(&[1, private]).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(claimed) => {
                    winners += 1;
                    assert!(claimed.contains(&1));
                }
                Err(AppError::CopyAlreadyClaimed(1)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(store.state_of(1), Some(CopyState::Reserved));
        // Losers rolled back their private copies, the winner kept its own:
        // exactly two copies end Reserved overall.
        let reserved = [1, 2, 3, 4]
            .iter()
            .filter(|&&id| store.state_of(id) == Some(CopyState::Reserved))
            .count();
        assert_eq!(reserved, 2);
    }

    #[tokio::test]
    async fn borrow_all_requires_reserved_state() {
        let (allocator, store) = allocator_with(&[
            (1, CopyState::Reserved),
            (2, CopyState::Available),
        ]);

        allocator.borrow_all(&[1]).await.unwrap();
        assert_eq!(store.state_of(1), Some(CopyState::Borrowed));

        let err = allocator.borrow_all(&[2]).await.unwrap_err();
        assert!(matches!(err, AppError::StateViolation));
    }

    #[tokio::test]
    async fn borrow_all_tolerates_copies_borrowed_by_an_earlier_attempt() {
        let (allocator, store) = allocator_with(&[
            (1, CopyState::Borrowed),
            (2, CopyState::Reserved),
        ]);

        allocator.borrow_all(&[1, 2]).await.unwrap();
        assert_eq!(store.state_of(1), Some(CopyState::Borrowed));
        assert_eq!(store.state_of(2), Some(CopyState::Borrowed));
    }

    #[tokio::test]
    async fn release_is_idempotent_and_covers_both_active_states() {
        let (allocator, store) = allocator_with(&[
            (1, CopyState::Reserved),
            (2, CopyState::Borrowed),
            (3, CopyState::Available),
        ]);

        for id in [1, 2, 3] {
            allocator.release(id).await.unwrap();
            assert_eq!(store.state_of(id), Some(CopyState::Available));
        }
        // Releasing again stays a no-op
        allocator.release(1).await.unwrap();
        assert_eq!(store.state_of(1), Some(CopyState::Available));
    }
}
