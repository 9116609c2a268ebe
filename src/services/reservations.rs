//! Reservation negotiation service
//!
//! Owns the reservation state machine: checkout creates a Pending
//! reservation holding the user's candidate timeslots, an administrator
//! resolves it by choosing one candidate of each list (or rejecting), and
//! pickup/return confirmations walk the copies through Borrowed back to
//! Available. Copy claims and reservation rows always move together:
//! a reservation in Pending or Approved holds exclusive claims on all of
//! its copies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    config::ReservationsConfig,
    error::{AppError, AppResult},
    models::reservation::{
        NewReservation, ReservationDetails, ReservationFilter, ReservationStatus,
    },
    repository::{carts::CartStore, reservations::ReservationStore},
    services::allocator::Allocator,
};

const STORAGE_ATTEMPTS: u32 = 3;

fn is_transient(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
}

/// Run a storage operation, retrying transient faults a bounded number of
/// times. Claim conflicts and failed state checks are never retried; this
/// only covers connection hiccups. The operation must be safe to re-run.
async fn with_storage_retry<T, F, Fut>(what: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    for attempt in 1..=STORAGE_ATTEMPTS {
        match op().await {
            Ok(v) => return Ok(v),
            Err(AppError::Database(e)) if is_transient(&e) && attempt < STORAGE_ATTEMPTS => {
                tracing::warn!(
                    "Transient storage fault during {} (attempt {}): {}",
                    what,
                    attempt,
                    e
                );
                tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
            }
            Err(AppError::Database(e)) if is_transient(&e) => {
                return Err(AppError::Unavailable(format!(
                    "{} failed after {} attempts: {}",
                    what, STORAGE_ATTEMPTS, e
                )));
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("retry loop always returns")
}

#[derive(Clone)]
pub struct ReservationsService {
    reservations: Arc<dyn ReservationStore>,
    carts: Arc<dyn CartStore>,
    allocator: Allocator,
    policy: ReservationsConfig,
}

impl ReservationsService {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        carts: Arc<dyn CartStore>,
        allocator: Allocator,
        policy: ReservationsConfig,
    ) -> Self {
        Self {
            reservations,
            carts,
            allocator,
            policy,
        }
    }

    /// Convert the user's cart into a Pending reservation.
    ///
    /// Validation happens before any claim attempt, so an invalid request
    /// never leaves partial state. Claim and persistence form one logical
    /// transaction: a persistence failure rolls the claims back.
    pub async fn checkout(
        &self,
        user_id: i32,
        start_date: NaiveDate,
        end_date: NaiveDate,
        pickup_slots: Vec<DateTime<Utc>>,
        return_slots: Vec<DateTime<Utc>>,
    ) -> AppResult<ReservationDetails> {
        self.validate_request(start_date, end_date, &pickup_slots, &return_slots)?;

        let items = self.carts.list(user_id).await?;
        if items.is_empty() {
            return Err(AppError::EmptyCart);
        }
        if items.len() > self.policy.max_cart_items {
            return Err(AppError::Validation(format!(
                "Cart exceeds the limit of {} copies",
                self.policy.max_cart_items
            )));
        }

        let copy_ids: Vec<i32> = items.iter().map(|i| i.copy_id).collect();
        let claimed = self.allocator.claim_all(&copy_ids).await?;

        let new = NewReservation {
            user_id,
            copy_ids: claimed.clone(),
            start_date,
            end_date,
            pickup_slots,
            return_slots,
        };

        let created = match self.persist(new).await {
            Ok(r) => r,
            Err(e) => {
                // The claims must not outlive a reservation that was never
                // persisted.
                if let Err(release_err) = self.allocator.release_all(&claimed).await {
                    tracing::error!(
                        "Failed to roll back claims after persistence failure: {}",
                        release_err
                    );
                }
                return Err(e);
            }
        };

        // The reservation exists either way; a stale cart is harmless.
        if let Err(e) = self.carts.clear(user_id).await {
            tracing::warn!("Failed to clear cart for user {}: {}", user_id, e);
        }

        tracing::info!(
            "Reservation {} created for user {} with {} copies",
            created.id,
            user_id,
            created.copy_ids.len()
        );
        Ok(created)
    }

    /// Approve a pending reservation with one candidate of each list.
    ///
    /// The administrator may only select among what the user offered.
    pub async fn approve(
        &self,
        reservation_id: i32,
        pickup_slot: DateTime<Utc>,
        return_slot: DateTime<Utc>,
    ) -> AppResult<ReservationDetails> {
        let reservation = self.reservations.get(reservation_id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(AppError::StateViolation);
        }

        if !reservation.pickup_slots.contains(&pickup_slot) {
            return Err(AppError::InvalidSlot(
                "pickup_slot is not among the suggested pickup timeslots".to_string(),
            ));
        }
        if !reservation.return_slots.contains(&return_slot) {
            return Err(AppError::InvalidSlot(
                "return_slot is not among the suggested return timeslots".to_string(),
            ));
        }

        let updated = self
            .reservations
            .approve(reservation_id, pickup_slot, return_slot, Utc::now())
            .await?;
        if !updated {
            // Another administrator decided first
            return Err(AppError::StateViolation);
        }

        self.reservations.get(reservation_id).await
    }

    /// Reject a pending reservation and release every claimed copy
    pub async fn reject(&self, reservation_id: i32) -> AppResult<ReservationDetails> {
        let reservation = self.reservations.get(reservation_id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(AppError::StateViolation);
        }

        let updated = self
            .reservations
            .mark_rejected(reservation_id, Utc::now())
            .await?;
        if !updated {
            return Err(AppError::StateViolation);
        }

        // The reservation is already terminal, so an abandoned release
        // would leak the claims with no owner left to free them. Ride out
        // transient faults; release_all is safe to re-run.
        with_storage_retry("claim release", || {
            self.allocator.release_all(&reservation.copy_ids)
        })
        .await?;

        self.reservations.get(reservation_id).await
    }

    /// Confirm that the user picked the copies up (Reserved -> Borrowed)
    pub async fn mark_picked_up(&self, reservation_id: i32) -> AppResult<ReservationDetails> {
        let reservation = self.reservations.get(reservation_id).await?;
        if reservation.status != ReservationStatus::Approved
            || reservation.picked_up_at.is_some()
        {
            return Err(AppError::StateViolation);
        }

        let updated = self
            .reservations
            .mark_picked_up(reservation_id, Utc::now())
            .await?;
        if !updated {
            return Err(AppError::StateViolation);
        }

        // picked_up_at is already set; borrow_all tolerates copies moved
        // by an earlier partial attempt, so the retry can finish the job.
        with_storage_retry("pickup confirmation", || {
            self.allocator.borrow_all(&reservation.copy_ids)
        })
        .await?;

        self.reservations.get(reservation_id).await
    }

    /// Confirm the return: copies back to Available, reservation terminal
    pub async fn mark_returned(&self, reservation_id: i32) -> AppResult<ReservationDetails> {
        let reservation = self.reservations.get(reservation_id).await?;
        if reservation.status != ReservationStatus::Approved
            || reservation.picked_up_at.is_none()
            || reservation.returned_at.is_some()
        {
            return Err(AppError::StateViolation);
        }

        let updated = self
            .reservations
            .mark_returned(reservation_id, Utc::now())
            .await?;
        if !updated {
            return Err(AppError::StateViolation);
        }

        with_storage_retry("claim release", || {
            self.allocator.release_all(&reservation.copy_ids)
        })
        .await?;

        self.reservations.get(reservation_id).await
    }

    pub async fn get(&self, reservation_id: i32) -> AppResult<ReservationDetails> {
        self.reservations.get(reservation_id).await
    }

    pub async fn list(&self, filter: ReservationFilter) -> AppResult<Vec<ReservationDetails>> {
        self.reservations.list(filter).await
    }

    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<ReservationDetails>> {
        self.reservations
            .list(ReservationFilter {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await
    }

    fn validate_request(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        pickup_slots: &[DateTime<Utc>],
        return_slots: &[DateTime<Utc>],
    ) -> AppResult<()> {
        if end_date < start_date {
            return Err(AppError::Validation(
                "end_date must be on or after start_date".to_string(),
            ));
        }

        let max = self.policy.max_slots;
        if pickup_slots.is_empty() || pickup_slots.len() > max {
            return Err(AppError::Validation(format!(
                "between 1 and {} pickup timeslots required",
                max
            )));
        }
        if return_slots.is_empty() || return_slots.len() > max {
            return Err(AppError::Validation(format!(
                "between 1 and {} return timeslots required",
                max
            )));
        }

        for slot in pickup_slots {
            let day = slot.date_naive();
            if day < start_date || day > end_date {
                return Err(AppError::InvalidSlot(format!(
                    "pickup slot {} is outside the requested date range",
                    slot
                )));
            }
        }

        let return_deadline = end_date + chrono::Days::new(self.policy.return_grace_days as u64);
        for slot in return_slots {
            let day = slot.date_naive();
            if day < start_date || day > return_deadline {
                return Err(AppError::InvalidSlot(format!(
                    "return slot {} is outside the requested date range and grace window",
                    slot
                )));
            }
        }

        Ok(())
    }

    /// Persist the reservation; claims already succeeded at this point,
    /// so a storage hiccup is worth riding out before rolling them back.
    async fn persist(&self, new: NewReservation) -> AppResult<ReservationDetails> {
        with_storage_retry("reservation insert", || {
            self.reservations.create(new.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cart::CartItem;
    use crate::models::copy::CopyState;
    use crate::repository::memory::{
        InMemoryCartStore, InMemoryCopyStore, InMemoryReservationStore,
    };
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    struct Fixture {
        service: ReservationsService,
        copies: Arc<InMemoryCopyStore>,
        carts: Arc<InMemoryCartStore>,
        reservations: Arc<InMemoryReservationStore>,
    }

    fn fixture(copy_states: &[(i32, CopyState)]) -> Fixture {
        let copies = Arc::new(InMemoryCopyStore::with_copies(copy_states));
        let carts = Arc::new(InMemoryCartStore::default());
        let reservations = Arc::new(InMemoryReservationStore::default());
        let allocator = Allocator::new(copies.clone());
        let service = ReservationsService::new(
            reservations.clone(),
            carts.clone(),
            allocator,
            ReservationsConfig::default(),
        );
        Fixture {
            service,
            copies,
            carts,
            reservations,
        }
    }

    async fn fill_cart(carts: &InMemoryCartStore, user_id: i32, copy_ids: &[i32]) {
        for &copy_id in copy_ids {
            carts
                .push(
                    user_id,
                    CartItem {
                        copy_id,
                        added_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn slot(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    /// Monday 9am / Monday 5pm pickup candidates within a one-week range
    fn default_checkout(
        service: &ReservationsService,
        user_id: i32,
    ) -> impl std::future::Future<Output = AppResult<ReservationDetails>> + '_ {
        service.checkout(
            user_id,
            date(2025, 6, 2),
            date(2025, 6, 9),
            vec![slot(2025, 6, 2, 9), slot(2025, 6, 2, 17)],
            vec![slot(2025, 6, 9, 9), slot(2025, 6, 9, 17)],
        )
    }

    #[tokio::test]
    async fn checkout_claims_copies_and_creates_pending_reservation() {
        let f = fixture(&[(1, CopyState::Available), (2, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[2, 1]).await;

        let r = default_checkout(&f.service, 7).await.unwrap();
        assert_eq!(r.status, ReservationStatus::Pending);
        assert_eq!(r.copy_ids, vec![1, 2]);
        assert_eq!(f.copies.state_of(1), Some(CopyState::Reserved));
        assert_eq!(f.copies.state_of(2), Some(CopyState::Reserved));
        // Cart is consumed by the checkout
        assert!(f.carts.list(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_with_empty_cart_is_rejected() {
        let f = fixture(&[]);
        let err = default_checkout(&f.service, 7).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));
    }

    #[tokio::test]
    async fn checkout_at_exactly_the_cart_bound_succeeds() {
        let states: Vec<(i32, CopyState)> =
            (1..=5).map(|id| (id, CopyState::Available)).collect();
        let f = fixture(&states);
        fill_cart(&f.carts, 7, &[1, 2, 3, 4, 5]).await;

        let r = default_checkout(&f.service, 7).await.unwrap();
        assert_eq!(r.copy_ids.len(), 5);
    }

    #[tokio::test]
    async fn checkout_rejects_a_cart_grown_past_the_bound() {
        let states: Vec<(i32, CopyState)> =
            (1..=6).map(|id| (id, CopyState::Available)).collect();
        let f = fixture(&states);
        // Six items, one past the default bound of five; the add-time check
        // is bypassed by writing to the store directly
        fill_cart(&f.carts, 7, &[1, 2, 3, 4, 5, 6]).await;

        let err = default_checkout(&f.service, 7).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // Nothing was claimed
        for id in 1..=6 {
            assert_eq!(f.copies.state_of(id), Some(CopyState::Available));
        }
    }

    #[tokio::test]
    async fn checkout_validates_before_claiming_anything() {
        let f = fixture(&[(1, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[1]).await;

        // Inverted date range
        let err = f
            .service
            .checkout(
                7,
                date(2025, 6, 9),
                date(2025, 6, 2),
                vec![slot(2025, 6, 2, 9)],
                vec![slot(2025, 6, 9, 9)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Pickup slot outside the range
        let err = f
            .service
            .checkout(
                7,
                date(2025, 6, 2),
                date(2025, 6, 9),
                vec![slot(2025, 6, 1, 9)],
                vec![slot(2025, 6, 9, 9)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSlot(_)));

        // Return slot past the grace window (default 7 days)
        let err = f
            .service
            .checkout(
                7,
                date(2025, 6, 2),
                date(2025, 6, 9),
                vec![slot(2025, 6, 2, 9)],
                vec![slot(2025, 6, 17, 9)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSlot(_)));

        // Too many candidates
        let err = f
            .service
            .checkout(
                7,
                date(2025, 6, 2),
                date(2025, 6, 9),
                (0..6).map(|h| slot(2025, 6, 2, 9 + h)).collect(),
                vec![slot(2025, 6, 9, 9)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Nothing was claimed by any of the failed attempts
        assert_eq!(f.copies.state_of(1), Some(CopyState::Available));
        assert_eq!(f.carts.list(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_rolls_back_the_claims() {
        let f = fixture(&[(1, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[1]).await;
        f.reservations.fail_next_create.store(true, Ordering::SeqCst);

        let err = default_checkout(&f.service, 7).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert_eq!(f.copies.state_of(1), Some(CopyState::Available));
        // The cart survives a failed checkout
        assert_eq!(f.carts.list(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_checkouts_sharing_a_copy_produce_one_reservation() {
        let f = fixture(&[(1, CopyState::Available)]);
        fill_cart(&f.carts, 10, &[1]).await;
        fill_cart(&f.carts, 20, &[1]).await;

        let s1 = f.service.clone();
        let s2 = f.service.clone();
        let (r1, r2) = tokio::join!(default_checkout(&s1, 10), default_checkout(&s2, 20));

        let (wins, losses): (Vec<_>, Vec<_>) =
            [r1, r2].into_iter().partition(|r| r.is_ok());
        assert_eq!(wins.len(), 1);
        assert_eq!(losses.len(), 1);
        assert!(matches!(
            losses.into_iter().next().unwrap().unwrap_err(),
            AppError::CopyAlreadyClaimed(1)
        ));

        // Copy ends Reserved by the single winning reservation
        assert_eq!(f.copies.state_of(1), Some(CopyState::Reserved));
        let all = f
            .service
            .list(ReservationFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn approve_accepts_only_suggested_slots() {
        let f = fixture(&[(1, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[1]).await;
        let r = default_checkout(&f.service, 7).await.unwrap();

        // A slot the user never offered (Tue 9am) is refused
        let err = f
            .service
            .approve(r.id, slot(2025, 6, 3, 9), slot(2025, 6, 9, 9))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSlot(_)));

        let approved = f
            .service
            .approve(r.id, slot(2025, 6, 2, 9), slot(2025, 6, 9, 17))
            .await
            .unwrap();
        assert_eq!(approved.status, ReservationStatus::Approved);
        assert_eq!(approved.confirmed_pickup, Some(slot(2025, 6, 2, 9)));
        assert_eq!(approved.confirmed_return, Some(slot(2025, 6, 9, 17)));
        // Copies stay Reserved until actual pickup
        assert_eq!(f.copies.state_of(1), Some(CopyState::Reserved));

        // Approving twice is a state violation
        let err = f
            .service
            .approve(r.id, slot(2025, 6, 2, 9), slot(2025, 6, 9, 17))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StateViolation));
    }

    #[tokio::test]
    async fn checkout_then_reject_returns_every_copy_to_available() {
        let f = fixture(&[(1, CopyState::Available), (2, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[1, 2]).await;
        let r = default_checkout(&f.service, 7).await.unwrap();

        let rejected = f.service.reject(r.id).await.unwrap();
        assert_eq!(rejected.status, ReservationStatus::Rejected);
        assert_eq!(f.copies.state_of(1), Some(CopyState::Available));
        assert_eq!(f.copies.state_of(2), Some(CopyState::Available));
        // Candidate slots are retained for audit
        assert_eq!(rejected.pickup_slots.len(), 2);

        let err = f.service.reject(r.id).await.unwrap_err();
        assert!(matches!(err, AppError::StateViolation));
    }

    #[tokio::test]
    async fn reject_rides_out_a_transient_release_fault() {
        let f = fixture(&[(1, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[1]).await;
        let r = default_checkout(&f.service, 7).await.unwrap();

        // The first Reserved -> Available transition hits a storage fault.
        // The claim must still be freed: the reservation goes terminal, so
        // an abandoned release would leak it permanently.
        f.copies.fail_next_cas.store(true, Ordering::SeqCst);

        let rejected = f.service.reject(r.id).await.unwrap();
        assert_eq!(rejected.status, ReservationStatus::Rejected);
        assert_eq!(f.copies.state_of(1), Some(CopyState::Available));
    }

    #[tokio::test]
    async fn pickup_rides_out_a_transient_borrow_fault() {
        let f = fixture(&[(1, CopyState::Available), (2, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[1, 2]).await;
        let r = default_checkout(&f.service, 7).await.unwrap();
        f.service
            .approve(r.id, slot(2025, 6, 2, 9), slot(2025, 6, 9, 9))
            .await
            .unwrap();

        f.copies.fail_next_cas.store(true, Ordering::SeqCst);

        let picked = f.service.mark_picked_up(r.id).await.unwrap();
        assert!(picked.picked_up_at.is_some());
        assert_eq!(f.copies.state_of(1), Some(CopyState::Borrowed));
        assert_eq!(f.copies.state_of(2), Some(CopyState::Borrowed));
    }

    #[tokio::test]
    async fn pickup_and_return_walk_the_full_lifecycle() {
        let f = fixture(&[(1, CopyState::Available)]);
        fill_cart(&f.carts, 7, &[1]).await;
        let r = default_checkout(&f.service, 7).await.unwrap();

        // Pickup before approval is a state violation
        let err = f.service.mark_picked_up(r.id).await.unwrap_err();
        assert!(matches!(err, AppError::StateViolation));

        f.service
            .approve(r.id, slot(2025, 6, 2, 9), slot(2025, 6, 9, 9))
            .await
            .unwrap();

        // Return before pickup is a state violation
        let err = f.service.mark_returned(r.id).await.unwrap_err();
        assert!(matches!(err, AppError::StateViolation));

        let picked = f.service.mark_picked_up(r.id).await.unwrap();
        assert!(picked.picked_up_at.is_some());
        assert_eq!(f.copies.state_of(1), Some(CopyState::Borrowed));

        let returned = f.service.mark_returned(r.id).await.unwrap();
        assert_eq!(returned.status, ReservationStatus::Returned);
        assert_eq!(f.copies.state_of(1), Some(CopyState::Available));

        // A second return is a state violation
        let err = f.service.mark_returned(r.id).await.unwrap_err();
        assert!(matches!(err, AppError::StateViolation));
    }

    #[tokio::test]
    async fn list_for_user_filters_by_owner() {
        let f = fixture(&[(1, CopyState::Available), (2, CopyState::Available)]);
        fill_cart(&f.carts, 10, &[1]).await;
        fill_cart(&f.carts, 20, &[2]).await;
        default_checkout(&f.service, 10).await.unwrap();
        default_checkout(&f.service, 20).await.unwrap();

        let mine = f.service.list_for_user(10).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user_id, 10);
    }
}
