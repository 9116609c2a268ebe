//! Lifecycle clock: time-driven consistency checks
//!
//! The sweep is strictly read-only. It reports approved reservations whose
//! confirmed pickup or return time has passed without the matching
//! confirmation; it never rejects or auto-cancels anything, so a background
//! timer can never take an irreversible decision on a user's behalf.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    error::AppResult,
    models::reservation::{AlertKind, LifecycleAlert},
    repository::reservations::ReservationStore,
};

#[derive(Clone)]
pub struct LifecycleClock {
    reservations: Arc<dyn ReservationStore>,
}

impl LifecycleClock {
    pub fn new(reservations: Arc<dyn ReservationStore>) -> Self {
        Self { reservations }
    }

    /// Collect every reservation needing administrator attention at `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<Vec<LifecycleAlert>> {
        let mut alerts = Vec::new();

        for r in self.reservations.list_missed_pickups(now).await? {
            if let Some(due) = r.confirmed_pickup {
                alerts.push(LifecycleAlert {
                    reservation_id: r.id,
                    user_id: r.user_id,
                    kind: AlertKind::MissedPickup,
                    due,
                });
            }
        }

        for r in self.reservations.list_missed_returns(now).await? {
            if let Some(due) = r.confirmed_return {
                alerts.push(LifecycleAlert {
                    reservation_id: r.id,
                    user_id: r.user_id,
                    kind: AlertKind::MissedReturn,
                    due,
                });
            }
        }

        Ok(alerts)
    }

    /// Run the periodic sweep until the shutdown channel fires
    pub fn spawn(self, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep(Utc::now()).await {
                            Ok(alerts) => {
                                for alert in &alerts {
                                    tracing::warn!(
                                        "Reservation {} for user {}: {:?} (due {})",
                                        alert.reservation_id,
                                        alert.user_id,
                                        alert.kind,
                                        alert.due
                                    );
                                }
                            }
                            Err(e) => tracing::error!("Lifecycle sweep failed: {}", e),
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Lifecycle sweep stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reservation::{NewReservation, ReservationStatus};
    use crate::repository::memory::InMemoryReservationStore;
    use chrono::{NaiveDate, TimeZone};

    async fn approved_reservation(
        store: &InMemoryReservationStore,
        pickup: DateTime<Utc>,
        ret: DateTime<Utc>,
    ) -> i32 {
        let r = store
            .create(NewReservation {
                user_id: 7,
                copy_ids: vec![1],
                start_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 6, 9).unwrap(),
                pickup_slots: vec![pickup],
                return_slots: vec![ret],
            })
            .await
            .unwrap();
        assert!(store.approve(r.id, pickup, ret, Utc::now()).await.unwrap());
        r.id
    }

    #[tokio::test]
    async fn sweep_reports_missed_pickups_without_changing_state() {
        let store = Arc::new(InMemoryReservationStore::default());
        let pickup = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let ret = Utc.with_ymd_and_hms(2025, 6, 9, 9, 0, 0).unwrap();
        let id = approved_reservation(&store, pickup, ret).await;

        let clock = LifecycleClock::new(store.clone());

        // Before the confirmed pickup time: nothing to report
        let before = Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap();
        assert!(clock.sweep(before).await.unwrap().is_empty());

        // After it: one MissedPickup alert, reservation untouched
        let after = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let alerts = clock.sweep(after).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].reservation_id, id);
        assert_eq!(alerts[0].kind, AlertKind::MissedPickup);
        assert_eq!(alerts[0].due, pickup);
        assert_eq!(
            store.get(id).await.unwrap().status,
            ReservationStatus::Approved
        );
    }

    #[tokio::test]
    async fn sweep_reports_missed_returns_after_pickup() {
        let store = Arc::new(InMemoryReservationStore::default());
        let pickup = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let ret = Utc.with_ymd_and_hms(2025, 6, 9, 9, 0, 0).unwrap();
        let id = approved_reservation(&store, pickup, ret).await;
        assert!(store.mark_picked_up(id, pickup).await.unwrap());

        let clock = LifecycleClock::new(store.clone());

        let after_return = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
        let alerts = clock.sweep(after_return).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::MissedReturn);

        // Once returned, the alert disappears
        assert!(store.mark_returned(id, after_return).await.unwrap());
        assert!(clock.sweep(after_return).await.unwrap().is_empty());
    }
}
