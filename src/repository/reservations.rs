//! Reservations repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::reservation::{
        NewReservation, ReservationDetails, ReservationFilter, ReservationRow, ReservationStatus,
    },
};

/// Durable reservation storage.
///
/// Status transitions are guarded UPDATEs returning whether the row was in
/// the expected state, mirroring the copy compare-and-set discipline: a lost
/// race surfaces as `false`, never as a silent overwrite. Reservations are
/// never deleted; terminal states are retained for audit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn create(&self, new: NewReservation) -> AppResult<ReservationDetails>;

    async fn get(&self, id: i32) -> AppResult<ReservationDetails>;

    async fn list(&self, filter: ReservationFilter) -> AppResult<Vec<ReservationDetails>>;

    /// Pending -> Approved with the chosen slots; false if not Pending
    async fn approve(
        &self,
        id: i32,
        pickup: DateTime<Utc>,
        ret: DateTime<Utc>,
        decided_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Pending -> Rejected; false if not Pending
    async fn mark_rejected(&self, id: i32, decided_at: DateTime<Utc>) -> AppResult<bool>;

    /// Record pickup on an Approved, not-yet-picked-up reservation
    async fn mark_picked_up(&self, id: i32, at: DateTime<Utc>) -> AppResult<bool>;

    /// Approved (picked up) -> Returned; false unless picked up and unreturned
    async fn mark_returned(&self, id: i32, at: DateTime<Utc>) -> AppResult<bool>;

    /// Approved reservations whose confirmed pickup has passed unconfirmed
    async fn list_missed_pickups(&self, now: DateTime<Utc>)
        -> AppResult<Vec<ReservationDetails>>;

    /// Approved reservations whose confirmed return has passed unconfirmed
    async fn list_missed_returns(&self, now: DateTime<Utc>)
        -> AppResult<Vec<ReservationDetails>>;
}

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn load_copy_ids(&self, reservation_id: i32) -> AppResult<Vec<i32>> {
        let ids = sqlx::query_scalar::<_, i32>(
            "SELECT copy_id FROM reservation_copies WHERE reservation_id = $1 ORDER BY position",
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn with_copies(&self, rows: Vec<ReservationRow>) -> AppResult<Vec<ReservationDetails>> {
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let copy_ids = self.load_copy_ids(row.id).await?;
            result.push(ReservationDetails::from_row(row, copy_ids));
        }
        Ok(result)
    }
}

#[async_trait]
impl ReservationStore for ReservationsRepository {
    async fn create(&self, new: NewReservation) -> AppResult<ReservationDetails> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO reservations
                (user_id, status, start_date, end_date, pickup_slots, return_slots, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id
            "#,
        )
        .bind(new.user_id)
        .bind(i16::from(ReservationStatus::Pending))
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(Json(&new.pickup_slots))
        .bind(Json(&new.return_slots))
        .fetch_one(&mut *tx)
        .await?;

        for (position, copy_id) in new.copy_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO reservation_copies (reservation_id, copy_id, position) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(copy_id)
            .bind(position as i16)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get(id).await
    }

    async fn get(&self, id: i32) -> AppResult<ReservationDetails> {
        let row = sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?;

        let copy_ids = self.load_copy_ids(id).await?;
        Ok(ReservationDetails::from_row(row, copy_ids))
    }

    async fn list(&self, filter: ReservationFilter) -> AppResult<Vec<ReservationDetails>> {
        let mut sql = String::from("SELECT * FROM reservations WHERE TRUE");
        if filter.status.is_some() {
            sql.push_str(" AND status = $1");
        }
        if filter.user_id.is_some() {
            sql.push_str(if filter.status.is_some() {
                " AND user_id = $2"
            } else {
                " AND user_id = $1"
            });
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query_as::<_, ReservationRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(i16::from(status));
        }
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        self.with_copies(rows).await
    }

    async fn approve(
        &self,
        id: i32,
        pickup: DateTime<Utc>,
        ret: DateTime<Utc>,
        decided_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $2, confirmed_pickup = $3, confirmed_return = $4, decided_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(id)
        .bind(i16::from(ReservationStatus::Approved))
        .bind(pickup)
        .bind(ret)
        .bind(decided_at)
        .bind(i16::from(ReservationStatus::Pending))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_rejected(&self, id: i32, decided_at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET status = $2, decided_at = $3 WHERE id = $1 AND status = $4",
        )
        .bind(id)
        .bind(i16::from(ReservationStatus::Rejected))
        .bind(decided_at)
        .bind(i16::from(ReservationStatus::Pending))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_picked_up(&self, id: i32, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations SET picked_up_at = $2
            WHERE id = $1 AND status = $3 AND picked_up_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(i16::from(ReservationStatus::Approved))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_returned(&self, id: i32, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations SET status = $2, returned_at = $3
            WHERE id = $1 AND status = $4 AND picked_up_at IS NOT NULL AND returned_at IS NULL
            "#,
        )
        .bind(id)
        .bind(i16::from(ReservationStatus::Returned))
        .bind(at)
        .bind(i16::from(ReservationStatus::Approved))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_missed_pickups(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<ReservationDetails>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT * FROM reservations
            WHERE status = $1 AND picked_up_at IS NULL AND confirmed_pickup < $2
            ORDER BY confirmed_pickup
            "#,
        )
        .bind(i16::from(ReservationStatus::Approved))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        self.with_copies(rows).await
    }

    async fn list_missed_returns(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<ReservationDetails>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT * FROM reservations
            WHERE status = $1 AND picked_up_at IS NOT NULL AND returned_at IS NULL
              AND confirmed_return < $2
            ORDER BY confirmed_return
            "#,
        )
        .bind(i16::from(ReservationStatus::Approved))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        self.with_copies(rows).await
    }
}
