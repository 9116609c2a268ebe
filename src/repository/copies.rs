//! Book copies repository: the inventory source of truth

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::copy::{BookCopy, CopyState},
};

/// Read/write access to physical copy records.
///
/// `compare_and_set_state` is the only mutation primitive; every
/// higher-level transition is built from it. The implementation must make it
/// atomic with respect to concurrent callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CopyStore: Send + Sync {
    async fn get(&self, copy_id: i32) -> AppResult<BookCopy>;

    /// Atomically transition a copy's state if it currently equals
    /// `expected`. Returns `false` when the current state differs (or the
    /// copy does not exist), leaving the row untouched.
    async fn compare_and_set_state(
        &self,
        copy_id: i32,
        expected: CopyState,
        new: CopyState,
    ) -> AppResult<bool>;

    /// Current state of each requested copy, for advisory display
    async fn list_states(&self, copy_ids: Vec<i32>) -> AppResult<Vec<(i32, CopyState)>>;
}

#[derive(Clone)]
pub struct CopiesRepository {
    pool: Pool<Postgres>,
}

impl CopiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CopyStore for CopiesRepository {
    async fn get(&self, copy_id: i32) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>("SELECT * FROM book_copies WHERE id = $1")
            .bind(copy_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", copy_id)))
    }

    async fn compare_and_set_state(
        &self,
        copy_id: i32,
        expected: CopyState,
        new: CopyState,
    ) -> AppResult<bool> {
        // The conditional UPDATE is the storage-level compare-and-set: two
        // concurrent callers cannot both observe rows_affected == 1.
        let result = sqlx::query(
            "UPDATE book_copies SET state = $3, state_changed_at = NOW() WHERE id = $1 AND state = $2",
        )
        .bind(copy_id)
        .bind(i16::from(expected))
        .bind(i16::from(new))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_states(&self, copy_ids: Vec<i32>) -> AppResult<Vec<(i32, CopyState)>> {
        let rows = sqlx::query("SELECT id, state FROM book_copies WHERE id = ANY($1) ORDER BY id")
            .bind(&copy_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id: i32 = row.get("id");
                let state: i16 = row.get("state");
                (id, CopyState::from(state))
            })
            .collect())
    }
}
