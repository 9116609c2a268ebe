//! Book copy (physical inventory) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Availability state of a physical copy.
///
/// The state column is the only resource shared across requests; it is
/// mutated exclusively through the inventory compare-and-set primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[repr(i16)]
pub enum CopyState {
    Available = 0,
    Reserved = 1,
    Borrowed = 2,
}

impl From<i16> for CopyState {
    fn from(v: i16) -> Self {
        match v {
            1 => CopyState::Reserved,
            2 => CopyState::Borrowed,
            _ => CopyState::Available,
        }
    }
}

impl From<CopyState> for i16 {
    fn from(s: CopyState) -> Self {
        s as i16
    }
}

impl std::fmt::Display for CopyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CopyState::Available => "available",
            CopyState::Reserved => "reserved",
            CopyState::Borrowed => "borrowed",
        };
        write!(f, "{}", label)
    }
}

/// Physical condition of a copy, ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[repr(i16)]
pub enum CopyCondition {
    Poor = 0,
    Fair = 1,
    Good = 2,
    LikeNew = 3,
    New = 4,
}

impl From<i16> for CopyCondition {
    fn from(v: i16) -> Self {
        match v {
            1 => CopyCondition::Fair,
            2 => CopyCondition::Good,
            3 => CopyCondition::LikeNew,
            4 => CopyCondition::New,
            _ => CopyCondition::Poor,
        }
    }
}

impl From<CopyCondition> for i16 {
    fn from(c: CopyCondition) -> Self {
        c as i16
    }
}

/// Book copy row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookCopy {
    pub id: i32,
    /// Owning catalog title; created and maintained outside this core
    pub book_id: i32,
    pub condition: i16, // 0=Poor .. 4=New
    pub state: i16,     // 0=Available, 1=Reserved, 2=Borrowed
    pub state_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BookCopy {
    pub fn state(&self) -> CopyState {
        CopyState::from(self.state)
    }

    pub fn condition(&self) -> CopyCondition {
        CopyCondition::from(self.condition)
    }
}

/// Copy details for display
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CopyView {
    pub id: i32,
    pub book_id: i32,
    pub condition: CopyCondition,
    pub state: CopyState,
    pub state_changed_at: DateTime<Utc>,
}

impl From<BookCopy> for CopyView {
    fn from(c: BookCopy) -> Self {
        Self {
            id: c.id,
            book_id: c.book_id,
            condition: c.condition(),
            state: c.state(),
            state_changed_at: c.state_changed_at,
        }
    }
}
