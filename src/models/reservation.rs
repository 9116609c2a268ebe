//! Reservation model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum ReservationStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
    Returned = 3,
}

impl ReservationStatus {
    /// Terminal statuses release the copy claim and accept no transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Rejected | ReservationStatus::Returned)
    }
}

impl From<i16> for ReservationStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => ReservationStatus::Approved,
            2 => ReservationStatus::Rejected,
            3 => ReservationStatus::Returned,
            _ => ReservationStatus::Pending,
        }
    }
}

impl From<ReservationStatus> for i16 {
    fn from(s: ReservationStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Returned => "returned",
        };
        write!(f, "{}", label)
    }
}

/// Reservation row from database (claimed copy ids live in a join table)
#[derive(Debug, Clone, FromRow)]
pub struct ReservationRow {
    pub id: i32,
    pub user_id: i32,
    pub status: i16,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pickup_slots: Json<Vec<DateTime<Utc>>>,
    pub return_slots: Json<Vec<DateTime<Utc>>>,
    pub confirmed_pickup: Option<DateTime<Utc>>,
    pub confirmed_return: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Reservation with its claimed copies, for display and decision making
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationDetails {
    pub id: i32,
    pub user_id: i32,
    pub status: ReservationStatus,
    pub copy_ids: Vec<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Candidate pickup timeslots offered by the user, in the order given
    pub pickup_slots: Vec<DateTime<Utc>>,
    /// Candidate return timeslots offered by the user, in the order given
    pub return_slots: Vec<DateTime<Utc>>,
    pub confirmed_pickup: Option<DateTime<Utc>>,
    pub confirmed_return: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ReservationDetails {
    pub fn from_row(row: ReservationRow, copy_ids: Vec<i32>) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            status: ReservationStatus::from(row.status),
            copy_ids,
            start_date: row.start_date,
            end_date: row.end_date,
            pickup_slots: row.pickup_slots.0,
            return_slots: row.return_slots.0,
            confirmed_pickup: row.confirmed_pickup,
            confirmed_return: row.confirmed_return,
            picked_up_at: row.picked_up_at,
            returned_at: row.returned_at,
            created_at: row.created_at,
            decided_at: row.decided_at,
        }
    }
}

/// Reservation to persist after a successful claim
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub user_id: i32,
    /// Claimed copies, in claim (ascending id) order
    pub copy_ids: Vec<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pickup_slots: Vec<DateTime<Utc>>,
    pub return_slots: Vec<DateTime<Utc>>,
}

/// Listing filter for the admin UI
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub user_id: Option<i32>,
}

/// Kind of deadline an approved reservation has missed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum AlertKind {
    MissedPickup,
    MissedReturn,
}

/// Advisory alert raised by the lifecycle sweep.
///
/// Alerts never change state; an administrator decides what to do.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LifecycleAlert {
    pub reservation_id: i32,
    pub user_id: i32,
    pub kind: AlertKind,
    /// The confirmed timeslot that has passed
    pub due: DateTime<Utc>,
}
