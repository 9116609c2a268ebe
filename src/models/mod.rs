//! Data models for Carrel

pub mod cart;
pub mod copy;
pub mod reservation;
pub mod user;

// Re-export commonly used types
pub use cart::{CartEntry, CartItem};
pub use copy::{BookCopy, CopyCondition, CopyState, CopyView};
pub use reservation::{
    LifecycleAlert, NewReservation, ReservationDetails, ReservationFilter, ReservationStatus,
};
pub use user::UserClaims;
