use std::fmt;
use thiserror::Error;

use crate::{BookingId, EventId, UserId};

/// Failure of the durable store itself, never a business outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("event {0} not found")]
    NotFound(EventId),
    #[error("event {event_id} has {available} tickets available, {requested} requested")]
    Insufficient {
        event_id: EventId,
        requested: i32,
        available: i32,
    },
    #[error("ticket quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Event,
    Booking,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Event => f.write_str("event"),
            Entity::Booking => f.write_str("booking"),
        }
    }
}

/// Everything a booking or catalog operation can hand back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },
    #[error("insufficient inventory for event {event_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        event_id: EventId,
        requested: i32,
        available: i32,
    },
    #[error("user {requester} is not allowed to modify {entity} {id}")]
    Forbidden { requester: UserId, entity: Entity, id: i64 },
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(BookingId),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error("reconciliation required (entry {entry:?}): {reason}")]
    ReconciliationRequired { entry: Option<i64>, reason: String },
}

impl BookingError {
    pub fn event_not_found(id: EventId) -> Self {
        BookingError::NotFound { entity: Entity::Event, id }
    }

    pub fn booking_not_found(id: BookingId) -> Self {
        BookingError::NotFound { entity: Entity::Booking, id }
    }

    pub fn forbidden(requester: UserId, entity: Entity, id: i64) -> Self {
        BookingError::Forbidden { requester, entity, id }
    }
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => BookingError::event_not_found(id),
            LedgerError::Insufficient {
                event_id,
                requested,
                available,
            } => BookingError::InsufficientInventory {
                event_id,
                requested,
                available,
            },
            LedgerError::InvalidQuantity(q) => {
                BookingError::Validation(format!("quantity must be at least 1, got {}", q))
            }
            LedgerError::Store(e) => BookingError::Persistence(e),
        }
    }
}
