use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod error;

pub use error::*;

pub type EventId = i64;
pub type BookingId = i64;
pub type UserId = i64;

pub const EVENT_NAMESPACE: &str = "event";
pub const BOOKING_NAMESPACE: &str = "booking";

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BookingStatus::Active),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(StoreError::Corrupt(format!("unknown booking status '{}'", other))),
        }
    }
}

/// A reservation of `quantity` tickets on one event.
///
/// Everything except `status` is frozen at creation. `total_price` is the
/// event price at that moment times the quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub quantity: i32,
    pub total_price: BigDecimal,
    pub status: BookingStatus,
    pub booking_date: DateTime<Utc>,
}

impl Booking {
    pub fn new(id: BookingId, event_id: EventId, user_id: UserId, quantity: i32, unit_price: &BigDecimal) -> Self {
        Self {
            id,
            event_id,
            user_id,
            quantity,
            total_price: unit_price * BigDecimal::from(quantity),
            status: BookingStatus::Active,
            booking_date: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub title: String,
    pub price: BigDecimal,
    pub total_tickets: i32,
    pub available_tickets: i32,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            title: self.title.clone(),
            price: self.price.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub price: BigDecimal,
    pub total_tickets: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: EventId,
    pub title: String,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub event_id: EventId,
    pub total_tickets: i32,
    pub available_tickets: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub event: Option<EventSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn user(user_id: UserId) -> Self {
        Self { user_id, role: Role::User }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self { user_id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn may_access(&self, booking: &Booking) -> bool {
        self.is_admin() || booking.user_id == self.user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Result<Self, BookingError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);

        if page < 1 {
            return Err(BookingError::Validation(format!("page must be >= 1, got {}", page)));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(BookingError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_PAGE_LIMIT, limit
            )));
        }

        if (page - 1).checked_mul(limit).is_none() {
            return Err(BookingError::Validation(format!("page {} is out of range", page)));
        }

        Ok(Self { page, limit })
    }

    /// Rows to skip; saturates for hand-built requests that bypass `new`.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_LIMIT }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingPage {
    pub items: Vec<Booking>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReconciliationEntry {
    pub event_id: EventId,
    pub booking_id: Option<BookingId>,
    pub quantity: i32,
    pub reason: String,
}

/// A release that could not be applied inline and waits for repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub id: i64,
    pub event_id: EventId,
    pub booking_id: Option<BookingId>,
    pub quantity: i32,
    pub reason: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAudit {
    pub event_id: EventId,
    pub total_tickets: i32,
    pub available_tickets: i32,
    pub active_quantity: i64,
    pub pending_release: i64,
    pub consistent: bool,
}

/// Payloads written to the outbox alongside booking row changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BookingEvent {
    BookingCreated {
        booking_id: BookingId,
        event_id: EventId,
        user_id: UserId,
        quantity: i32,
        total_price: BigDecimal,
        booking_date: DateTime<Utc>,
    },
    BookingCancelled {
        booking_id: BookingId,
        event_id: EventId,
        user_id: UserId,
        quantity: i32,
    },
}

impl BookingEvent {
    pub fn created(booking: &Booking) -> Self {
        BookingEvent::BookingCreated {
            booking_id: booking.id,
            event_id: booking.event_id,
            user_id: booking.user_id,
            quantity: booking.quantity,
            total_price: booking.total_price.clone(),
            booking_date: booking.booking_date,
        }
    }

    pub fn cancelled(booking: &Booking) -> Self {
        BookingEvent::BookingCancelled {
            booking_id: booking.id,
            event_id: booking.event_id,
            user_id: booking.user_id,
            quantity: booking.quantity,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::BookingCreated { .. } => "BookingCreated",
            BookingEvent::BookingCancelled { .. } => "BookingCancelled",
        }
    }

    pub fn booking_id(&self) -> BookingId {
        match self {
            BookingEvent::BookingCreated { booking_id, .. }
            | BookingEvent::BookingCancelled { booking_id, .. } => *booking_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_price_is_unit_price_times_quantity() {
        let booking = Booking::new(1, 7, 42, 3, &BigDecimal::from_str("12.50").unwrap());
        assert_eq!(booking.total_price, BigDecimal::from_str("37.50").unwrap());
        assert_eq!(booking.status, BookingStatus::Active);
    }

    #[test]
    fn page_request_defaults_and_bounds() {
        assert_eq!(PageRequest::new(None, None).unwrap(), PageRequest::default());
        assert_eq!(PageRequest::new(Some(3), Some(20)).unwrap().offset(), 40);
        assert!(matches!(PageRequest::new(Some(0), None), Err(BookingError::Validation(_))));
        assert!(matches!(PageRequest::new(None, Some(0)), Err(BookingError::Validation(_))));
        assert!(matches!(PageRequest::new(None, Some(MAX_PAGE_LIMIT + 1)), Err(BookingError::Validation(_))));
        assert!(matches!(PageRequest::new(Some(i64::MAX), Some(10)), Err(BookingError::Validation(_))));
        assert_eq!(PageRequest::new(Some(i64::MAX), Some(1)).unwrap().offset(), i64::MAX - 1);
    }

    #[test]
    fn owner_or_admin_may_access_booking() {
        let booking = Booking::new(1, 1, 10, 1, &BigDecimal::from(5));
        assert!(Requester::user(10).may_access(&booking));
        assert!(Requester::admin(99).may_access(&booking));
        assert!(!Requester::user(11).may_access(&booking));
    }

    #[test]
    fn booking_status_parses_its_own_representation() {
        for status in [BookingStatus::Active, BookingStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("pending".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn booking_event_is_tagged_with_its_type() {
        let booking = Booking::new(5, 2, 3, 1, &BigDecimal::from(10));
        let json = serde_json::to_value(BookingEvent::cancelled(&booking)).unwrap();
        assert_eq!(json["type"], "BookingCancelled");
        assert_eq!(json["booking_id"], 5);
    }
}
