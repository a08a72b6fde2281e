use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::events)]
pub struct DbEvent {
    pub row_id: Uuid,
    pub id: i64,
    pub title: String,
    pub price: BigDecimal,
    pub total_tickets: i32,
    pub available_tickets: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::events)]
pub struct NewDbEvent {
    pub row_id: Uuid,
    pub id: i64,
    pub title: String,
    pub price: BigDecimal,
    pub total_tickets: i32,
    pub available_tickets: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&EventRecord> for NewDbEvent {
    fn from(event: &EventRecord) -> Self {
        Self {
            row_id: Uuid::new_v4(),
            id: event.id,
            title: event.title.clone(),
            price: event.price.clone(),
            total_tickets: event.total_tickets,
            available_tickets: event.available_tickets,
            created_at: event.created_at,
        }
    }
}

impl From<DbEvent> for EventRecord {
    fn from(event: DbEvent) -> Self {
        Self {
            id: event.id,
            title: event.title,
            price: event.price,
            total_tickets: event.total_tickets,
            available_tickets: event.available_tickets,
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct DbBooking {
    pub row_id: Uuid,
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub quantity: i32,
    pub total_price: BigDecimal,
    pub status: String,
    pub booking_date: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewDbBooking {
    pub row_id: Uuid,
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub quantity: i32,
    pub total_price: BigDecimal,
    pub status: String,
    pub booking_date: DateTime<Utc>,
}

impl From<&Booking> for NewDbBooking {
    fn from(booking: &Booking) -> Self {
        Self {
            row_id: Uuid::new_v4(),
            id: booking.id,
            event_id: booking.event_id,
            user_id: booking.user_id,
            quantity: booking.quantity,
            total_price: booking.total_price.clone(),
            status: booking.status.as_str().to_string(),
            booking_date: booking.booking_date,
        }
    }
}

impl TryFrom<DbBooking> for Booking {
    type Error = StoreError;

    fn try_from(booking: DbBooking) -> Result<Self, Self::Error> {
        Ok(Self {
            id: booking.id,
            event_id: booking.event_id,
            user_id: booking.user_id,
            quantity: booking.quantity,
            total_price: booking.total_price,
            status: booking.status.parse()?,
            booking_date: booking.booking_date,
        })
    }
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: i64,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: i64,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

impl TryFrom<&BookingEvent> for NewOutboxEvent {
    type Error = serde_json::Error;

    fn try_from(event: &BookingEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_id: event.booking_id(),
            event_type: event.event_type().to_string(),
            event_data: serde_json::to_value(event)?,
        })
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::reconciliation_entries)]
pub struct DbReconciliationEntry {
    pub id: i64,
    pub event_id: i64,
    pub booking_id: Option<i64>,
    pub quantity: i32,
    pub reason: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reconciliation_entries)]
pub struct NewDbReconciliationEntry {
    pub event_id: i64,
    pub booking_id: Option<i64>,
    pub quantity: i32,
    pub reason: String,
}

impl From<NewReconciliationEntry> for NewDbReconciliationEntry {
    fn from(entry: NewReconciliationEntry) -> Self {
        Self {
            event_id: entry.event_id,
            booking_id: entry.booking_id,
            quantity: entry.quantity,
            reason: entry.reason,
        }
    }
}

impl From<DbReconciliationEntry> for ReconciliationEntry {
    fn from(entry: DbReconciliationEntry) -> Self {
        Self {
            id: entry.id,
            event_id: entry.event_id,
            booking_id: entry.booking_id,
            quantity: entry.quantity,
            reason: entry.reason,
            attempts: entry.attempts,
            last_error: entry.last_error,
            resolved: entry.resolved,
            created_at: entry.created_at,
        }
    }
}
