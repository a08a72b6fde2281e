use bigdecimal::BigDecimal;
use chrono::Utc;
use num_traits::Zero;
use shared::{BookingError, Entity, EventId, EventRecord, NewEvent, Requester, EVENT_NAMESPACE};
use std::sync::Arc;
use tracing::info;

use crate::allocator::SequenceAllocator;
use crate::store::EventCatalog;

/// The slice of the event catalog the booking core depends on.
pub struct EventRegistry {
    allocator: Arc<dyn SequenceAllocator>,
    catalog: Arc<dyn EventCatalog>,
}

impl EventRegistry {
    pub fn new(allocator: Arc<dyn SequenceAllocator>, catalog: Arc<dyn EventCatalog>) -> Self {
        Self { allocator, catalog }
    }

    pub async fn create_event(&self, new_event: NewEvent) -> Result<EventRecord, BookingError> {
        let title = new_event.title.trim();
        if title.is_empty() {
            return Err(BookingError::Validation("title must not be empty".to_string()));
        }
        if new_event.total_tickets < 1 {
            return Err(BookingError::Validation(format!(
                "total_tickets must be at least 1, got {}",
                new_event.total_tickets
            )));
        }
        ensure_valid_price(&new_event.price)?;

        let id = self.allocator.next_value(EVENT_NAMESPACE).await?;
        let event = EventRecord {
            id,
            title: title.to_string(),
            price: new_event.price,
            total_tickets: new_event.total_tickets,
            available_tickets: new_event.total_tickets,
            created_at: Utc::now(),
        };
        self.catalog.insert_event(&event).await?;

        info!(event_id = id, total_tickets = event.total_tickets, "Event created");
        Ok(event)
    }

    pub async fn get_event(&self, id: EventId) -> Result<EventRecord, BookingError> {
        self.catalog
            .find_event(id)
            .await?
            .ok_or_else(|| BookingError::event_not_found(id))
    }

    /// Changes the price for future bookings; existing bookings keep theirs.
    pub async fn update_price(&self, requester: &Requester, id: EventId, price: BigDecimal) -> Result<EventRecord, BookingError> {
        if !requester.is_admin() {
            return Err(BookingError::forbidden(requester.user_id, Entity::Event, id));
        }
        ensure_valid_price(&price)?;

        let event = self
            .catalog
            .update_price(id, &price)
            .await?
            .ok_or_else(|| BookingError::event_not_found(id))?;

        info!(event_id = id, price = %event.price, "Event price updated");
        Ok(event)
    }
}

fn ensure_valid_price(price: &BigDecimal) -> Result<(), BookingError> {
    if *price < BigDecimal::zero() {
        return Err(BookingError::Validation(format!("price must not be negative, got {}", price)));
    }
    Ok(())
}
