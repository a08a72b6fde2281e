use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use shared::{
    Booking, BookingId, BookingPage, BookingStatus, EventId, EventRecord, InventorySnapshot, LedgerError,
    NewReconciliationEntry, PageRequest, ReconciliationEntry, StoreError, UserId,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::warn;

use crate::allocator::{InMemorySequenceAllocator, SequenceAllocator};
use crate::ledger::{ensure_positive, InventoryLedger};
use crate::store::{BookingRepository, EventCatalog, ReconciliationLog};

/// Single-process storage engine.
///
/// Each conditional mutation runs inside one critical section of the lock
/// that owns the data, so check and write can never interleave with another
/// caller. Locks are never held across an await point.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sequences: InMemorySequenceAllocator,
    events: Mutex<HashMap<EventId, EventRecord>>,
    bookings: RwLock<HashMap<BookingId, Booking>>,
    reconciliation: Mutex<Vec<ReconciliationEntry>>,
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{} lock poisoned", what))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> Result<MutexGuard<'_, HashMap<EventId, EventRecord>>, StoreError> {
        self.events.lock().map_err(|_| poisoned("events"))
    }

    fn reconciliation(&self) -> Result<MutexGuard<'_, Vec<ReconciliationEntry>>, StoreError> {
        self.reconciliation.lock().map_err(|_| poisoned("reconciliation"))
    }

    /// Last id handed out in `namespace`.
    pub fn last_sequence(&self, namespace: &str) -> Result<i64, StoreError> {
        self.sequences.current(namespace)
    }
}

#[async_trait]
impl SequenceAllocator for InMemoryStore {
    async fn next_value(&self, namespace: &str) -> Result<i64, StoreError> {
        self.sequences.next_value(namespace).await
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn reserve(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        ensure_positive(quantity)?;
        let mut events = self.events()?;
        let event = events.get_mut(&event_id).ok_or(LedgerError::NotFound(event_id))?;

        if event.available_tickets < quantity {
            return Err(LedgerError::Insufficient {
                event_id,
                requested: quantity,
                available: event.available_tickets,
            });
        }

        event.available_tickets -= quantity;
        Ok(event.available_tickets)
    }

    async fn release(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        ensure_positive(quantity)?;
        let mut events = self.events()?;
        let event = events.get_mut(&event_id).ok_or(LedgerError::NotFound(event_id))?;

        let restored = event.available_tickets.saturating_add(quantity);
        if restored > event.total_tickets {
            warn!(
                event_id,
                quantity,
                available = event.available_tickets,
                total = event.total_tickets,
                "Release exceeds capacity, clamping"
            );
        }
        event.available_tickets = restored.min(event.total_tickets);
        Ok(event.available_tickets)
    }

    async fn snapshot(&self, event_id: EventId) -> Result<Option<InventorySnapshot>, StoreError> {
        let events = self.events()?;
        Ok(events.get(&event_id).map(|event| InventorySnapshot {
            event_id,
            total_tickets: event.total_tickets,
            available_tickets: event.available_tickets,
        }))
    }
}

#[async_trait]
impl EventCatalog for InMemoryStore {
    async fn insert_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        let mut events = self.events()?;
        if events.contains_key(&event.id) {
            return Err(StoreError::Operation(format!("event {} already exists", event.id)));
        }
        events.insert(event.id, event.clone());
        Ok(())
    }

    async fn find_event(&self, id: EventId) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.events()?.get(&id).cloned())
    }

    async fn update_price(&self, id: EventId, price: &BigDecimal) -> Result<Option<EventRecord>, StoreError> {
        let mut events = self.events()?;
        Ok(events.get_mut(&id).map(|event| {
            event.price = price.clone();
            event.clone()
        }))
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut bookings = self.bookings.write().map_err(|_| poisoned("bookings"))?;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::Operation(format!("booking {} already exists", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let bookings = self.bookings.read().map_err(|_| poisoned("bookings"))?;
        Ok(bookings.get(&id).cloned())
    }

    async fn cancel(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.bookings.write().map_err(|_| poisoned("bookings"))?;
        match bookings.get_mut(&id) {
            Some(booking) if booking.is_active() => {
                booking.status = BookingStatus::Cancelled;
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: UserId, page: PageRequest) -> Result<BookingPage, StoreError> {
        let bookings = self.bookings.read().map_err(|_| poisoned("bookings"))?;
        let mut owned: Vec<&Booking> = bookings.values().filter(|b| b.user_id == user_id).collect();
        owned.sort_by(|a, b| b.booking_date.cmp(&a.booking_date).then(b.id.cmp(&a.id)));

        let total = owned.len() as i64;
        let items = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok(BookingPage {
            items,
            page: page.page,
            limit: page.limit,
            total,
        })
    }

    async fn active_quantity(&self, event_id: EventId) -> Result<i64, StoreError> {
        let bookings = self.bookings.read().map_err(|_| poisoned("bookings"))?;
        Ok(bookings
            .values()
            .filter(|b| b.event_id == event_id && b.is_active())
            .map(|b| i64::from(b.quantity))
            .sum())
    }
}

#[async_trait]
impl ReconciliationLog for InMemoryStore {
    async fn record(&self, entry: NewReconciliationEntry) -> Result<i64, StoreError> {
        let mut log = self.reconciliation()?;
        let id = log.len() as i64 + 1;
        log.push(ReconciliationEntry {
            id,
            event_id: entry.event_id,
            booking_id: entry.booking_id,
            quantity: entry.quantity,
            reason: entry.reason,
            attempts: 0,
            last_error: None,
            resolved: false,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn pending(&self, limit: i64) -> Result<Vec<ReconciliationEntry>, StoreError> {
        let log = self.reconciliation()?;
        Ok(log
            .iter()
            .filter(|e| !e.resolved)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn claim(&self, id: i64) -> Result<bool, StoreError> {
        let mut log = self.reconciliation()?;
        let entry = log
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::Operation(format!("reconciliation entry {} not found", id)))?;
        if entry.resolved {
            return Ok(false);
        }
        entry.resolved = true;
        Ok(true)
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<(), StoreError> {
        let mut log = self.reconciliation()?;
        let entry = log
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::Operation(format!("reconciliation entry {} not found", id)))?;
        entry.resolved = false;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn pending_quantity(&self, event_id: EventId) -> Result<i64, StoreError> {
        let log = self.reconciliation()?;
        Ok(log
            .iter()
            .filter(|e| !e.resolved && e.event_id == event_id)
            .map(|e| i64::from(e.quantity))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(id: EventId, total: i32) -> EventRecord {
        EventRecord {
            id,
            title: format!("event-{}", id),
            price: BigDecimal::from(20),
            total_tickets: total,
            available_tickets: total,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reserve_is_conditional() {
        let store = InMemoryStore::new();
        store.insert_event(&event(1, 3)).await.unwrap();

        assert_eq!(store.reserve(1, 2).await.unwrap(), 1);
        assert_eq!(
            store.reserve(1, 2).await,
            Err(LedgerError::Insufficient {
                event_id: 1,
                requested: 2,
                available: 1
            })
        );
        assert_eq!(store.snapshot(1).await.unwrap().unwrap().available_tickets, 1);
        assert_eq!(store.reserve(9, 1).await, Err(LedgerError::NotFound(9)));
        assert_eq!(store.reserve(1, 0).await, Err(LedgerError::InvalidQuantity(0)));
    }

    #[tokio::test]
    async fn release_never_exceeds_capacity() {
        let store = InMemoryStore::new();
        store.insert_event(&event(1, 5)).await.unwrap();

        store.reserve(1, 2).await.unwrap();
        assert_eq!(store.release(1, 2).await.unwrap(), 5);
        assert_eq!(store.release(1, 2).await.unwrap(), 5);
        assert_eq!(store.release(2, 1).await, Err(LedgerError::NotFound(2)));
    }

    #[tokio::test]
    async fn cancel_transitions_only_once() {
        let store = InMemoryStore::new();
        let booking = Booking::new(1, 1, 7, 2, &BigDecimal::from(10));
        store.insert(&booking).await.unwrap();

        let first = store.cancel(1).await.unwrap();
        assert_eq!(first.map(|b| b.status), Some(BookingStatus::Cancelled));
        assert_eq!(store.cancel(1).await.unwrap(), None);
        assert_eq!(store.cancel(2).await.unwrap(), None);
        assert_eq!(store.active_quantity(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paged() {
        let store = InMemoryStore::new();
        let base = Utc::now();
        for id in 1..=5 {
            let mut booking = Booking::new(id, 1, 7, 1, &BigDecimal::from(10));
            booking.booking_date = base + Duration::seconds(id);
            store.insert(&booking).await.unwrap();
        }
        store.insert(&Booking::new(6, 1, 8, 1, &BigDecimal::from(10))).await.unwrap();

        let first = store.list_for_user(7, PageRequest::new(Some(1), Some(2)).unwrap()).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.items.iter().map(|b| b.id).collect::<Vec<_>>(), vec![5, 4]);

        let last = store.list_for_user(7, PageRequest::new(Some(3), Some(2)).unwrap()).await.unwrap();
        assert_eq!(last.items.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn reconciliation_entries_track_attempts() {
        let store = InMemoryStore::new();
        let id = store
            .record(NewReconciliationEntry {
                event_id: 3,
                booking_id: None,
                quantity: 4,
                reason: "release failed".to_string(),
            })
            .await
            .unwrap();

        assert!(store.claim(id).await.unwrap());
        assert!(!store.claim(id).await.unwrap());
        assert!(store.pending(10).await.unwrap().is_empty());

        store.record_failure(id, "still down").await.unwrap();
        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("still down"));
        assert_eq!(store.pending_quantity(3).await.unwrap(), 4);

        assert!(store.claim(id).await.unwrap());
        assert!(store.pending(10).await.unwrap().is_empty());
        assert_eq!(store.pending_quantity(3).await.unwrap(), 0);
    }
}
