use shared::{
    Booking, BookingDetails, BookingError, BookingId, BookingPage, Entity, EventId, NewReconciliationEntry,
    PageRequest, Requester, StoreError, UserId, BOOKING_NAMESPACE,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::allocator::SequenceAllocator;
use crate::ledger::InventoryLedger;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::{BookingRepository, EventCatalog, ReconciliationLog};

/// Drives bookings through `Active -> Cancelled` and keeps the ledger in step.
///
/// Creation reserves inventory before anything else is written and releases
/// it again if the booking cannot be persisted. Cancellation claims the
/// status transition first, so only one caller can ever release a given
/// booking's tickets. A release that keeps failing after the configured
/// retries is written to the reconciliation log and surfaced as
/// [`BookingError::ReconciliationRequired`].
pub struct BookingLifecycle {
    allocator: Arc<dyn SequenceAllocator>,
    ledger: Arc<dyn InventoryLedger>,
    catalog: Arc<dyn EventCatalog>,
    bookings: Arc<dyn BookingRepository>,
    reconciliation: Arc<dyn ReconciliationLog>,
    retry: RetryPolicy,
}

impl BookingLifecycle {
    pub fn new(
        allocator: Arc<dyn SequenceAllocator>,
        ledger: Arc<dyn InventoryLedger>,
        catalog: Arc<dyn EventCatalog>,
        bookings: Arc<dyn BookingRepository>,
        reconciliation: Arc<dyn ReconciliationLog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            allocator,
            ledger,
            catalog,
            bookings,
            reconciliation,
            retry,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_booking(&self, user_id: UserId, event_id: EventId, quantity: i32) -> Result<Booking, BookingError> {
        if quantity < 1 {
            return Err(BookingError::Validation(format!("quantity must be at least 1, got {}", quantity)));
        }

        let event = self
            .catalog
            .find_event(event_id)
            .await?
            .ok_or_else(|| BookingError::event_not_found(event_id))?;

        let remaining = self.ledger.reserve(event_id, quantity).await?;
        info!(event_id, quantity, remaining, "Tickets reserved");

        let booking_id = match self.allocator.next_value(BOOKING_NAMESPACE).await {
            Ok(id) => id,
            Err(e) => return Err(self.compensate_reservation(event_id, quantity, None, e).await),
        };

        let booking = Booking::new(booking_id, event_id, user_id, quantity, &event.price);
        if let Err(e) = self.bookings.insert(&booking).await {
            return Err(self.compensate_reservation(event_id, quantity, Some(booking_id), e).await);
        }

        info!(booking_id, event_id, quantity, total_price = %booking.total_price, "Booking created");
        Ok(booking)
    }

    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, requester: &Requester, booking_id: BookingId) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .find(booking_id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;

        if !requester.may_access(&booking) {
            return Err(BookingError::forbidden(requester.user_id, Entity::Booking, booking_id));
        }
        if !booking.is_active() {
            return Err(BookingError::AlreadyCancelled(booking_id));
        }

        // A concurrent cancellation may have won between the read and here.
        let cancelled = match self.bookings.cancel(booking_id).await? {
            Some(cancelled) => cancelled,
            None => return Err(BookingError::AlreadyCancelled(booking_id)),
        };

        let (event_id, quantity) = (cancelled.event_id, cancelled.quantity);
        match retry_with_backoff(self.retry, "release cancelled booking", || self.ledger.release(event_id, quantity)).await {
            Ok(available) => {
                info!(booking_id, event_id, quantity, available, "Booking cancelled");
                Ok(cancelled)
            }
            Err(e) => Err(self
                .escalate(NewReconciliationEntry {
                    event_id,
                    booking_id: Some(booking_id),
                    quantity,
                    reason: format!("release for cancelled booking {} failed: {}", booking_id, e),
                })
                .await),
        }
    }

    pub async fn get_booking(&self, requester: &Requester, booking_id: BookingId) -> Result<BookingDetails, BookingError> {
        let booking = self
            .bookings
            .find(booking_id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;

        if !requester.may_access(&booking) {
            return Err(BookingError::forbidden(requester.user_id, Entity::Booking, booking_id));
        }

        let event = self.catalog.find_event(booking.event_id).await?.map(|e| e.summary());
        Ok(BookingDetails { booking, event })
    }

    pub async fn list_bookings(&self, user_id: UserId, page: PageRequest) -> Result<BookingPage, BookingError> {
        Ok(self.bookings.list_for_user(user_id, page).await?)
    }

    async fn compensate_reservation(
        &self,
        event_id: EventId,
        quantity: i32,
        booking_id: Option<BookingId>,
        cause: StoreError,
    ) -> BookingError {
        warn!(event_id, quantity, ?booking_id, error = %cause, "Booking write failed after reservation, releasing tickets");

        match retry_with_backoff(self.retry, "compensating release", || self.ledger.release(event_id, quantity)).await {
            Ok(available) => {
                info!(event_id, quantity, available, "Reservation rolled back");
                BookingError::Persistence(cause)
            }
            Err(e) => {
                self.escalate(NewReconciliationEntry {
                    event_id,
                    booking_id,
                    quantity,
                    reason: format!("compensating release after failed booking write ({}) failed: {}", cause, e),
                })
                .await
            }
        }
    }

    async fn escalate(&self, entry: NewReconciliationEntry) -> BookingError {
        let recorded = retry_with_backoff(self.retry, "record reconciliation", || self.reconciliation.record(entry.clone())).await;

        match recorded {
            Ok(entry_id) => {
                error!(
                    entry_id,
                    event_id = entry.event_id,
                    booking_id = ?entry.booking_id,
                    quantity = entry.quantity,
                    reason = %entry.reason,
                    "Inventory release deferred to reconciliation"
                );
                BookingError::ReconciliationRequired {
                    entry: Some(entry_id),
                    reason: entry.reason,
                }
            }
            Err(e) => {
                error!(
                    event_id = entry.event_id,
                    booking_id = ?entry.booking_id,
                    quantity = entry.quantity,
                    reason = %entry.reason,
                    error = %e,
                    "Could not record reconciliation entry, manual repair required"
                );
                BookingError::ReconciliationRequired {
                    entry: None,
                    reason: entry.reason,
                }
            }
        }
    }
}
