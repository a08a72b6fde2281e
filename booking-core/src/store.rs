use async_trait::async_trait;
use bigdecimal::BigDecimal;
use shared::{
    Booking, BookingId, BookingPage, EventId, EventRecord, NewReconciliationEntry, PageRequest,
    ReconciliationEntry, StoreError, UserId,
};

/// Narrow read/write interface to the event catalog.
///
/// Inventory fields are written once by `insert_event`; afterwards only the
/// [`InventoryLedger`](crate::InventoryLedger) touches them.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn insert_event(&self, event: &EventRecord) -> Result<(), StoreError>;

    async fn find_event(&self, id: EventId) -> Result<Option<EventRecord>, StoreError>;

    async fn update_price(&self, id: EventId, price: &BigDecimal) -> Result<Option<EventRecord>, StoreError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Flips `Active` to `Cancelled` iff the booking is currently active.
    ///
    /// Returns the cancelled booking only to the caller that performed the
    /// transition; `None` when the booking is missing or already cancelled.
    async fn cancel(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Bookings of `user_id`, newest first with id descending as tiebreak.
    async fn list_for_user(&self, user_id: UserId, page: PageRequest) -> Result<BookingPage, StoreError>;

    /// Sum of quantities of active bookings on `event_id`.
    async fn active_quantity(&self, event_id: EventId) -> Result<i64, StoreError>;
}

/// Durable record of releases that could not be applied inline.
#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    async fn record(&self, entry: NewReconciliationEntry) -> Result<i64, StoreError>;

    /// Unresolved entries, oldest first.
    async fn pending(&self, limit: i64) -> Result<Vec<ReconciliationEntry>, StoreError>;

    /// Marks an unresolved entry resolved iff it still is.
    ///
    /// True only for the caller that performed the flip; that caller alone
    /// applies the entry's release.
    async fn claim(&self, id: i64) -> Result<bool, StoreError>;

    /// Reopens a claimed entry whose release failed, bumping `attempts`.
    async fn record_failure(&self, id: i64, error: &str) -> Result<(), StoreError>;

    /// Sum of quantities of unresolved entries on `event_id`.
    async fn pending_quantity(&self, event_id: EventId) -> Result<i64, StoreError>;
}
