#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use booking_core::{
    BookingLifecycle, BookingRepository, EventRegistry, InMemoryStore, InventoryLedger, ReconciliationLog, Reconciler,
    RetryPolicy, SequenceAllocator,
};
use shared::{
    Booking, BookingId, BookingPage, EventId, EventRecord, InventorySnapshot, LedgerError, NewEvent,
    NewReconciliationEntry, PageRequest, ReconciliationEntry, StoreError, UserId,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub lifecycle: Arc<BookingLifecycle>,
    pub registry: EventRegistry,
    pub reconciler: Reconciler,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    harness_with(store.clone(), store.clone(), store.clone(), store)
}

pub fn harness_with(
    store: Arc<InMemoryStore>,
    allocator: Arc<dyn SequenceAllocator>,
    ledger: Arc<dyn InventoryLedger>,
    bookings: Arc<dyn BookingRepository>,
) -> Harness {
    let lifecycle = BookingLifecycle::new(
        allocator,
        ledger.clone(),
        store.clone(),
        bookings.clone(),
        store.clone(),
        RetryPolicy::immediate(2),
    );
    let registry = EventRegistry::new(store.clone(), store.clone());
    let reconciler = Reconciler::new(ledger, bookings, store.clone(), 50);

    Harness {
        store,
        lifecycle: Arc::new(lifecycle),
        registry,
        reconciler,
    }
}

pub async fn create_event(registry: &EventRegistry, total_tickets: i32, price: i64) -> EventRecord {
    registry
        .create_event(NewEvent {
            title: "Festival".to_string(),
            price: BigDecimal::from(price),
            total_tickets,
        })
        .await
        .unwrap()
}

pub async fn available(store: &InMemoryStore, event_id: EventId) -> i32 {
    store.snapshot(event_id).await.unwrap().unwrap().available_tickets
}

fn injected() -> StoreError {
    StoreError::Unavailable("injected failure".to_string())
}

/// Decrements `counter` if positive; true means "fail this call".
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub struct FlakyBookings {
    pub inner: Arc<InMemoryStore>,
    pub fail_inserts: AtomicBool,
    pub fail_cancels: AtomicBool,
}

impl FlakyBookings {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_inserts: AtomicBool::new(false),
            fail_cancels: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BookingRepository for FlakyBookings {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert(booking).await
    }

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        self.inner.find(id).await
    }

    async fn cancel(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        if self.fail_cancels.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.cancel(id).await
    }

    async fn list_for_user(&self, user_id: UserId, page: PageRequest) -> Result<BookingPage, StoreError> {
        self.inner.list_for_user(user_id, page).await
    }

    async fn active_quantity(&self, event_id: EventId) -> Result<i64, StoreError> {
        self.inner.active_quantity(event_id).await
    }
}

pub struct FlakyLedger {
    pub inner: Arc<InMemoryStore>,
    pub release_failures: AtomicU32,
}

impl FlakyLedger {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            release_failures: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl InventoryLedger for FlakyLedger {
    async fn reserve(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        self.inner.reserve(event_id, quantity).await
    }

    async fn release(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        if take_failure(&self.release_failures) {
            return Err(LedgerError::Store(injected()));
        }
        self.inner.release(event_id, quantity).await
    }

    async fn snapshot(&self, event_id: EventId) -> Result<Option<InventorySnapshot>, StoreError> {
        self.inner.snapshot(event_id).await
    }
}

pub struct FlakyAllocator {
    pub inner: Arc<InMemoryStore>,
    pub failures: AtomicU32,
}

#[async_trait]
impl SequenceAllocator for FlakyAllocator {
    async fn next_value(&self, namespace: &str) -> Result<i64, StoreError> {
        if take_failure(&self.failures) {
            return Err(injected());
        }
        self.inner.next_value(namespace).await
    }
}

/// Ledger that hands control back to the scheduler before every release.
pub struct YieldingLedger {
    pub inner: Arc<InMemoryStore>,
}

#[async_trait]
impl InventoryLedger for YieldingLedger {
    async fn reserve(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        self.inner.reserve(event_id, quantity).await
    }

    async fn release(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        tokio::task::yield_now().await;
        self.inner.release(event_id, quantity).await
    }

    async fn snapshot(&self, event_id: EventId) -> Result<Option<InventorySnapshot>, StoreError> {
        self.inner.snapshot(event_id).await
    }
}

pub struct FlakyLog {
    pub inner: Arc<InMemoryStore>,
    pub claim_failures: AtomicU32,
    pub fail_failure_writes: AtomicBool,
    pub yield_on_claim: AtomicBool,
}

impl FlakyLog {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            claim_failures: AtomicU32::new(0),
            fail_failure_writes: AtomicBool::new(false),
            yield_on_claim: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ReconciliationLog for FlakyLog {
    async fn record(&self, entry: NewReconciliationEntry) -> Result<i64, StoreError> {
        self.inner.record(entry).await
    }

    async fn pending(&self, limit: i64) -> Result<Vec<ReconciliationEntry>, StoreError> {
        self.inner.pending(limit).await
    }

    async fn claim(&self, id: i64) -> Result<bool, StoreError> {
        if self.yield_on_claim.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if take_failure(&self.claim_failures) {
            return Err(injected());
        }
        self.inner.claim(id).await
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<(), StoreError> {
        if self.fail_failure_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.record_failure(id, error).await
    }

    async fn pending_quantity(&self, event_id: EventId) -> Result<i64, StoreError> {
        self.inner.pending_quantity(event_id).await
    }
}
