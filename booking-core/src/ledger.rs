use async_trait::async_trait;
use shared::{EventId, InventorySnapshot, LedgerError, StoreError};

/// Owner of `available_tickets` for every event.
///
/// `reserve` is a conditional decrement: it subtracts `quantity` only when at
/// least that many tickets are available, in the same atomic step as the
/// check. `release` adds `quantity` back, clamped to `total_tickets`. Both
/// return the resulting available count. Operations on one event are
/// linearizable with respect to each other.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn reserve(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError>;

    async fn release(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError>;

    async fn snapshot(&self, event_id: EventId) -> Result<Option<InventorySnapshot>, StoreError>;
}

pub fn ensure_positive(quantity: i32) -> Result<(), LedgerError> {
    if quantity < 1 {
        return Err(LedgerError::InvalidQuantity(quantity));
    }
    Ok(())
}
