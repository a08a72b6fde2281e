//! Inventory and booking consistency core.
//!
//! Storage is reached only through the async traits in [`allocator`],
//! [`ledger`] and [`store`]; every conditional mutation is a single atomic
//! operation of the engine behind them. [`memory::InMemoryStore`] is the
//! single-process engine used by tests.

pub mod allocator;
pub mod catalog;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod reconciliation;
pub mod retry;
pub mod store;

pub use allocator::SequenceAllocator;
pub use catalog::EventRegistry;
pub use ledger::InventoryLedger;
pub use lifecycle::BookingLifecycle;
pub use memory::InMemoryStore;
pub use reconciliation::{ReconciliationReport, Reconciler};
pub use retry::RetryPolicy;
pub use store::{BookingRepository, EventCatalog, ReconciliationLog};
