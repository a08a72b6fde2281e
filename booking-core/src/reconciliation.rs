use shared::{BookingError, EventId, InventoryAudit, LedgerError, ReconciliationEntry, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::ledger::InventoryLedger;
use crate::store::{BookingRepository, ReconciliationLog};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub examined: usize,
    pub released: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Repair {
    Released(i32),
    /// The booking the reservation was taken for exists and is active.
    Backed,
    EventMissing,
}

/// Applies releases that the lifecycle had to defer.
pub struct Reconciler {
    ledger: Arc<dyn InventoryLedger>,
    bookings: Arc<dyn BookingRepository>,
    log: Arc<dyn ReconciliationLog>,
    batch_size: i64,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn InventoryLedger>,
        bookings: Arc<dyn BookingRepository>,
        log: Arc<dyn ReconciliationLog>,
        batch_size: i64,
    ) -> Self {
        Self {
            ledger,
            bookings,
            log,
            batch_size,
        }
    }

    pub async fn run(&self, every: Duration) {
        let mut interval = time::interval(every);

        loop {
            interval.tick().await;

            match self.run_once().await {
                Ok(report) if report.examined > 0 => info!(?report, "Reconciliation pass finished"),
                Ok(_) => {}
                Err(e) => error!("Error processing reconciliation entries: {}", e),
            }
        }
    }

    /// Works through one batch of pending entries.
    ///
    /// Each entry is claimed before anything is released, so concurrent
    /// reconcilers (one per service instance) never apply the same release
    /// twice. A failure on one entry is counted and the batch continues.
    pub async fn run_once(&self) -> Result<ReconciliationReport, StoreError> {
        let entries = self.log.pending(self.batch_size).await?;
        let mut report = ReconciliationReport {
            examined: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            match self.log.claim(entry.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(entry_id = entry.id, "Entry claimed by another reconciler");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(entry_id = entry.id, error = %e, "Could not claim reconciliation entry");
                    report.failed += 1;
                    continue;
                }
            }

            match self.repair(&entry).await {
                Ok(Repair::Released(available)) => {
                    info!(entry_id = entry.id, event_id = entry.event_id, quantity = entry.quantity, available, "Deferred release applied");
                    report.released += 1;
                }
                Ok(Repair::Backed) => {
                    info!(entry_id = entry.id, booking_id = ?entry.booking_id, "Reservation is backed by an active booking, nothing to release");
                    report.skipped += 1;
                }
                Ok(Repair::EventMissing) => {
                    warn!(entry_id = entry.id, event_id = entry.event_id, "Event no longer exists, discarding entry");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(entry_id = entry.id, attempts = entry.attempts + 1, error = %e, "Deferred release failed again");
                    report.failed += 1;
                    // Left claimed if this fails too: tickets stay under-counted until repaired by hand.
                    if let Err(reopen) = self.log.record_failure(entry.id, &e.to_string()).await {
                        error!(
                            entry_id = entry.id,
                            event_id = entry.event_id,
                            quantity = entry.quantity,
                            error = %reopen,
                            "Could not reopen reconciliation entry"
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    async fn repair(&self, entry: &ReconciliationEntry) -> Result<Repair, LedgerError> {
        if let Some(booking_id) = entry.booking_id {
            if let Some(booking) = self.bookings.find(booking_id).await? {
                if booking.is_active() {
                    return Ok(Repair::Backed);
                }
            }
        }

        match self.ledger.release(entry.event_id, entry.quantity).await {
            Ok(available) => Ok(Repair::Released(available)),
            Err(LedgerError::NotFound(_)) => Ok(Repair::EventMissing),
            Err(e) => Err(e),
        }
    }

    /// Checks `available + active + pending release = total` for one event.
    pub async fn audit(&self, event_id: EventId) -> Result<InventoryAudit, BookingError> {
        let snapshot = self
            .ledger
            .snapshot(event_id)
            .await?
            .ok_or_else(|| BookingError::event_not_found(event_id))?;
        let active_quantity = self.bookings.active_quantity(event_id).await?;
        let pending_release = self.log.pending_quantity(event_id).await?;

        let accounted = i64::from(snapshot.available_tickets) + active_quantity + pending_release;
        let consistent = accounted == i64::from(snapshot.total_tickets);
        if !consistent {
            warn!(
                event_id,
                total = snapshot.total_tickets,
                available = snapshot.available_tickets,
                active_quantity,
                pending_release,
                "Inventory does not balance"
            );
        }

        Ok(InventoryAudit {
            event_id,
            total_tickets: snapshot.total_tickets,
            available_tickets: snapshot.available_tickets,
            active_quantity,
            pending_release,
            consistent,
        })
    }
}
