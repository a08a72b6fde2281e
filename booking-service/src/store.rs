use async_trait::async_trait;
use bigdecimal::BigDecimal;
use booking_core::ledger::ensure_positive;
use booking_core::{BookingRepository, EventCatalog, InventoryLedger, ReconciliationLog, SequenceAllocator};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use tracing::debug;

use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

diesel::sql_function!(fn least(a: diesel::sql_types::Integer, b: diesel::sql_types::Integer) -> diesel::sql_types::Integer);

fn query_failed(e: diesel::result::Error) -> StoreError {
    StoreError::Operation(e.to_string())
}

fn transaction_failed(e: anyhow::Error) -> StoreError {
    e.downcast::<StoreError>()
        .unwrap_or_else(|e| StoreError::Operation(e.to_string()))
}

/// All storage seams backed by one PostgreSQL database.
///
/// Every conditional mutation is a single statement, so concurrent service
/// instances coordinate through row locks alone.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl SequenceAllocator for PgStore {
    async fn next_value(&self, namespace: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;

        diesel::insert_into(sequence_counters::table)
            .values((
                sequence_counters::namespace.eq(namespace),
                sequence_counters::seq.eq(1i64),
            ))
            .on_conflict(sequence_counters::namespace)
            .do_update()
            .set(sequence_counters::seq.eq(sequence_counters::seq + 1i64))
            .returning(sequence_counters::seq)
            .get_result::<i64>(&mut conn)
            .await
            .map_err(query_failed)
    }
}

#[async_trait]
impl InventoryLedger for PgStore {
    async fn reserve(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        ensure_positive(quantity)?;
        let mut conn = self.conn().await?;

        let remaining = diesel::update(
            events::table
                .filter(events::id.eq(event_id))
                .filter(events::available_tickets.ge(quantity)),
        )
        .set((
            events::available_tickets.eq(events::available_tickets - quantity),
            events::updated_at.eq(Some(Utc::now())),
        ))
        .returning(events::available_tickets)
        .get_result::<i32>(&mut conn)
        .await
        .optional()
        .map_err(query_failed)?;

        if let Some(remaining) = remaining {
            return Ok(remaining);
        }

        // Nothing matched: either the event is missing or it is short.
        let available = events::table
            .filter(events::id.eq(event_id))
            .select(events::available_tickets)
            .first::<i32>(&mut conn)
            .await
            .optional()
            .map_err(query_failed)?;

        match available {
            Some(available) => Err(LedgerError::Insufficient {
                event_id,
                requested: quantity,
                available,
            }),
            None => Err(LedgerError::NotFound(event_id)),
        }
    }

    async fn release(&self, event_id: EventId, quantity: i32) -> Result<i32, LedgerError> {
        ensure_positive(quantity)?;
        let mut conn = self.conn().await?;

        let available = diesel::update(events::table.filter(events::id.eq(event_id)))
            .set((
                events::available_tickets.eq(least(events::available_tickets + quantity, events::total_tickets)),
                events::updated_at.eq(Some(Utc::now())),
            ))
            .returning(events::available_tickets)
            .get_result::<i32>(&mut conn)
            .await
            .optional()
            .map_err(query_failed)?;

        available.ok_or(LedgerError::NotFound(event_id))
    }

    async fn snapshot(&self, event_id: EventId) -> Result<Option<InventorySnapshot>, StoreError> {
        let mut conn = self.conn().await?;

        let row = events::table
            .filter(events::id.eq(event_id))
            .select((events::total_tickets, events::available_tickets))
            .first::<(i32, i32)>(&mut conn)
            .await
            .optional()
            .map_err(query_failed)?;

        Ok(row.map(|(total_tickets, available_tickets)| InventorySnapshot {
            event_id,
            total_tickets,
            available_tickets,
        }))
    }
}

#[async_trait]
impl EventCatalog for PgStore {
    async fn insert_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        diesel::insert_into(events::table)
            .values(NewDbEvent::from(event))
            .execute(&mut conn)
            .await
            .map_err(query_failed)?;

        Ok(())
    }

    async fn find_event(&self, id: EventId) -> Result<Option<EventRecord>, StoreError> {
        let mut conn = self.conn().await?;

        let event = events::table
            .filter(events::id.eq(id))
            .first::<DbEvent>(&mut conn)
            .await
            .optional()
            .map_err(query_failed)?;

        Ok(event.map(EventRecord::from))
    }

    async fn update_price(&self, id: EventId, price: &BigDecimal) -> Result<Option<EventRecord>, StoreError> {
        let mut conn = self.conn().await?;

        let event = diesel::update(events::table.filter(events::id.eq(id)))
            .set((events::price.eq(price), events::updated_at.eq(Some(Utc::now()))))
            .get_result::<DbEvent>(&mut conn)
            .await
            .optional()
            .map_err(query_failed)?;

        Ok(event.map(EventRecord::from))
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let new_booking = NewDbBooking::from(booking);
        let created = BookingEvent::created(booking);

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(bookings::table)
                    .values(&new_booking)
                    .execute(conn)
                    .await?;

                diesel::insert_into(outbox_events::table)
                    .values(&NewOutboxEvent::try_from(&created)?)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
        .map_err(transaction_failed)
    }

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn().await?;

        let booking = bookings::table
            .filter(bookings::id.eq(id))
            .first::<DbBooking>(&mut conn)
            .await
            .optional()
            .map_err(query_failed)?;

        booking.map(Booking::try_from).transpose()
    }

    async fn cancel(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let claimed = diesel::update(
                    bookings::table
                        .filter(bookings::id.eq(id))
                        .filter(bookings::status.eq(BookingStatus::Active.as_str())),
                )
                .set((
                    bookings::status.eq(BookingStatus::Cancelled.as_str()),
                    bookings::updated_at.eq(Some(Utc::now())),
                ))
                .get_result::<DbBooking>(conn)
                .await
                .optional()?;

                let Some(claimed) = claimed else {
                    debug!(booking_id = id, "Booking not active, nothing to cancel");
                    return Ok(None);
                };
                let booking = Booking::try_from(claimed)?;

                diesel::insert_into(outbox_events::table)
                    .values(&NewOutboxEvent::try_from(&BookingEvent::cancelled(&booking))?)
                    .execute(conn)
                    .await?;

                Ok(Some(booking))
            })
        })
        .await
        .map_err(transaction_failed)
    }

    async fn list_for_user(&self, user_id: UserId, page: PageRequest) -> Result<BookingPage, StoreError> {
        let mut conn = self.conn().await?;

        let total = bookings::table
            .filter(bookings::user_id.eq(user_id))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(query_failed)?;

        let rows = bookings::table
            .filter(bookings::user_id.eq(user_id))
            .order((bookings::booking_date.desc(), bookings::id.desc()))
            .limit(page.limit)
            .offset(page.offset())
            .load::<DbBooking>(&mut conn)
            .await
            .map_err(query_failed)?;

        let items = rows
            .into_iter()
            .map(Booking::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BookingPage {
            items,
            page: page.page,
            limit: page.limit,
            total,
        })
    }

    async fn active_quantity(&self, event_id: EventId) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;

        let sum = bookings::table
            .filter(bookings::event_id.eq(event_id))
            .filter(bookings::status.eq(BookingStatus::Active.as_str()))
            .select(diesel::dsl::sum(bookings::quantity))
            .first::<Option<i64>>(&mut conn)
            .await
            .map_err(query_failed)?;

        Ok(sum.unwrap_or(0))
    }
}

#[async_trait]
impl ReconciliationLog for PgStore {
    async fn record(&self, entry: NewReconciliationEntry) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;

        diesel::insert_into(reconciliation_entries::table)
            .values(NewDbReconciliationEntry::from(entry))
            .returning(reconciliation_entries::id)
            .get_result::<i64>(&mut conn)
            .await
            .map_err(query_failed)
    }

    async fn pending(&self, limit: i64) -> Result<Vec<ReconciliationEntry>, StoreError> {
        let mut conn = self.conn().await?;

        let rows = reconciliation_entries::table
            .filter(reconciliation_entries::resolved.eq(false))
            .order(reconciliation_entries::id.asc())
            .limit(limit)
            .load::<DbReconciliationEntry>(&mut conn)
            .await
            .map_err(query_failed)?;

        Ok(rows.into_iter().map(ReconciliationEntry::from).collect())
    }

    async fn claim(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let claimed = diesel::update(
            reconciliation_entries::table
                .filter(reconciliation_entries::id.eq(id))
                .filter(reconciliation_entries::resolved.eq(false)),
        )
        .set((
            reconciliation_entries::resolved.eq(true),
            reconciliation_entries::updated_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)
        .await
        .map_err(query_failed)?;

        Ok(claimed == 1)
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        diesel::update(reconciliation_entries::table.filter(reconciliation_entries::id.eq(id)))
            .set((
                reconciliation_entries::resolved.eq(false),
                reconciliation_entries::attempts.eq(reconciliation_entries::attempts + 1),
                reconciliation_entries::last_error.eq(Some(error)),
                reconciliation_entries::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)
            .await
            .map_err(query_failed)?;

        Ok(())
    }

    async fn pending_quantity(&self, event_id: EventId) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;

        let sum = reconciliation_entries::table
            .filter(reconciliation_entries::event_id.eq(event_id))
            .filter(reconciliation_entries::resolved.eq(false))
            .select(diesel::dsl::sum(reconciliation_entries::quantity))
            .first::<Option<i64>>(&mut conn)
            .await
            .map_err(query_failed)?;

        Ok(sum.unwrap_or(0))
    }
}
