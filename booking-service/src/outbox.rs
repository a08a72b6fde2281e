use anyhow::Result;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;
use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

const BATCH_SIZE: i64 = 100;

/// Rows that failed this many times are parked and left for manual replay.
const MAX_PUBLISH_ATTEMPTS: i32 = 10;

#[derive(Debug, PartialEq)]
enum Delivery {
    Published(Uuid),
    Failed {
        id: Uuid,
        booking_id: i64,
        attempts: i32,
        error: String,
    },
    /// An earlier event of the same booking failed in this pass.
    Held(Uuid),
}

impl Delivery {
    fn parked(&self) -> bool {
        matches!(self, Delivery::Failed { attempts, .. } if *attempts >= MAX_PUBLISH_ATTEMPTS)
    }
}

/// Publishes `rows` in order. A booking whose event fails keeps its later
/// events for the next pass; other bookings carry on.
async fn relay<F, Fut>(rows: Vec<DbOutboxEvent>, mut publish: F) -> Vec<Delivery>
where
    F: FnMut(DbOutboxEvent) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut held = HashSet::new();
    let mut deliveries = Vec::with_capacity(rows.len());

    for row in rows {
        let (id, booking_id, attempts) = (row.id, row.aggregate_id, row.attempts);
        if held.contains(&booking_id) {
            deliveries.push(Delivery::Held(id));
            continue;
        }

        match publish(row).await {
            Ok(()) => deliveries.push(Delivery::Published(id)),
            Err(e) => {
                held.insert(booking_id);
                deliveries.push(Delivery::Failed {
                    id,
                    booking_id,
                    attempts: attempts + 1,
                    error: e.to_string(),
                });
            }
        }
    }

    deliveries
}

/// Relays booking events written next to booking rows to Kafka.
pub struct OutboxProcessor {
    pool: DbPool,
    producer: FutureProducer,
    topic: String,
    interval: Duration,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, producer: FutureProducer, topic: String, interval: Duration) -> Self {
        Self { pool, producer, topic, interval }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.process_outbox_events().await {
                error!("Error processing outbox events: {}", e);
            }
        }
    }

    async fn process_outbox_events(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let unprocessed_events = outbox_events::table
            .filter(outbox_events::processed.eq(false))
            .filter(outbox_events::attempts.lt(MAX_PUBLISH_ATTEMPTS))
            .order(outbox_events::created_at.asc())
            .limit(BATCH_SIZE)
            .load::<DbOutboxEvent>(&mut conn)
            .await?;

        let deliveries = relay(unprocessed_events, |row| async move { self.publish_event(&row).await }).await;

        for delivery in deliveries {
            match &delivery {
                Delivery::Published(id) => {
                    diesel::update(outbox_events::table.filter(outbox_events::id.eq(id)))
                        .set(outbox_events::processed.eq(true))
                        .execute(&mut conn)
                        .await?;
                    info!(outbox_id = %id, "Published outbox event");
                }
                Delivery::Failed { id, booking_id, attempts, error } => {
                    diesel::update(outbox_events::table.filter(outbox_events::id.eq(id)))
                        .set((
                            outbox_events::attempts.eq(attempts),
                            outbox_events::last_error.eq(Some(error.as_str())),
                        ))
                        .execute(&mut conn)
                        .await?;
                    if delivery.parked() {
                        error!(outbox_id = %id, booking_id, attempts, "Outbox event parked after repeated failures: {}", error);
                    } else {
                        warn!(outbox_id = %id, booking_id, attempts, "Failed to publish event: {}", error);
                    }
                }
                Delivery::Held(_) => {}
            }
        }

        Ok(())
    }

    async fn publish_event(&self, event: &DbOutboxEvent) -> Result<()> {
        let json = serde_json::to_string(&event.event_data)?;
        let key = event.aggregate_id.to_string();
        let record = FutureRecord::to(&self.topic)
            .payload(&json)
            .key(&key);

        self.producer.send(record, Duration::from_secs(5)).await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(booking_id: i64, attempts: i32) -> DbOutboxEvent {
        DbOutboxEvent {
            id: Uuid::new_v4(),
            aggregate_id: booking_id,
            event_type: "BookingCreated".to_string(),
            event_data: serde_json::json!({ "booking_id": booking_id }),
            processed: Some(false),
            created_at: None,
            attempts,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn failed_booking_holds_only_its_own_later_events() {
        let rows = vec![row(1, 0), row(2, 0), row(1, 0)];
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let broken = ids[0];

        let deliveries = relay(rows, |row| async move {
            if row.id == broken {
                anyhow::bail!("broker down");
            }
            Ok(())
        })
        .await;

        assert_eq!(
            deliveries,
            vec![
                Delivery::Failed {
                    id: ids[0],
                    booking_id: 1,
                    attempts: 1,
                    error: "broker down".to_string(),
                },
                Delivery::Published(ids[1]),
                Delivery::Held(ids[2]),
            ]
        );
        assert!(!deliveries[0].parked());
    }

    #[tokio::test]
    async fn repeatedly_failing_row_is_parked() {
        let deliveries = relay(vec![row(4, MAX_PUBLISH_ATTEMPTS - 1)], |_| async {
            Err(anyhow::anyhow!("message too large"))
        })
        .await;

        assert!(deliveries[0].parked());
    }
}
