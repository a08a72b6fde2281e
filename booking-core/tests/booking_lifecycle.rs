mod common;

use bigdecimal::BigDecimal;
use booking_core::{BookingRepository, InMemoryStore};
use chrono::{Duration, Utc};
use common::{available, create_event, harness};
use shared::{Booking, BookingError, BookingStatus, Entity, PageRequest, Requester};

#[tokio::test]
async fn book_cancel_and_recancel() {
    let h = harness();
    let event = create_event(&h.registry, 10, 25).await;
    let owner = Requester::user(1);

    let booking = h.lifecycle.create_booking(owner.user_id, event.id, 3).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Active);
    assert_eq!(booking.total_price, BigDecimal::from(75));
    assert_eq!(available(&h.store, event.id).await, 7);

    let cancelled = h.lifecycle.cancel_booking(&owner, booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(available(&h.store, event.id).await, 10);

    assert_eq!(
        h.lifecycle.cancel_booking(&owner, booking.id).await,
        Err(BookingError::AlreadyCancelled(booking.id))
    );
    assert_eq!(available(&h.store, event.id).await, 10);

    let stored = h.store.find(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert!(h.reconciler.audit(event.id).await.unwrap().consistent);
}

#[tokio::test]
async fn invalid_quantity_has_no_side_effects() {
    let h = harness();
    let event = create_event(&h.registry, 5, 10).await;

    for quantity in [0, -3] {
        assert!(matches!(
            h.lifecycle.create_booking(1, event.id, quantity).await,
            Err(BookingError::Validation(_))
        ));
    }

    assert_eq!(available(&h.store, event.id).await, 5);
    assert_eq!(h.store.last_sequence("booking").unwrap(), 0);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let h = harness();

    assert_eq!(
        h.lifecycle.create_booking(1, 404, 1).await,
        Err(BookingError::event_not_found(404))
    );
    assert_eq!(h.store.last_sequence("booking").unwrap(), 0);
}

#[tokio::test]
async fn insufficient_inventory_allocates_no_id() {
    let h = harness();
    let event = create_event(&h.registry, 2, 10).await;

    assert_eq!(
        h.lifecycle.create_booking(1, event.id, 3).await,
        Err(BookingError::InsufficientInventory {
            event_id: event.id,
            requested: 3,
            available: 2
        })
    );
    assert_eq!(available(&h.store, event.id).await, 2);
    assert_eq!(h.store.last_sequence("booking").unwrap(), 0);
}

#[tokio::test]
async fn booking_ids_are_sequential() {
    let h = harness();
    let event = create_event(&h.registry, 10, 10).await;

    let ids: Vec<i64> = {
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(h.lifecycle.create_booking(1, event.id, 1).await.unwrap().id);
        }
        ids
    };

    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn price_is_frozen_at_booking_time() {
    let h = harness();
    let event = create_event(&h.registry, 10, 30).await;
    let booking = h.lifecycle.create_booking(1, event.id, 2).await.unwrap();

    h.registry
        .update_price(&Requester::admin(99), event.id, BigDecimal::from(100))
        .await
        .unwrap();

    let details = h.lifecycle.get_booking(&Requester::user(1), booking.id).await.unwrap();
    assert_eq!(details.booking.total_price, BigDecimal::from(60));
    assert_eq!(details.event.map(|e| e.price), Some(BigDecimal::from(100)));

    let later = h.lifecycle.create_booking(1, event.id, 2).await.unwrap();
    assert_eq!(later.total_price, BigDecimal::from(200));
}

#[tokio::test]
async fn only_owner_or_admin_may_cancel() {
    let h = harness();
    let event = create_event(&h.registry, 4, 10).await;
    let booking = h.lifecycle.create_booking(1, event.id, 2).await.unwrap();

    assert_eq!(
        h.lifecycle.cancel_booking(&Requester::user(2), booking.id).await,
        Err(BookingError::forbidden(2, Entity::Booking, booking.id))
    );
    assert_eq!(available(&h.store, event.id).await, 2);

    let cancelled = h.lifecycle.cancel_booking(&Requester::admin(7), booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(available(&h.store, event.id).await, 4);
}

#[tokio::test]
async fn cancelling_a_missing_booking_is_not_found() {
    let h = harness();

    assert_eq!(
        h.lifecycle.cancel_booking(&Requester::admin(1), 77).await,
        Err(BookingError::booking_not_found(77))
    );
}

#[tokio::test]
async fn get_booking_joins_event_and_checks_ownership() {
    let h = harness();
    let event = create_event(&h.registry, 4, 15).await;
    let booking = h.lifecycle.create_booking(5, event.id, 1).await.unwrap();

    let details = h.lifecycle.get_booking(&Requester::user(5), booking.id).await.unwrap();
    assert_eq!(details.booking, booking);
    assert_eq!(details.event, Some(event.summary()));

    assert!(matches!(
        h.lifecycle.get_booking(&Requester::user(6), booking.id).await,
        Err(BookingError::Forbidden { .. })
    ));
    assert!(h.lifecycle.get_booking(&Requester::admin(6), booking.id).await.is_ok());
    assert_eq!(
        h.lifecycle.get_booking(&Requester::user(5), 999).await,
        Err(BookingError::booking_not_found(999))
    );
}

#[tokio::test]
async fn list_is_scoped_to_user_and_newest_first() {
    let store = InMemoryStore::new();
    let base = Utc::now();
    for (id, user, offset) in [(1, 1, 30), (2, 1, 10), (3, 2, 20), (4, 1, 20)] {
        let mut booking = Booking::new(id, 1, user, 1, &BigDecimal::from(5));
        booking.booking_date = base + Duration::seconds(offset);
        store.insert(&booking).await.unwrap();
    }

    let page = store.list_for_user(1, PageRequest::default()).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 4, 2]);

    let h = harness();
    let event = create_event(&h.registry, 10, 10).await;
    for _ in 0..3 {
        h.lifecycle.create_booking(8, event.id, 1).await.unwrap();
    }
    let second = h
        .lifecycle
        .list_bookings(8, PageRequest::new(Some(2), Some(2)).unwrap())
        .await
        .unwrap();
    assert_eq!((second.total, second.items.len()), (3, 1));
}
