diesel::table! {
    sequence_counters (namespace) {
        namespace -> Varchar,
        seq -> Int8,
    }
}

diesel::table! {
    events (row_id) {
        row_id -> Uuid,
        id -> Int8,
        title -> Varchar,
        price -> Numeric,
        total_tickets -> Int4,
        available_tickets -> Int4,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    bookings (row_id) {
        row_id -> Uuid,
        id -> Int8,
        event_id -> Int8,
        user_id -> Int8,
        quantity -> Int4,
        total_price -> Numeric,
        status -> Varchar,
        booking_date -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Int8,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Nullable<Bool>,
        created_at -> Nullable<Timestamptz>,
        attempts -> Int4,
        last_error -> Nullable<Text>,
    }
}

diesel::table! {
    reconciliation_entries (id) {
        id -> Int8,
        event_id -> Int8,
        booking_id -> Nullable<Int8>,
        quantity -> Int4,
        reason -> Text,
        attempts -> Int4,
        last_error -> Nullable<Text>,
        resolved -> Bool,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    sequence_counters,
    events,
    bookings,
    outbox_events,
    reconciliation_entries,
);
