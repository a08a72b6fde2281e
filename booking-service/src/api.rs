use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use bigdecimal::BigDecimal;
use booking_core::{BookingLifecycle, EventRegistry, Reconciler};
use serde::{Deserialize, Serialize};
use shared::*;
use std::sync::Arc;
use tracing::error;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<BookingLifecycle>,
    pub registry: Arc<EventRegistry>,
    pub reconciler: Arc<Reconciler>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub price: BigDecimal,
    pub total_tickets: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriceRequest {
    pub price: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub event_id: EventId,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<i64>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error,
                message: message.into(),
                entry: None,
            },
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Validation(_) => Self::bad_request(message),
            BookingError::InsufficientInventory { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "insufficient_inventory", message)
            }
            BookingError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            BookingError::Forbidden { .. } => Self::new(StatusCode::FORBIDDEN, "forbidden", message),
            BookingError::AlreadyCancelled(_) => Self::new(StatusCode::BAD_REQUEST, "already_cancelled", message),
            BookingError::Persistence(_) => {
                error!("Request failed on storage: {}", message);
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "persistence_error", message)
            }
            BookingError::ReconciliationRequired { entry, .. } => {
                error!(entry = ?entry, "Request left inventory awaiting reconciliation: {}", message);
                let mut api_error = Self::new(StatusCode::INTERNAL_SERVER_ERROR, "reconciliation_required", message);
                api_error.body.entry = entry;
                api_error
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Identity forwarded by the authenticating proxy in front of the service.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Requester);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized(format!("missing {} header", USER_ID_HEADER)))?
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .ok_or_else(|| ApiError::unauthorized(format!("malformed {} header", USER_ID_HEADER)))?;

        let role = match parts.headers.get(USER_ROLE_HEADER).map(|value| value.to_str()) {
            None => Role::User,
            Some(Ok(value)) if value.eq_ignore_ascii_case("admin") => Role::Admin,
            Some(Ok(value)) if value.eq_ignore_ascii_case("user") => Role::User,
            Some(_) => return Err(ApiError::unauthorized(format!("malformed {} header", USER_ROLE_HEADER))),
        };

        Ok(Identity(Requester { user_id, role }))
    }
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("'{}' is not a valid id", raw)))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(create_event))
        .route("/events/:id", get(get_event))
        .route("/events/:id/price", put(update_price))
        .route("/events/:id/audit", get(audit_event))
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_event(
    State(state): State<AppState>,
    Identity(_requester): Identity,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EventRecord>), ApiError> {
    let Json(request) = payload?;

    let event = state
        .registry
        .create_event(NewEvent {
            title: request.title,
            price: request.price,
            total_tickets: request.total_tickets,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventRecord>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.registry.get_event(id).await?))
}

pub async fn update_price(
    State(state): State<AppState>,
    Identity(requester): Identity,
    Path(id): Path<String>,
    payload: Result<Json<UpdatePriceRequest>, JsonRejection>,
) -> Result<Json<EventRecord>, ApiError> {
    let id = parse_id(&id)?;
    let Json(request) = payload?;

    Ok(Json(state.registry.update_price(&requester, id, request.price).await?))
}

pub async fn audit_event(
    State(state): State<AppState>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<InventoryAudit>, ApiError> {
    let id = parse_id(&id)?;
    if !requester.is_admin() {
        return Err(BookingError::forbidden(requester.user_id, Entity::Event, id).into());
    }

    Ok(Json(state.reconciler.audit(id).await?))
}

pub async fn create_booking(
    State(state): State<AppState>,
    Identity(requester): Identity,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let Json(request) = payload?;

    let booking = state
        .lifecycle
        .create_booking(requester.user_id, request.event_id, request.quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Identity(requester): Identity,
    query: Result<Query<ListBookingsQuery>, QueryRejection>,
) -> Result<Json<BookingPage>, ApiError> {
    let Query(query) = query?;
    let page = PageRequest::new(query.page, query.limit)?;

    Ok(Json(state.lifecycle.list_bookings(requester.user_id, page).await?))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<BookingDetails>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.lifecycle.get_booking(&requester, id).await?))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.lifecycle.cancel_booking(&requester, id).await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}
