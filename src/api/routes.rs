//! API Routes
//!
//! HTTP endpoint definitions. Request bodies are deserialized into typed
//! requests and turned into handler commands here; nothing below this layer
//! sees raw JSON.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, FromRef, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{EventCapacity, EventStatus, OperationContext, Participant, PaymentRecord};
use crate::error::AppError;
use crate::gateway::{PaymentGateway, SIGNATURE_HEADER};
use crate::handlers::{
    ChangeCapacityCommand, CreateEventCommand, EventManagementHandler, JoinEventCommand,
    JoinOutcome, LeaveResult, NotificationAck, NotificationHandler, OperatorHandler,
    PaymentHandler, RegistrationCoordinator, ResolveAnomalyCommand,
};
use crate::ledger::EventDetails;
use crate::revenue::{HostRevenue, SettlementAnomaly};

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: Arc<Config>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct ChangeCapacityRequest {
    pub max_participants: i32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JoinResponse {
    Joined {
        participant: Participant,
        event_status: EventStatus,
    },
    PaymentRequired {
        payment_record_id: Uuid,
        checkout_url: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct AnomaliesQuery {
    #[serde(default = "default_unresolved_only")]
    pub unresolved_only: bool,
}

fn default_unresolved_only() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct AnomaliesResponse {
    pub anomalies: Vec<SettlementAnomaly>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAnomalyRequest {
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub result: &'static str,
}

// =========================================================================
// API Router
// =========================================================================

/// Routes under /api/v1 (API key required)
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Events
        .route("/events", post(create_event))
        .route("/events/:event_id", get(get_event).delete(remove_event))
        .route("/events/:event_id/capacity", patch(change_capacity))
        .route("/events/:event_id/cancel", post(cancel_event))
        .route("/events/:event_id/complete", post(complete_event))
        // Registration
        .route("/events/:event_id/join", post(join_event))
        .route("/events/:event_id/leave", post(leave_event))
        // Payments
        .route("/payments/:payment_id/cancel", post(cancel_payment))
        // Revenue
        .route("/hosts/:host_id/revenue", get(host_revenue))
        // Admin
        .route("/admin/anomalies", get(list_anomalies))
        .route("/admin/anomalies/:anomaly_id/resolve", post(resolve_anomaly))
}

/// Gateway-facing routes (signature auth only)
pub fn create_webhook_router() -> Router<AppState> {
    Router::new().route("/payments", post(payment_webhook))
}

fn require_request_user(context: &OperationContext) -> Result<Uuid, AppError> {
    context
        .request_user_id
        .ok_or_else(|| AppError::MissingHeader("X-Request-User-Id".to_string()))
}

// =========================================================================
// Events
// =========================================================================

/// POST /events
async fn create_event(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<CreateEventCommand>,
) -> Result<(StatusCode, Json<EventCapacity>), AppError> {
    require_request_user(&context)?;
    let event = EventManagementHandler::new(pool).create(command, &context).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /events/:event_id
async fn get_event(
    State(pool): State<PgPool>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventDetails>, AppError> {
    let event = EventManagementHandler::new(pool).get(event_id).await?;
    Ok(Json(event))
}

/// PATCH /events/:event_id/capacity
async fn change_capacity(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<ChangeCapacityRequest>,
) -> Result<Json<EventCapacity>, AppError> {
    let command = ChangeCapacityCommand {
        event_id,
        max_participants: request.max_participants,
    };
    let event = EventManagementHandler::new(pool)
        .change_capacity(command, &context)
        .await?;
    Ok(Json(event))
}

/// POST /events/:event_id/cancel
async fn cancel_event(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventCapacity>, AppError> {
    let event = EventManagementHandler::new(pool).cancel(event_id, &context).await?;
    Ok(Json(event))
}

/// POST /events/:event_id/complete
async fn complete_event(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventCapacity>, AppError> {
    let event = EventManagementHandler::new(pool).complete(event_id, &context).await?;
    Ok(Json(event))
}

/// DELETE /events/:event_id (soft delete)
async fn remove_event(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventCapacity>, AppError> {
    let event = EventManagementHandler::new(pool).remove(event_id, &context).await?;
    Ok(Json(event))
}

// =========================================================================
// Registration
// =========================================================================

/// POST /events/:event_id/join
async fn join_event(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(event_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let user_id = require_request_user(&context)?;

    let coordinator = RegistrationCoordinator::new(
        state.pool.clone(),
        state.gateway.clone(),
        state.config.payment_currency.clone(),
    );

    let outcome = coordinator
        .request_join(JoinEventCommand::new(event_id, user_id), &context)
        .await?;

    let response = match outcome {
        JoinOutcome::JoinedFree {
            participant,
            event_status,
        } => JoinResponse::Joined {
            participant,
            event_status,
        },
        JoinOutcome::PaymentSessionCreated {
            payment_record_id,
            checkout_url,
            ..
        } => JoinResponse::PaymentRequired {
            payment_record_id,
            checkout_url,
        },
        JoinOutcome::Rejected(reason) => return Err(AppError::Rejected(reason)),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /events/:event_id/leave
async fn leave_event(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<LeaveResult>, AppError> {
    require_request_user(&context)?;

    let coordinator = RegistrationCoordinator::new(
        state.pool.clone(),
        state.gateway.clone(),
        state.config.payment_currency.clone(),
    );
    let result = coordinator.leave(event_id, &context).await?;
    Ok(Json(result))
}

// =========================================================================
// Payments
// =========================================================================

/// POST /payments/:payment_id/cancel
async fn cancel_payment(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentRecord>, AppError> {
    require_request_user(&context)?;
    let record = PaymentHandler::new(pool).cancel(payment_id, &context).await?;
    Ok(Json(record))
}

/// POST /webhooks/payments
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let context = OperationContext::system(Uuid::new_v4());

    let handler = NotificationHandler::new(
        state.pool.clone(),
        state.config.stripe_webhook_secret.clone(),
        state.config.webhook_tolerance_secs,
    );
    let ack: NotificationAck = handler.handle(&body, signature, &context).await?;

    Ok(Json(WebhookResponse {
        received: true,
        result: ack.as_str(),
    }))
}

// =========================================================================
// Revenue / admin
// =========================================================================

/// GET /hosts/:host_id/revenue
async fn host_revenue(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(host_id): Path<Uuid>,
) -> Result<Json<HostRevenue>, AppError> {
    let revenue = OperatorHandler::new(pool).host_revenue(host_id, &context).await?;
    Ok(Json(revenue))
}

/// GET /admin/anomalies
async fn list_anomalies(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<AnomaliesQuery>,
) -> Result<Json<AnomaliesResponse>, AppError> {
    let anomalies = OperatorHandler::new(pool)
        .list_anomalies(query.unresolved_only, &context)
        .await?;
    Ok(Json(AnomaliesResponse { anomalies }))
}

/// POST /admin/anomalies/:anomaly_id/resolve
async fn resolve_anomaly(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(anomaly_id): Path<Uuid>,
    Json(request): Json<ResolveAnomalyRequest>,
) -> Result<Json<SettlementAnomaly>, AppError> {
    let command = ResolveAnomalyCommand {
        anomaly_id,
        note: request.note,
    };
    let anomaly = OperatorHandler::new(pool).resolve_anomaly(command, &context).await?;
    Ok(Json(anomaly))
}
