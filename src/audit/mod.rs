//! Audit Log Service
//!
//! Append-only record of every state-changing operation with the operation
//! context that caused it. Settlement writes its rows inside the settlement
//! transaction so the audit trail can never disagree with the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::OperationContext;

/// Audit log entry as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub request_user_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    EventCreated,
    CapacityChanged,
    EventCancelled,
    EventCompleted,
    EventRemoved,
    ParticipantJoined,
    ParticipantLeft,
    PaymentSessionCreated,
    PaymentSettled,
    PaymentCancelled,
    AnomalyRecorded,
    AnomalyResolved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EventCreated => "event.created",
            AuditAction::CapacityChanged => "event.capacity_changed",
            AuditAction::EventCancelled => "event.cancelled",
            AuditAction::EventCompleted => "event.completed",
            AuditAction::EventRemoved => "event.removed",
            AuditAction::ParticipantJoined => "participant.joined",
            AuditAction::ParticipantLeft => "participant.left",
            AuditAction::PaymentSessionCreated => "payment.session_created",
            AuditAction::PaymentSettled => "payment.settled",
            AuditAction::PaymentCancelled => "payment.cancelled",
            AuditAction::AnomalyRecorded => "settlement.anomaly_recorded",
            AuditAction::AnomalyResolved => "settlement.anomaly_resolved",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: AuditAction,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            resource_type: None,
            resource_id: None,
            before_state: None,
            after_state: None,
        }
    }

    /// Set the resource type and ID
    pub fn resource(mut self, resource_type: &str, resource_id: Uuid) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id);
        self
    }

    pub fn before_state<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    pub fn after_state<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }
}

const INSERT_AUDIT: &str = r#"
    INSERT INTO audit_logs (
        id, api_key_id, request_user_id, correlation_id,
        action, resource_type, resource_id, before_state, after_state
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

/// Audit Log Service
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

impl AuditLogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write an audit log entry in its own statement
    pub async fn log(
        &self,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        let id = Uuid::new_v4();
        bind_entry(sqlx::query(INSERT_AUDIT), id, &builder, context)
            .execute(&self.pool)
            .await?;

        tracing::debug!(audit_id = %id, action = %builder.action, "Audit log entry created");
        Ok(id)
    }

    /// Write an audit log entry as part of the caller's transaction
    pub async fn log_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        builder: AuditLogBuilder,
        context: &OperationContext,
    ) -> Result<Uuid, AuditLogError> {
        let id = Uuid::new_v4();
        bind_entry(sqlx::query(INSERT_AUDIT), id, &builder, context)
            .execute(&mut **tx)
            .await?;

        tracing::debug!(audit_id = %id, action = %builder.action, "Audit log entry created");
        Ok(id)
    }

    /// Audit trail of one resource, newest first
    pub async fn get_by_resource(
        &self,
        resource_type: &str,
        resource_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let rows: Vec<(
            Uuid,
            Option<Uuid>,
            Option<Uuid>,
            Option<Uuid>,
            String,
            Option<String>,
            Option<Uuid>,
            Option<serde_json::Value>,
            Option<serde_json::Value>,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT id, api_key_id, request_user_id, correlation_id,
                   action, resource_type, resource_id, before_state, after_state, created_at
            FROM audit_logs
            WHERE resource_type = $1 AND resource_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    api_key_id,
                    request_user_id,
                    correlation_id,
                    action,
                    resource_type,
                    resource_id,
                    before_state,
                    after_state,
                    created_at,
                )| AuditLogEntry {
                    id,
                    api_key_id,
                    request_user_id,
                    correlation_id,
                    action,
                    resource_type,
                    resource_id,
                    before_state,
                    after_state,
                    created_at,
                },
            )
            .collect())
    }
}

fn bind_entry<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    id: Uuid,
    builder: &'q AuditLogBuilder,
    context: &OperationContext,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(id)
        .bind(context.api_key_id)
        .bind(context.request_user_id)
        .bind(context.correlation_id)
        .bind(builder.action.as_str())
        .bind(&builder.resource_type)
        .bind(builder.resource_id)
        .bind(&builder.before_state)
        .bind(&builder.after_state)
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
