//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

use event_settlement::domain::{EventCapacity, JoiningFee, OperationContext};
use event_settlement::gateway::{sign_payload, MockGateway};
use event_settlement::handlers::{NotificationHandler, RegistrationCoordinator};
use event_settlement::ledger::{CapacityLedger, NewEvent};

pub const API_KEY: &str = "test_key_123";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const SCHEMA_LOCK: i64 = 0x5e77_1e;

/// Connect, apply the schema and seed an admin API key.
///
/// Tests share one database; every test works on its own freshly created
/// events and users instead of truncating.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(SCHEMA_LOCK)
        .execute(&mut *conn)
        .await
        .expect("Failed to take schema lock");

    (&mut *conn)
        .execute(SCHEMA)
        .await
        .expect("Failed to apply schema");

    sqlx::query(
        r#"
        INSERT INTO api_keys (id, name, key_hash, key_prefix, permissions, is_active)
        VALUES ($1, 'Test Key', encode(sha256($2::bytea), 'hex'), 'test_', $3, true)
        ON CONFLICT (key_prefix) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(API_KEY.as_bytes())
    .bind(vec!["admin".to_string()])
    .execute(&mut *conn)
    .await
    .expect("Failed to seed API key");

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(SCHEMA_LOCK)
        .execute(&mut *conn)
        .await
        .expect("Failed to release schema lock");

    pool
}

/// Register an event for a fresh host
pub async fn create_event(pool: &PgPool, max_participants: i32, fee: Decimal) -> EventCapacity {
    CapacityLedger::new(pool.clone())
        .create_event(NewEvent {
            host_id: Uuid::new_v4(),
            title: "Integration event".to_string(),
            event_date: Utc::now() + chrono::Duration::days(3),
            min_participants: 1,
            max_participants,
            joining_fee: JoiningFee::new(fee).expect("valid fee"),
        })
        .await
        .expect("Failed to create event")
}

pub fn user_context(user_id: Uuid) -> OperationContext {
    OperationContext::new().with_request_user(user_id)
}

pub fn host_context(event: &EventCapacity) -> OperationContext {
    OperationContext::new().with_request_user(event.host_id)
}

pub fn coordinator(pool: &PgPool, gateway: Arc<MockGateway>) -> RegistrationCoordinator {
    RegistrationCoordinator::new(pool.clone(), gateway, "usd")
}

pub fn notification_handler(pool: &PgPool) -> NotificationHandler {
    NotificationHandler::new(pool.clone(), WEBHOOK_SECRET, 300)
}

/// A `checkout.session.completed` body carrying correlation metadata
pub fn checkout_completed(
    notification_id: &str,
    payment_status: &str,
    event_id: Uuid,
    user_id: Uuid,
    payment_record_id: Uuid,
) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": notification_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": format!("cs_{}", payment_record_id.simple()),
                "payment_status": payment_status,
                "metadata": {
                    "event_id": event_id.to_string(),
                    "user_id": user_id.to_string(),
                    "payment_record_id": payment_record_id.to_string()
                }
            }
        }
    }))
    .unwrap()
}

pub fn sign(payload: &[u8]) -> String {
    sign_payload(WEBHOOK_SECRET, payload, Utc::now().timestamp()).unwrap()
}

pub async fn active_participants(pool: &PgPool, event_id: Uuid) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM participants WHERE event_id = $1 AND lifecycle = 'active'",
    )
    .bind(event_id)
    .fetch_one(pool)
    .await
    .unwrap()
}
