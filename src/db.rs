//! Database module
//!
//! Database connection and schema verification utilities.
//! The schema itself lives in migrations/ as raw SQL.

use sqlx::PgPool;

const REQUIRED_TABLES: [&str; 7] = [
    "api_keys",
    "events",
    "participants",
    "payment_records",
    "host_revenue",
    "settlement_anomalies",
    "audit_logs",
];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables and the active-unpaid guard index exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    let index_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE indexname = 'uq_payment_records_active_unpaid')",
    )
    .fetch_one(pool)
    .await?;

    if !index_exists {
        tracing::error!("Required index 'uq_payment_records_active_unpaid' does not exist");
        return Ok(false);
    }

    Ok(true)
}
