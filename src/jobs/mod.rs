//! Scheduled Jobs
//!
//! Background maintenance. Abandoned checkouts never hold capacity, but their
//! UNPAID records block a new attempt by the same user until cancelled; the
//! expiry job cancels them after a configurable time.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::payments::{PaymentRecordStore, PaymentStoreError};

// =========================================================================
// Unpaid payment expiry
// =========================================================================

/// Cancel UNPAID records older than `ttl_minutes`.
///
/// A "paid" notification that arrives later still settles the record.
pub async fn expire_unpaid_payments(pool: &PgPool, ttl_minutes: i64) -> Result<u64, JobError> {
    let expired = PaymentRecordStore::new(pool.clone())
        .expire_stale_unpaid(ttl_minutes)
        .await?;

    if expired > 0 {
        tracing::info!(
            rows_affected = expired,
            ttl_minutes = ttl_minutes,
            "Expired stale unpaid payment records"
        );
    }

    Ok(expired)
}

/// Count of settlement anomalies still waiting for an operator
pub async fn count_unresolved_anomalies(pool: &PgPool) -> Result<i64, JobError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM settlement_anomalies WHERE resolved_at IS NULL")
            .fetch_one(pool)
            .await?;

    if count > 0 {
        tracing::warn!(unresolved = count, "Settlement anomalies awaiting resolution");
    }

    Ok(count)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for the unpaid expiry sweep (default: 5 minutes)
    pub unpaid_expiry_interval: Duration,
    /// Age after which an UNPAID record is cancelled
    pub unpaid_ttl_minutes: i64,
    /// Interval for the anomaly reminder (default: 1 hour)
    pub anomaly_report_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            unpaid_expiry_interval: Duration::from_secs(300),
            unpaid_ttl_minutes: 1440,
            anomaly_report_interval: Duration::from_secs(3600),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut expiry_interval = interval(self.config.unpaid_expiry_interval);
        let mut anomaly_interval = interval(self.config.anomaly_report_interval);

        loop {
            tokio::select! {
                _ = expiry_interval.tick() => {
                    if let Err(e) = expire_unpaid_payments(&self.pool, self.config.unpaid_ttl_minutes).await {
                        tracing::error!(error = %e, "Unpaid payment expiry failed");
                    }
                }
                _ = anomaly_interval.tick() => {
                    if let Err(e) = count_unresolved_anomalies(&self.pool).await {
                        tracing::error!(error = %e, "Anomaly report failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match expire_unpaid_payments(&self.pool, self.config.unpaid_ttl_minutes).await {
            Ok(count) => report.unpaid_payments_expired = count,
            Err(e) => report.errors.push(format!("Unpaid expiry: {}", e)),
        }

        match count_unresolved_anomalies(&self.pool).await {
            Ok(count) => report.unresolved_anomalies = count,
            Err(e) => report.errors.push(format!("Anomaly report: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub unpaid_payments_expired: u64,
    pub unresolved_anomalies: i64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payment store error: {0}")]
    Payments(#[from] PaymentStoreError),
}
