//! Operator queries and settlement anomaly resolution

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::revenue::{HostRevenue, RevenueAccumulator, SettlementAnomaly, SettlementAnomalyStore};

use super::ResolveAnomalyCommand;

pub struct OperatorHandler {
    revenue: RevenueAccumulator,
    anomalies: SettlementAnomalyStore,
    audit: AuditLogService,
}

impl OperatorHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            revenue: RevenueAccumulator::new(pool.clone()),
            anomalies: SettlementAnomalyStore::new(pool.clone()),
            audit: AuditLogService::new(pool),
        }
    }

    /// Running total for a host, visible to the host and admins
    pub async fn host_revenue(
        &self,
        host_id: Uuid,
        context: &OperationContext,
    ) -> Result<HostRevenue, AppError> {
        context.ensure_can_manage(host_id)?;
        Ok(self.revenue.get_host_revenue(host_id).await?)
    }

    pub async fn list_anomalies(
        &self,
        unresolved_only: bool,
        context: &OperationContext,
    ) -> Result<Vec<SettlementAnomaly>, AppError> {
        if !context.is_admin {
            return Err(AppError::PermissionDenied);
        }
        Ok(self.anomalies.list(unresolved_only).await?)
    }

    /// Close an anomaly once it was compensated. Payment and ledger stay as
    /// they are.
    pub async fn resolve_anomaly(
        &self,
        command: ResolveAnomalyCommand,
        context: &OperationContext,
    ) -> Result<SettlementAnomaly, AppError> {
        if !context.is_admin {
            return Err(AppError::PermissionDenied);
        }
        let note = command.note.trim();
        if note.is_empty() {
            return Err(AppError::InvalidRequest(
                "resolution note must not be empty".to_string(),
            ));
        }

        let anomaly = self.anomalies.resolve(command.anomaly_id, note).await?;

        self.audit
            .log(
                AuditLogBuilder::new(AuditAction::AnomalyResolved)
                    .resource("SettlementAnomaly", anomaly.id)
                    .after_state(&anomaly),
                context,
            )
            .await?;

        tracing::info!(anomaly_id = %anomaly.id, "Settlement anomaly resolved");
        Ok(anomaly)
    }
}
