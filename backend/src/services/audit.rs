//! Audit trail for ledger mutations
//!
//! Audit writes run after the stock transaction has committed and never
//! fail the operation that produced them: errors are logged and dropped.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::StockMovement;

/// A single audit record
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: Option<Uuid>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(
        company_id: Uuid,
        user_id: Uuid,
        action: &'static str,
        entity: &'static str,
        entity_id: Option<Uuid>,
        details: Value,
    ) -> Self {
        Self {
            company_id,
            user_id,
            action,
            entity,
            entity_id,
            details,
        }
    }

    /// Event describing a movement that was just written
    pub fn movement(
        company_id: Uuid,
        user_id: Uuid,
        action: &'static str,
        movement: &StockMovement,
    ) -> Self {
        Self::new(
            company_id,
            user_id,
            action,
            "stock_movement",
            Some(movement.id),
            serde_json::json!({
                "tank_id": movement.tank_id,
                "kind": movement.kind,
                "quantity": movement.quantity,
                "stock_before": movement.stock_before,
                "stock_after": movement.stock_after,
                "origin_module": movement.origin_module,
                "origin_reference": movement.origin_reference,
            }),
        )
    }
}

/// Fire-and-forget writer for the audit_log table
#[derive(Clone)]
pub struct AuditService {
    db: PgPool,
    enabled: bool,
}

impl AuditService {
    pub fn new(db: PgPool, enabled: bool) -> Self {
        Self { db, enabled }
    }

    /// Queue an audit record; failures are logged, never returned
    pub fn record(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }

        let db = self.db.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO audit_log (company_id, user_id, action, entity, entity_id, details)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(event.company_id)
            .bind(event.user_id)
            .bind(event.action)
            .bind(event.entity)
            .bind(event.entity_id)
            .bind(&event.details)
            .execute(&db)
            .await;

            if let Err(e) = result {
                tracing::warn!(
                    action = event.action,
                    entity = event.entity,
                    "Failed to write audit record: {}",
                    e
                );
            }
        });
    }
}
