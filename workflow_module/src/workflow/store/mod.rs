use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use super::approval::{ApprovalItem, ApprovalStatus, GatedAction};
use super::types::{
    AuditEntry, CancellationWorkflow, EscalationKind, EscalationRecord, FulfillmentConfig,
    WorkflowError,
};
use super::utils::{
    action_label, approval_status_label, bool_to_int, escalation_kind_label, format_datetime,
    method_label, optional_bool_to_int, parse_datetime, parse_escalation_kind, status_label,
    step_label,
};

mod migrations;
mod schema;
mod workflow_rows;

use migrations::{ensure_approval_columns, ensure_workflow_columns};
use schema::WORKFLOW_SCHEMA;
use workflow_rows::{ApprovalRow, ConfigRow, WorkflowRow, APPROVAL_COLUMNS, WORKFLOW_COLUMNS};

/// Durable record of every workflow; the source of truth for resumption,
/// idempotency, and timeout detection.
#[derive(Debug)]
pub struct SqliteWorkflowStore {
    path: PathBuf,
}

impl SqliteWorkflowStore {
    pub(crate) fn new(path: PathBuf) -> Result<Self, WorkflowError> {
        let store = Self { path };
        let _ = store.open()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, WorkflowError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(WORKFLOW_SCHEMA)?;
        ensure_workflow_columns(&conn)?;
        ensure_approval_columns(&conn)?;
        Ok(conn)
    }

    pub fn insert_workflow(
        &self,
        workflow: &CancellationWorkflow,
        config: &FulfillmentConfig,
    ) -> Result<(), WorkflowError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO workflows (id, order_number, order_total_cents, customer_email,
                 fulfillment_method, status, step, eligible, eligibility_reason,
                 eligibility_deadline, warehouse_reply_received, warehouse_reply, was_canceled,
                 refund_processed, refund_amount_cents, customer_acknowledgment_sent,
                 needs_reconciliation, failure_reason, order_created_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21)",
            params![
                workflow.id.to_string(),
                workflow.order_number,
                workflow.order_total_cents,
                workflow.customer_email,
                method_label(workflow.fulfillment_method),
                status_label(workflow.status),
                step_label(workflow.step),
                optional_bool_to_int(workflow.eligible),
                workflow.eligibility_reason,
                workflow.eligibility_deadline.map(format_datetime),
                bool_to_int(workflow.warehouse_reply_received),
                workflow.warehouse_reply,
                optional_bool_to_int(workflow.was_canceled),
                bool_to_int(workflow.refund_processed),
                workflow.refund_amount_cents,
                bool_to_int(workflow.customer_acknowledgment_sent),
                bool_to_int(workflow.needs_reconciliation),
                workflow.failure_reason,
                format_datetime(workflow.order_created_at),
                format_datetime(workflow.created_at),
                format_datetime(workflow.updated_at),
            ],
        )?;
        tx.execute(
            "INSERT INTO workflow_configs (workflow_id, method, warehouse_email, shipbob_token,
                 shipstation_api_key, shipstation_api_secret, require_approval,
                 store_utc_offset_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                workflow.id.to_string(),
                method_label(config.method),
                config.warehouse_email,
                config.shipbob_token,
                config.shipstation_api_key,
                config.shipstation_api_secret,
                bool_to_int(config.require_approval),
                config.store_utc_offset_minutes as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_workflow(&self, id: Uuid) -> Result<CancellationWorkflow, WorkflowError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM workflows WHERE id = ?1", WORKFLOW_COLUMNS),
                params![id.to_string()],
                WorkflowRow::from_row,
            )
            .optional()?;
        match row {
            Some(raw) => raw.into_workflow(),
            None => Err(WorkflowError::NotFound(id)),
        }
    }

    pub fn load_config(&self, id: Uuid) -> Result<FulfillmentConfig, WorkflowError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT method, warehouse_email, shipbob_token, shipstation_api_key,
                     shipstation_api_secret, require_approval, store_utc_offset_minutes
                 FROM workflow_configs WHERE workflow_id = ?1",
                params![id.to_string()],
                ConfigRow::from_row,
            )
            .optional()?;
        match row {
            Some(raw) => raw.into_config(),
            None => Err(WorkflowError::Storage(format!(
                "missing fulfillment config for workflow {}",
                id
            ))),
        }
    }

    /// Persists all mutable columns except `was_canceled`, which only
    /// `set_outcome_once` may write. Rows already in a terminal status are
    /// never touched; returns false when the update matched no row, so a
    /// caller holding a stale copy can detect the lost race.
    pub fn update_workflow(&self, workflow: &CancellationWorkflow) -> Result<bool, WorkflowError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE workflows
             SET status = ?2,
                 step = ?3,
                 eligible = ?4,
                 eligibility_reason = ?5,
                 eligibility_deadline = ?6,
                 warehouse_reply_received = ?7,
                 warehouse_reply = ?8,
                 refund_processed = ?9,
                 refund_amount_cents = ?10,
                 customer_acknowledgment_sent = ?11,
                 needs_reconciliation = ?12,
                 failure_reason = ?13,
                 updated_at = ?14
             WHERE id = ?1
               AND status NOT IN ('canceled', 'cannot_cancel', 'completed', 'failed')",
            params![
                workflow.id.to_string(),
                status_label(workflow.status),
                step_label(workflow.step),
                optional_bool_to_int(workflow.eligible),
                workflow.eligibility_reason,
                workflow.eligibility_deadline.map(format_datetime),
                bool_to_int(workflow.warehouse_reply_received),
                workflow.warehouse_reply,
                bool_to_int(workflow.refund_processed),
                workflow.refund_amount_cents,
                bool_to_int(workflow.customer_acknowledgment_sent),
                bool_to_int(workflow.needs_reconciliation),
                workflow.failure_reason,
                format_datetime(workflow.updated_at),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Writes the terminal outcome exactly once; returns false when it was
    /// already set.
    pub fn set_outcome_once(
        &self,
        id: Uuid,
        was_canceled: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE workflows SET was_canceled = ?2, updated_at = ?3
             WHERE id = ?1 AND was_canceled IS NULL
               AND status NOT IN ('canceled', 'cannot_cancel', 'completed', 'failed')",
            params![id.to_string(), bool_to_int(was_canceled), format_datetime(now)],
        )?;
        Ok(changed > 0)
    }

    pub fn list_non_terminal(&self) -> Result<Vec<CancellationWorkflow>, WorkflowError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workflows
             WHERE status IN ('processing', 'awaiting_warehouse')
             ORDER BY created_at",
            WORKFLOW_COLUMNS
        ))?;
        let rows = stmt.query_map([], WorkflowRow::from_row)?;
        let mut workflows = Vec::new();
        for row in rows {
            workflows.push(row?.into_workflow()?);
        }
        Ok(workflows)
    }

    /// Claims a named side effect for a workflow; returns false when it was
    /// already claimed, so a retried handler never repeats it.
    pub fn claim_side_effect(
        &self,
        id: Uuid,
        effect: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO side_effects (workflow_id, effect, created_at)
             VALUES (?1, ?2, ?3)",
            params![id.to_string(), effect, format_datetime(now)],
        )?;
        Ok(changed > 0)
    }

    /// Releases a claim after a retryable delivery failure so the sweep can
    /// try again.
    pub fn release_side_effect(&self, id: Uuid, effect: &str) -> Result<(), WorkflowError> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM side_effects WHERE workflow_id = ?1 AND effect = ?2",
            params![id.to_string(), effect],
        )?;
        Ok(())
    }

    pub fn side_effect_claimed(&self, id: Uuid, effect: &str) -> Result<bool, WorkflowError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM side_effects WHERE workflow_id = ?1 AND effect = ?2",
            params![id.to_string(), effect],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_approval(&self, item: &ApprovalItem) -> Result<(), WorkflowError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO approvals (id, workflow_id, action, proposed_action, metadata, status,
                 reason, created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id.to_string(),
                item.workflow_id.to_string(),
                action_label(item.action),
                item.proposed_action,
                item.metadata.to_string(),
                approval_status_label(item.status),
                item.reason,
                format_datetime(item.created_at),
                item.resolved_at.map(format_datetime),
            ],
        )?;
        Ok(())
    }

    pub fn pending_approval(&self, workflow_id: Uuid) -> Result<Option<ApprovalItem>, WorkflowError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM approvals
                     WHERE workflow_id = ?1 AND status = 'pending'
                     ORDER BY created_at DESC LIMIT 1",
                    APPROVAL_COLUMNS
                ),
                params![workflow_id.to_string()],
                ApprovalRow::from_row,
            )
            .optional()?;
        row.map(ApprovalRow::into_approval).transpose()
    }

    pub fn approval_for_action(
        &self,
        workflow_id: Uuid,
        action: GatedAction,
    ) -> Result<Option<ApprovalItem>, WorkflowError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM approvals
                     WHERE workflow_id = ?1 AND action = ?2
                     ORDER BY created_at DESC LIMIT 1",
                    APPROVAL_COLUMNS
                ),
                params![workflow_id.to_string(), action_label(action)],
                ApprovalRow::from_row,
            )
            .optional()?;
        row.map(ApprovalRow::into_approval).transpose()
    }

    pub fn resolve_approval(
        &self,
        approval_id: Uuid,
        status: ApprovalStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE approvals SET status = ?2, reason = ?3, resolved_at = ?4
             WHERE id = ?1 AND status = 'pending'",
            params![
                approval_id.to_string(),
                approval_status_label(status),
                reason,
                format_datetime(now),
            ],
        )?;
        Ok(())
    }

    pub fn record_escalation(
        &self,
        workflow_id: Uuid,
        kind: EscalationKind,
        detail: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO escalations (workflow_id, kind, detail, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                workflow_id.to_string(),
                escalation_kind_label(kind),
                detail,
                format_datetime(now),
            ],
        )?;
        Ok(())
    }

    pub fn escalations_for(&self, workflow_id: Uuid) -> Result<Vec<EscalationRecord>, WorkflowError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, workflow_id, kind, detail, created_at FROM escalations
             WHERE workflow_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![workflow_id.to_string()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut escalations = Vec::new();
        for row in rows {
            let (id, workflow_raw, kind_raw, detail, created_at_raw) = row?;
            escalations.push(EscalationRecord {
                id,
                workflow_id: Uuid::parse_str(&workflow_raw)?,
                kind: parse_escalation_kind(&kind_raw)?,
                detail,
                created_at: parse_datetime(&created_at_raw)?,
            });
        }
        Ok(escalations)
    }

    pub fn record_audit(
        &self,
        workflow_id: Uuid,
        event: &str,
        detail: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO audit_log (workflow_id, event, detail, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![workflow_id.to_string(), event, detail, format_datetime(now)],
        )?;
        Ok(())
    }

    pub fn audit_for(&self, workflow_id: Uuid) -> Result<Vec<AuditEntry>, WorkflowError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, workflow_id, event, detail, created_at FROM audit_log
             WHERE workflow_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![workflow_id.to_string()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, workflow_raw, event, detail, created_at_raw) = row?;
            entries.push(AuditEntry {
                id,
                workflow_id: Uuid::parse_str(&workflow_raw)?,
                event,
                detail,
                created_at: parse_datetime(&created_at_raw)?,
            });
        }
        Ok(entries)
    }
}
