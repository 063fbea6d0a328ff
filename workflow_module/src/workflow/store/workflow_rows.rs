use rusqlite::Row;
use uuid::Uuid;

use super::super::approval::ApprovalItem;
use super::super::types::{CancellationWorkflow, FulfillmentConfig, WorkflowError};
use super::super::utils::{
    int_to_optional_bool, parse_action, parse_approval_status, parse_datetime, parse_method,
    parse_optional_datetime, parse_status, parse_step,
};

pub(super) const WORKFLOW_COLUMNS: &str = "id, order_number, order_total_cents, customer_email, \
     fulfillment_method, status, step, eligible, eligibility_reason, eligibility_deadline, \
     warehouse_reply_received, warehouse_reply, was_canceled, refund_processed, \
     refund_amount_cents, customer_acknowledgment_sent, needs_reconciliation, failure_reason, \
     order_created_at, created_at, updated_at";

pub(super) const APPROVAL_COLUMNS: &str =
    "id, workflow_id, action, proposed_action, metadata, status, reason, created_at, resolved_at";

/// Raw sqlite row; converted outside the rusqlite closure so parse errors
/// surface as WorkflowError.
pub(super) struct WorkflowRow {
    id: String,
    order_number: String,
    order_total_cents: i64,
    customer_email: String,
    fulfillment_method: String,
    status: String,
    step: String,
    eligible: Option<i64>,
    eligibility_reason: Option<String>,
    eligibility_deadline: Option<String>,
    warehouse_reply_received: i64,
    warehouse_reply: Option<String>,
    was_canceled: Option<i64>,
    refund_processed: i64,
    refund_amount_cents: Option<i64>,
    customer_acknowledgment_sent: i64,
    needs_reconciliation: i64,
    failure_reason: Option<String>,
    order_created_at: String,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            order_number: row.get(1)?,
            order_total_cents: row.get(2)?,
            customer_email: row.get(3)?,
            fulfillment_method: row.get(4)?,
            status: row.get(5)?,
            step: row.get(6)?,
            eligible: row.get(7)?,
            eligibility_reason: row.get(8)?,
            eligibility_deadline: row.get(9)?,
            warehouse_reply_received: row.get(10)?,
            warehouse_reply: row.get(11)?,
            was_canceled: row.get(12)?,
            refund_processed: row.get(13)?,
            refund_amount_cents: row.get(14)?,
            customer_acknowledgment_sent: row.get(15)?,
            needs_reconciliation: row.get(16)?,
            failure_reason: row.get(17)?,
            order_created_at: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }

    pub(super) fn into_workflow(self) -> Result<CancellationWorkflow, WorkflowError> {
        Ok(CancellationWorkflow {
            id: Uuid::parse_str(&self.id)?,
            order_number: self.order_number,
            order_total_cents: self.order_total_cents,
            customer_email: self.customer_email,
            fulfillment_method: parse_method(&self.fulfillment_method)?,
            status: parse_status(&self.status)?,
            step: parse_step(&self.step)?,
            eligible: int_to_optional_bool(self.eligible),
            eligibility_reason: self.eligibility_reason,
            eligibility_deadline: parse_optional_datetime(self.eligibility_deadline.as_deref())?,
            warehouse_reply_received: self.warehouse_reply_received != 0,
            warehouse_reply: self.warehouse_reply,
            was_canceled: int_to_optional_bool(self.was_canceled),
            refund_processed: self.refund_processed != 0,
            refund_amount_cents: self.refund_amount_cents,
            customer_acknowledgment_sent: self.customer_acknowledgment_sent != 0,
            needs_reconciliation: self.needs_reconciliation != 0,
            failure_reason: self.failure_reason,
            order_created_at: parse_datetime(&self.order_created_at)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

pub(super) struct ConfigRow {
    method: String,
    warehouse_email: Option<String>,
    shipbob_token: Option<String>,
    shipstation_api_key: Option<String>,
    shipstation_api_secret: Option<String>,
    require_approval: i64,
    store_utc_offset_minutes: i64,
}

impl ConfigRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            method: row.get(0)?,
            warehouse_email: row.get(1)?,
            shipbob_token: row.get(2)?,
            shipstation_api_key: row.get(3)?,
            shipstation_api_secret: row.get(4)?,
            require_approval: row.get(5)?,
            store_utc_offset_minutes: row.get(6)?,
        })
    }

    pub(super) fn into_config(self) -> Result<FulfillmentConfig, WorkflowError> {
        Ok(FulfillmentConfig {
            method: parse_method(&self.method)?,
            warehouse_email: self.warehouse_email,
            shipbob_token: self.shipbob_token,
            shipstation_api_key: self.shipstation_api_key,
            shipstation_api_secret: self.shipstation_api_secret,
            require_approval: self.require_approval != 0,
            store_utc_offset_minutes: self.store_utc_offset_minutes as i32,
        })
    }
}

pub(super) struct ApprovalRow {
    id: String,
    workflow_id: String,
    action: String,
    proposed_action: String,
    metadata: String,
    status: String,
    reason: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl ApprovalRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            action: row.get(2)?,
            proposed_action: row.get(3)?,
            metadata: row.get(4)?,
            status: row.get(5)?,
            reason: row.get(6)?,
            created_at: row.get(7)?,
            resolved_at: row.get(8)?,
        })
    }

    pub(super) fn into_approval(self) -> Result<ApprovalItem, WorkflowError> {
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|err| WorkflowError::Storage(format!("bad approval metadata: {}", err)))?;
        Ok(ApprovalItem {
            id: Uuid::parse_str(&self.id)?,
            workflow_id: Uuid::parse_str(&self.workflow_id)?,
            action: parse_action(&self.action)?,
            proposed_action: self.proposed_action,
            metadata,
            status: parse_approval_status(&self.status)?,
            reason: self.reason,
            created_at: parse_datetime(&self.created_at)?,
            resolved_at: parse_optional_datetime(self.resolved_at.as_deref())?,
        })
    }
}
