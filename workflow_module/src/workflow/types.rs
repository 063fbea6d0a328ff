use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub(crate) const CANCEL_RETRY_LIMIT: u32 = 3;
pub(crate) const WAREHOUSE_REPLY_SLA_HOURS: i64 = 8;

/// How the merchant ships orders; fixed at workflow creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMethod {
    WarehouseEmail,
    ShipBob,
    ShipStation,
    SelfFulfillment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Processing,
    AwaitingWarehouse,
    Canceled,
    CannotCancel,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Canceled
                | WorkflowStatus::CannotCancel
                | WorkflowStatus::Completed
                | WorkflowStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    IdentifyOrder,
    CheckEligibility,
    AcknowledgeCustomer,
    EmailWarehouse,
    AwaitWarehouse,
    ProcessCancellation,
    ProcessResult,
    Completed,
}

/// Durable per-request aggregate driven by the state machine. Mutated only by
/// step handlers, frozen once `status` is terminal, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationWorkflow {
    pub id: Uuid,
    pub order_number: String,
    pub order_total_cents: i64,
    pub customer_email: String,
    pub fulfillment_method: FulfillmentMethod,
    pub status: WorkflowStatus,
    pub step: WorkflowStep,
    pub eligible: Option<bool>,
    pub eligibility_reason: Option<String>,
    pub eligibility_deadline: Option<DateTime<Utc>>,
    pub warehouse_reply_received: bool,
    pub warehouse_reply: Option<String>,
    /// None until a terminal outcome is known; written exactly once.
    pub was_canceled: Option<bool>,
    pub refund_processed: bool,
    pub refund_amount_cents: Option<i64>,
    pub customer_acknowledgment_sent: bool,
    pub needs_reconciliation: bool,
    pub failure_reason: Option<String>,
    pub order_created_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inbound cancellation intent, produced by the email-classification
/// collaborator after it has resolved the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub order_number: String,
    pub order_total_cents: i64,
    pub customer_email: String,
    pub order_created_at: DateTime<Utc>,
}

/// Immutable snapshot of the merchant's fulfillment settings, captured at
/// workflow creation. Never re-read mid-workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentConfig {
    pub method: FulfillmentMethod,
    #[serde(default)]
    pub warehouse_email: Option<String>,
    #[serde(default)]
    pub shipbob_token: Option<String>,
    #[serde(default)]
    pub shipstation_api_key: Option<String>,
    #[serde(default)]
    pub shipstation_api_secret: Option<String>,
    #[serde(default)]
    pub require_approval: bool,
    /// Store-local timezone as minutes east of UTC; eligibility is evaluated
    /// in store time.
    #[serde(default)]
    pub store_utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    WarehouseTimeout,
    WorkflowFailed,
    RefundReconciliation,
}

/// Human-follow-up queue entry raised for timeouts, failures, and refund
/// reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: i64,
    pub workflow_id: Uuid,
    pub kind: EscalationKind,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub workflow_id: Uuid,
    pub event: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("uuid parse error: {0}")]
    UuidParse(#[from] uuid::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("workflow {0} not found")]
    NotFound(Uuid),
}
