use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order snapshot from the commerce platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_number: String,
    pub total_cents: i64,
    pub customer_email: Option<String>,
    pub financial_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a fulfillment backend said when asked to cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCancelResult {
    Canceled,
    CannotCancel { detail: String },
}

#[derive(Debug, Clone)]
pub struct RefundParams {
    pub order_number: String,
    pub amount_cents: i64,
    /// Forwarded as an Idempotency-Key header so a retried call cannot
    /// double-refund.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount_cents: i64,
}
