use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mutating steps that pause behind the human checkpoint when the merchant
/// requires approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatedAction {
    EmailWarehouse,
    ProcessCancellation,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Snapshot handed to the human-review surface. At most one pending item
/// exists per workflow at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalItem {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub action: GatedAction,
    pub proposed_action: String,
    pub metadata: serde_json::Value,
    pub status: ApprovalStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalItem {
    pub(crate) fn pending(
        workflow_id: Uuid,
        action: GatedAction,
        proposed_action: String,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            action,
            proposed_action,
            metadata,
            status: ApprovalStatus::Pending,
            reason: None,
            created_at: now,
            resolved_at: None,
        }
    }
}
