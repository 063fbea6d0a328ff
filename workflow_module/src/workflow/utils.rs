use chrono::{DateTime, Utc};

use super::approval::{ApprovalStatus, GatedAction};
use super::types::{
    EscalationKind, FulfillmentMethod, WorkflowError, WorkflowStatus, WorkflowStep,
};

pub(crate) fn status_label(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Processing => "processing",
        WorkflowStatus::AwaitingWarehouse => "awaiting_warehouse",
        WorkflowStatus::Canceled => "canceled",
        WorkflowStatus::CannotCancel => "cannot_cancel",
        WorkflowStatus::Completed => "completed",
        WorkflowStatus::Failed => "failed",
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<WorkflowStatus, WorkflowError> {
    match raw {
        "processing" => Ok(WorkflowStatus::Processing),
        "awaiting_warehouse" => Ok(WorkflowStatus::AwaitingWarehouse),
        "canceled" => Ok(WorkflowStatus::Canceled),
        "cannot_cancel" => Ok(WorkflowStatus::CannotCancel),
        "completed" => Ok(WorkflowStatus::Completed),
        "failed" => Ok(WorkflowStatus::Failed),
        other => Err(WorkflowError::Storage(format!(
            "unknown workflow status {}",
            other
        ))),
    }
}

pub(crate) fn step_label(step: WorkflowStep) -> &'static str {
    match step {
        WorkflowStep::IdentifyOrder => "identify_order",
        WorkflowStep::CheckEligibility => "check_eligibility",
        WorkflowStep::AcknowledgeCustomer => "acknowledge_customer",
        WorkflowStep::EmailWarehouse => "email_warehouse",
        WorkflowStep::AwaitWarehouse => "await_warehouse",
        WorkflowStep::ProcessCancellation => "process_cancellation",
        WorkflowStep::ProcessResult => "process_result",
        WorkflowStep::Completed => "completed",
    }
}

pub(crate) fn parse_step(raw: &str) -> Result<WorkflowStep, WorkflowError> {
    match raw {
        "identify_order" => Ok(WorkflowStep::IdentifyOrder),
        "check_eligibility" => Ok(WorkflowStep::CheckEligibility),
        "acknowledge_customer" => Ok(WorkflowStep::AcknowledgeCustomer),
        "email_warehouse" => Ok(WorkflowStep::EmailWarehouse),
        "await_warehouse" => Ok(WorkflowStep::AwaitWarehouse),
        "process_cancellation" => Ok(WorkflowStep::ProcessCancellation),
        "process_result" => Ok(WorkflowStep::ProcessResult),
        "completed" => Ok(WorkflowStep::Completed),
        other => Err(WorkflowError::Storage(format!(
            "unknown workflow step {}",
            other
        ))),
    }
}

pub(crate) fn method_label(method: FulfillmentMethod) -> &'static str {
    match method {
        FulfillmentMethod::WarehouseEmail => "warehouse_email",
        FulfillmentMethod::ShipBob => "ship_bob",
        FulfillmentMethod::ShipStation => "ship_station",
        FulfillmentMethod::SelfFulfillment => "self_fulfillment",
    }
}

pub(crate) fn parse_method(raw: &str) -> Result<FulfillmentMethod, WorkflowError> {
    match raw {
        "warehouse_email" => Ok(FulfillmentMethod::WarehouseEmail),
        "ship_bob" => Ok(FulfillmentMethod::ShipBob),
        "ship_station" => Ok(FulfillmentMethod::ShipStation),
        "self_fulfillment" => Ok(FulfillmentMethod::SelfFulfillment),
        other => Err(WorkflowError::Storage(format!(
            "unknown fulfillment method {}",
            other
        ))),
    }
}

pub(crate) fn approval_status_label(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
    }
}

pub(crate) fn parse_approval_status(raw: &str) -> Result<ApprovalStatus, WorkflowError> {
    match raw {
        "pending" => Ok(ApprovalStatus::Pending),
        "approved" => Ok(ApprovalStatus::Approved),
        "rejected" => Ok(ApprovalStatus::Rejected),
        other => Err(WorkflowError::Storage(format!(
            "unknown approval status {}",
            other
        ))),
    }
}

pub(crate) fn action_label(action: GatedAction) -> &'static str {
    match action {
        GatedAction::EmailWarehouse => "email_warehouse",
        GatedAction::ProcessCancellation => "process_cancellation",
        GatedAction::Refund => "refund",
    }
}

pub(crate) fn parse_action(raw: &str) -> Result<GatedAction, WorkflowError> {
    match raw {
        "email_warehouse" => Ok(GatedAction::EmailWarehouse),
        "process_cancellation" => Ok(GatedAction::ProcessCancellation),
        "refund" => Ok(GatedAction::Refund),
        other => Err(WorkflowError::Storage(format!(
            "unknown gated action {}",
            other
        ))),
    }
}

pub(crate) fn escalation_kind_label(kind: EscalationKind) -> &'static str {
    match kind {
        EscalationKind::WarehouseTimeout => "warehouse_timeout",
        EscalationKind::WorkflowFailed => "workflow_failed",
        EscalationKind::RefundReconciliation => "refund_reconciliation",
    }
}

pub(crate) fn parse_escalation_kind(raw: &str) -> Result<EscalationKind, WorkflowError> {
    match raw {
        "warehouse_timeout" => Ok(EscalationKind::WarehouseTimeout),
        "workflow_failed" => Ok(EscalationKind::WorkflowFailed),
        "refund_reconciliation" => Ok(EscalationKind::RefundReconciliation),
        other => Err(WorkflowError::Storage(format!(
            "unknown escalation kind {}",
            other
        ))),
    }
}

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, WorkflowError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub(crate) fn parse_optional_datetime(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, WorkflowError> {
    match value {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn optional_bool_to_int(value: Option<bool>) -> Option<i64> {
    value.map(bool_to_int)
}

pub(crate) fn int_to_optional_bool(value: Option<i64>) -> Option<bool> {
    value.map(|raw| raw != 0)
}
