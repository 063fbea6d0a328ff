pub mod approval;
pub mod effects;
pub mod eligibility;
pub mod events;
pub mod machine;
pub mod store;
pub mod strategy;
pub mod templates;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

pub use approval::{ApprovalItem, ApprovalStatus, GatedAction};
pub use effects::{
    DeliveryReceipt, DispatchError, Effects, EmailMessage, FulfillmentDispatch, ModuleEffects,
    NotificationDispatcher, RefundError, RefundProcessor, RefundRequest,
};
pub use eligibility::{EligibilityDecision, EligibilityEvaluator};
pub use events::{interpret_warehouse_reply, WarehouseDisposition};
pub use machine::{EngineOptions, SweepReport, WorkflowEngine};
pub use store::SqliteWorkflowStore;
pub use strategy::{
    CancelAttempt, CancelOrderRequest, CancelOutcome, FulfillmentStrategy, StrategyError,
};
pub use types::{
    AuditEntry, CancellationRequest, CancellationWorkflow, EscalationKind, EscalationRecord,
    FulfillmentConfig, FulfillmentMethod, WorkflowError, WorkflowStatus, WorkflowStep,
};
