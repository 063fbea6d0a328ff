use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::approval::{ApprovalItem, ApprovalStatus, GatedAction};
use super::effects::{Effects, EmailMessage, RefundRequest};
use super::eligibility::EligibilityEvaluator;
use super::events::{interpret_warehouse_reply, WarehouseDisposition};
use super::store::SqliteWorkflowStore;
use super::strategy::CancelOutcome;
use super::templates;
use super::types::{
    CancellationRequest, CancellationWorkflow, EscalationKind, FulfillmentConfig,
    FulfillmentMethod, WorkflowError, WorkflowStatus, WorkflowStep, CANCEL_RETRY_LIMIT,
    WAREHOUSE_REPLY_SLA_HOURS,
};
use super::utils::action_label;

const ACK_EMAIL_EFFECT: &str = "ack_email";
const WAREHOUSE_EMAIL_EFFECT: &str = "warehouse_email";
const REFUND_EFFECT: &str = "refund";
const RESULT_EMAIL_EFFECT: &str = "result_email";

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub warehouse_reply_sla: Duration,
    pub cancel_retry_limit: u32,
    pub cancel_retry_base_delay: std::time::Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            warehouse_reply_sla: Duration::hours(WAREHOUSE_REPLY_SLA_HOURS),
            cancel_retry_limit: CANCEL_RETRY_LIMIT,
            cancel_retry_base_delay: std::time::Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub advanced: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

enum GateCheck {
    Clear,
    Parked,
    Rejected(String),
}

enum SendOnce {
    Sent,
    AlreadySent,
    Deferred,
    Failed,
}

/// Drives one workflow at a time through its step sequence. Holds no
/// in-memory workflow state: every entry point reloads from the store, so
/// the engine survives restarts and tolerates duplicate event delivery.
pub struct WorkflowEngine<E: Effects> {
    store: SqliteWorkflowStore,
    effects: E,
    options: EngineOptions,
}

impl<E: Effects> WorkflowEngine<E> {
    pub fn new(
        storage_path: impl Into<PathBuf>,
        effects: E,
        options: EngineOptions,
    ) -> Result<Self, WorkflowError> {
        let store = SqliteWorkflowStore::new(storage_path.into())?;
        Ok(Self {
            store,
            effects,
            options,
        })
    }

    pub fn store(&self) -> &SqliteWorkflowStore {
        &self.store
    }

    /// Creates the workflow from a classified cancellation intent plus the
    /// merchant's config snapshot, then drives it as far as it can go.
    pub fn create_workflow(
        &self,
        request: CancellationRequest,
        config: FulfillmentConfig,
        now: DateTime<Utc>,
    ) -> Result<CancellationWorkflow, WorkflowError> {
        let workflow = CancellationWorkflow {
            id: Uuid::new_v4(),
            order_number: request.order_number,
            order_total_cents: request.order_total_cents,
            customer_email: request.customer_email,
            fulfillment_method: config.method,
            status: WorkflowStatus::Processing,
            step: WorkflowStep::IdentifyOrder,
            eligible: None,
            eligibility_reason: None,
            eligibility_deadline: None,
            warehouse_reply_received: false,
            warehouse_reply: None,
            was_canceled: None,
            refund_processed: false,
            refund_amount_cents: None,
            customer_acknowledgment_sent: false,
            needs_reconciliation: false,
            failure_reason: None,
            order_created_at: request.order_created_at,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_workflow(&workflow, &config)?;
        self.store.record_audit(
            workflow.id,
            "workflow_created",
            Some(&format!("order {}", workflow.order_number)),
            now,
        )?;
        info!(
            "created cancellation workflow {} for order {}",
            workflow.id, workflow.order_number
        );
        self.advance(workflow.id, now)
    }

    /// Runs step handlers until the workflow parks (awaiting a reply or an
    /// approval) or reaches a terminal status. Safe to call repeatedly.
    pub fn advance(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CancellationWorkflow, WorkflowError> {
        loop {
            let workflow = self.store.load_workflow(id)?;
            if workflow.status.is_terminal() {
                return Ok(workflow);
            }
            let config = self.store.load_config(id)?;
            let progressed = match workflow.step {
                WorkflowStep::IdentifyOrder => self.handle_identify(workflow, now)?,
                WorkflowStep::CheckEligibility => self.handle_eligibility(workflow, &config, now)?,
                WorkflowStep::AcknowledgeCustomer => {
                    self.handle_acknowledge(workflow, &config, now)?
                }
                WorkflowStep::EmailWarehouse => {
                    self.handle_email_warehouse(workflow, &config, now)?
                }
                // Advanced only by an inbound reply or the timeout sweep.
                WorkflowStep::AwaitWarehouse => false,
                WorkflowStep::ProcessCancellation => {
                    self.handle_process_cancellation(workflow, &config, now)?
                }
                WorkflowStep::ProcessResult => self.handle_process_result(workflow, &config, now)?,
                WorkflowStep::Completed => false,
            };
            if !progressed {
                return self.store.load_workflow(id);
            }
        }
    }

    /// Inbound warehouse-reply event. Duplicates and out-of-state replies
    /// are audited no-ops.
    pub fn record_warehouse_reply(
        &self,
        id: Uuid,
        reply: &str,
        now: DateTime<Utc>,
    ) -> Result<CancellationWorkflow, WorkflowError> {
        let mut workflow = self.store.load_workflow(id)?;
        if workflow.status.is_terminal()
            || workflow.warehouse_reply_received
            || workflow.step != WorkflowStep::AwaitWarehouse
        {
            self.store.record_audit(
                id,
                "warehouse_reply_ignored",
                Some("duplicate or out-of-state reply"),
                now,
            )?;
            return Ok(workflow);
        }

        let disposition = interpret_warehouse_reply(reply);
        let canceled = disposition == WarehouseDisposition::Accepted;
        if self.store.set_outcome_once(id, canceled, now)? {
            workflow.was_canceled = Some(canceled);
        }
        workflow.warehouse_reply_received = true;
        workflow.warehouse_reply = Some(reply.to_string());
        workflow.status = WorkflowStatus::Processing;
        workflow.step = WorkflowStep::ProcessResult;
        workflow.updated_at = now;
        if !self.store.update_workflow(&workflow)? {
            // Lost the race against the sweep or an operator; the reply
            // arrived for a row that just went terminal.
            self.store.record_audit(
                id,
                "warehouse_reply_ignored",
                Some("workflow already terminal"),
                now,
            )?;
            return self.store.load_workflow(id);
        }
        self.store.record_audit(
            id,
            "warehouse_reply_received",
            Some(if canceled { "accepted" } else { "declined" }),
            now,
        )?;
        self.advance(id, now)
    }

    /// Approval decision from the human-review surface. Resolving with no
    /// pending item is a no-op; approval resumes exactly at the paused step.
    pub fn resolve_approval(
        &self,
        workflow_id: Uuid,
        approved: bool,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CancellationWorkflow, WorkflowError> {
        let workflow = self.store.load_workflow(workflow_id)?;
        let item = match self.store.pending_approval(workflow_id)? {
            Some(item) => item,
            None => {
                self.store.record_audit(
                    workflow_id,
                    "approval_ignored",
                    Some("no pending approval"),
                    now,
                )?;
                return Ok(workflow);
            }
        };

        let status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        self.store.resolve_approval(item.id, status, reason, now)?;
        self.store.record_audit(
            workflow_id,
            "approval_resolved",
            Some(&format!(
                "{} {}",
                action_label(item.action),
                if approved { "approved" } else { "rejected" }
            )),
            now,
        )?;

        if approved {
            self.advance(workflow_id, now)
        } else {
            let reason = reason.unwrap_or("no reason given");
            self.fail(
                workflow_id,
                &format!("approval rejected: {}", reason),
                None,
                now,
            )?;
            self.store.load_workflow(workflow_id)
        }
    }

    /// Periodic pass over non-terminal workflows: times out stale warehouse
    /// waits and re-drives anything that parked on a transient condition.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let mut report = SweepReport::default();
        for workflow in self.store.list_non_terminal()? {
            if workflow.step == WorkflowStep::AwaitWarehouse {
                let waited = now - workflow.updated_at;
                if waited > self.options.warehouse_reply_sla {
                    warn!(
                        "workflow {} breached the {}h warehouse-reply SLA",
                        workflow.id,
                        self.options.warehouse_reply_sla.num_hours()
                    );
                    self.fail(
                        workflow.id,
                        &format!(
                            "no warehouse reply within {} hours",
                            self.options.warehouse_reply_sla.num_hours()
                        ),
                        Some(EscalationKind::WarehouseTimeout),
                        now,
                    )?;
                    report.timed_out += 1;
                } else {
                    report.skipped += 1;
                }
                continue;
            }

            if self.store.pending_approval(workflow.id)?.is_some() {
                report.skipped += 1;
                continue;
            }

            let before = (workflow.status, workflow.step);
            let after = self.advance(workflow.id, now)?;
            if (after.status, after.step) != before {
                report.advanced += 1;
            } else {
                report.skipped += 1;
            }
        }
        Ok(report)
    }

    fn handle_identify(
        &self,
        mut workflow: CancellationWorkflow,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        // The classification collaborator already resolved the order; this
        // step just pins the snapshot into the audit trail.
        self.store.record_audit(
            workflow.id,
            "order_identified",
            Some(&format!(
                "order {} total {} cents",
                workflow.order_number, workflow.order_total_cents
            )),
            now,
        )?;
        workflow.step = WorkflowStep::CheckEligibility;
        workflow.updated_at = now;
        self.store.update_workflow(&workflow)
    }

    fn handle_eligibility(
        &self,
        mut workflow: CancellationWorkflow,
        config: &FulfillmentConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        let evaluator = EligibilityEvaluator::new(config.store_utc_offset_minutes);
        let decision = evaluator.evaluate(workflow.order_created_at, now);
        self.store.record_audit(
            workflow.id,
            "eligibility_checked",
            Some(&format!(
                "eligible={} deadline={}",
                decision.eligible,
                decision.deadline.to_rfc3339()
            )),
            now,
        )?;
        workflow.eligible = Some(decision.eligible);
        workflow.eligibility_reason = Some(decision.reason);
        workflow.eligibility_deadline = Some(decision.deadline);
        workflow.step = WorkflowStep::AcknowledgeCustomer;
        workflow.updated_at = now;
        self.store.update_workflow(&workflow)
    }

    fn handle_acknowledge(
        &self,
        mut workflow: CancellationWorkflow,
        _config: &FulfillmentConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        let eligible = workflow.eligible.unwrap_or(false);
        let message = if eligible {
            templates::acknowledgment_email(&workflow)
        } else {
            templates::too_late_email(&workflow)
        };
        match self.send_once(&workflow, ACK_EMAIL_EFFECT, &message, now)? {
            SendOnce::Deferred => return Ok(false),
            SendOnce::Failed => return Ok(true),
            SendOnce::Sent | SendOnce::AlreadySent => {}
        }

        workflow.customer_acknowledgment_sent = true;
        if eligible {
            workflow.step = match workflow.fulfillment_method {
                FulfillmentMethod::WarehouseEmail => WorkflowStep::EmailWarehouse,
                _ => WorkflowStep::ProcessCancellation,
            };
        } else {
            // The eligibility short-circuit: no warehouse or API interaction,
            // straight to a terminal cannot_cancel.
            if self.store.set_outcome_once(workflow.id, false, now)? {
                workflow.was_canceled = Some(false);
            }
            workflow.status = WorkflowStatus::CannotCancel;
            workflow.step = WorkflowStep::Completed;
            self.store.record_audit(
                workflow.id,
                "workflow_closed_ineligible",
                workflow.eligibility_reason.as_deref(),
                now,
            )?;
        }
        workflow.updated_at = now;
        self.store.update_workflow(&workflow)
    }

    fn handle_email_warehouse(
        &self,
        mut workflow: CancellationWorkflow,
        config: &FulfillmentConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        match self.check_gate(&workflow, config, GatedAction::EmailWarehouse, now)? {
            GateCheck::Parked => return Ok(false),
            GateCheck::Rejected(reason) => {
                self.fail(workflow.id, &reason, None, now)?;
                return Ok(true);
            }
            GateCheck::Clear => {}
        }

        let warehouse_to = match config.warehouse_email.as_deref() {
            Some(address) => address,
            None => {
                self.fail(
                    workflow.id,
                    "fulfillment config has no warehouse email",
                    Some(EscalationKind::WorkflowFailed),
                    now,
                )?;
                return Ok(true);
            }
        };
        let message = templates::warehouse_request_email(&workflow, warehouse_to);
        match self.send_once(&workflow, WAREHOUSE_EMAIL_EFFECT, &message, now)? {
            SendOnce::Deferred => return Ok(false),
            SendOnce::Failed => return Ok(true),
            SendOnce::Sent | SendOnce::AlreadySent => {}
        }

        workflow.status = WorkflowStatus::AwaitingWarehouse;
        workflow.step = WorkflowStep::AwaitWarehouse;
        workflow.updated_at = now;
        if !self.store.update_workflow(&workflow)? {
            return Ok(false);
        }
        self.store
            .record_audit(workflow.id, "warehouse_emailed", Some(warehouse_to), now)?;
        Ok(true)
    }

    fn handle_process_cancellation(
        &self,
        mut workflow: CancellationWorkflow,
        config: &FulfillmentConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        match self.check_gate(&workflow, config, GatedAction::ProcessCancellation, now)? {
            GateCheck::Parked => return Ok(false),
            GateCheck::Rejected(reason) => {
                self.fail(workflow.id, &reason, None, now)?;
                return Ok(true);
            }
            GateCheck::Clear => {}
        }

        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            match self.effects.attempt_cancel(&workflow, config) {
                Ok(outcome) => break Ok(outcome),
                Err(err) if err.is_transient() && attempt < self.options.cancel_retry_limit => {
                    warn!(
                        "cancel attempt {} for workflow {} failed: {}",
                        attempt, workflow.id, err
                    );
                    self.store.record_audit(
                        workflow.id,
                        "cancel_attempt_retried",
                        Some(&err.to_string()),
                        now,
                    )?;
                    std::thread::sleep(
                        self.options.cancel_retry_base_delay * 2u32.saturating_pow(attempt - 1),
                    );
                }
                Err(err) => break Err(err),
            }
        };

        match result {
            Ok(cancel) if cancel.outcome == CancelOutcome::Pending => {
                // Only the warehouse-email variant may report pending, and
                // that path never reaches this step.
                self.fail(
                    workflow.id,
                    "automated fulfillment backend returned a pending outcome",
                    Some(EscalationKind::WorkflowFailed),
                    now,
                )?;
                Ok(true)
            }
            Ok(cancel) => {
                let canceled = cancel.outcome == CancelOutcome::Canceled;
                if self.store.set_outcome_once(workflow.id, canceled, now)? {
                    workflow.was_canceled = Some(canceled);
                }
                workflow.step = WorkflowStep::ProcessResult;
                workflow.updated_at = now;
                if !self.store.update_workflow(&workflow)? {
                    return Ok(false);
                }
                self.store.record_audit(
                    workflow.id,
                    "cancellation_attempted",
                    Some(&format!(
                        "outcome={} detail={}",
                        if canceled { "canceled" } else { "cannot_cancel" },
                        cancel.detail.as_deref().unwrap_or("-")
                    )),
                    now,
                )?;
                Ok(true)
            }
            Err(err) => {
                self.fail(
                    workflow.id,
                    &format!("cancellation failed after {} attempt(s): {}", attempt, err),
                    Some(EscalationKind::WorkflowFailed),
                    now,
                )?;
                Ok(true)
            }
        }
    }

    fn handle_process_result(
        &self,
        mut workflow: CancellationWorkflow,
        config: &FulfillmentConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        let canceled = workflow.was_canceled.unwrap_or(false);
        if canceled {
            match self.check_gate(&workflow, config, GatedAction::Refund, now)? {
                GateCheck::Parked => return Ok(false),
                GateCheck::Rejected(reason) => {
                    self.fail(workflow.id, &reason, None, now)?;
                    return Ok(true);
                }
                GateCheck::Clear => {}
            }

            if self.store.claim_side_effect(workflow.id, REFUND_EFFECT, now)? {
                let request = RefundRequest {
                    order_number: workflow.order_number.clone(),
                    amount_cents: workflow.order_total_cents,
                    idempotency_key: workflow.id.to_string(),
                };
                match self.effects.process_refund(&request) {
                    Ok(()) => {
                        workflow.refund_processed = true;
                        workflow.refund_amount_cents = Some(workflow.order_total_cents);
                        self.store.record_audit(
                            workflow.id,
                            "refund_processed",
                            Some(&format!("{} cents", workflow.order_total_cents)),
                            now,
                        )?;
                    }
                    Err(err) => {
                        // The cancellation stands; the refund goes to the
                        // manual reconciliation queue instead of rolling back.
                        warn!("refund for workflow {} failed: {}", workflow.id, err);
                        workflow.refund_processed = false;
                        workflow.needs_reconciliation = true;
                        self.store.record_escalation(
                            workflow.id,
                            EscalationKind::RefundReconciliation,
                            Some(&err.to_string()),
                            now,
                        )?;
                        self.store.record_audit(
                            workflow.id,
                            "refund_failed",
                            Some(&err.to_string()),
                            now,
                        )?;
                    }
                }
                workflow.updated_at = now;
                if !self.store.update_workflow(&workflow)? {
                    return Ok(false);
                }
            }

            let message = templates::confirmation_email(&workflow);
            match self.send_once(&workflow, RESULT_EMAIL_EFFECT, &message, now)? {
                SendOnce::Deferred => return Ok(false),
                SendOnce::Failed => return Ok(true),
                SendOnce::Sent | SendOnce::AlreadySent => {}
            }

            workflow.status = match workflow.fulfillment_method {
                FulfillmentMethod::WarehouseEmail => WorkflowStatus::Canceled,
                _ => WorkflowStatus::Completed,
            };
        } else {
            let message = templates::declined_email(&workflow);
            match self.send_once(&workflow, RESULT_EMAIL_EFFECT, &message, now)? {
                SendOnce::Deferred => return Ok(false),
                SendOnce::Failed => return Ok(true),
                SendOnce::Sent | SendOnce::AlreadySent => {}
            }
            workflow.status = WorkflowStatus::CannotCancel;
        }

        workflow.step = WorkflowStep::Completed;
        workflow.updated_at = now;
        if !self.store.update_workflow(&workflow)? {
            return Ok(false);
        }
        self.store.record_audit(
            workflow.id,
            "workflow_closed",
            Some(if canceled { "canceled" } else { "cannot_cancel" }),
            now,
        )?;
        info!(
            "workflow {} closed with status {:?}",
            workflow.id, workflow.status
        );
        Ok(true)
    }

    /// Pauses a mutating step behind the human checkpoint when the merchant
    /// requires approval. Creates at most one pending item per workflow.
    fn check_gate(
        &self,
        workflow: &CancellationWorkflow,
        config: &FulfillmentConfig,
        action: GatedAction,
        now: DateTime<Utc>,
    ) -> Result<GateCheck, WorkflowError> {
        if !config.require_approval {
            return Ok(GateCheck::Clear);
        }
        match self.store.approval_for_action(workflow.id, action)? {
            Some(item) => match item.status {
                ApprovalStatus::Approved => Ok(GateCheck::Clear),
                ApprovalStatus::Rejected => Ok(GateCheck::Rejected(format!(
                    "approval rejected: {}",
                    item.reason.as_deref().unwrap_or("no reason given")
                ))),
                ApprovalStatus::Pending => Ok(GateCheck::Parked),
            },
            None => {
                if self.store.pending_approval(workflow.id)?.is_none() {
                    let metadata = serde_json::json!({
                        "order_number": workflow.order_number,
                        "order_total_cents": workflow.order_total_cents,
                        "eligible": workflow.eligible,
                        "eligibility_reason": workflow.eligibility_reason,
                        "eligibility_deadline": workflow.eligibility_deadline,
                    });
                    let proposed = match action {
                        GatedAction::EmailWarehouse => format!(
                            "Email the warehouse to cancel order {}",
                            workflow.order_number
                        ),
                        GatedAction::ProcessCancellation => format!(
                            "Cancel order {} via the fulfillment API",
                            workflow.order_number
                        ),
                        GatedAction::Refund => format!(
                            "Refund order {} in full",
                            workflow.order_number
                        ),
                    };
                    let item =
                        ApprovalItem::pending(workflow.id, action, proposed, metadata, now);
                    self.store.insert_approval(&item)?;
                    self.store.record_audit(
                        workflow.id,
                        "approval_requested",
                        Some(action_label(action)),
                        now,
                    )?;
                }
                Ok(GateCheck::Parked)
            }
        }
    }

    /// Sends an email at most once per (workflow, effect). A retryable
    /// delivery failure releases the claim so the sweep can retry; a
    /// permanent failure fails the workflow.
    fn send_once(
        &self,
        workflow: &CancellationWorkflow,
        effect: &str,
        message: &EmailMessage,
        now: DateTime<Utc>,
    ) -> Result<SendOnce, WorkflowError> {
        if !self.store.claim_side_effect(workflow.id, effect, now)? {
            return Ok(SendOnce::AlreadySent);
        }
        match self.effects.send_email(message) {
            Ok(receipt) => {
                self.store.record_audit(
                    workflow.id,
                    "email_sent",
                    Some(&format!(
                        "{} -> {} ({})",
                        effect,
                        message.to,
                        receipt.message_id.as_deref().unwrap_or("-")
                    )),
                    now,
                )?;
                Ok(SendOnce::Sent)
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    "email {} for workflow {} deferred: {}",
                    effect, workflow.id, err
                );
                self.store.release_side_effect(workflow.id, effect)?;
                self.store.record_audit(
                    workflow.id,
                    "email_deferred",
                    Some(&err.to_string()),
                    now,
                )?;
                Ok(SendOnce::Deferred)
            }
            Err(err) => {
                self.fail(
                    workflow.id,
                    &format!("email delivery failed: {}", err),
                    Some(EscalationKind::WorkflowFailed),
                    now,
                )?;
                Ok(SendOnce::Failed)
            }
        }
    }

    /// Moves a workflow to `failed`. An approval rejection is an expected
    /// outcome rather than a system fault, so those callers pass no
    /// escalation kind and only the audit trail records the close.
    fn fail(
        &self,
        id: Uuid,
        reason: &str,
        kind: Option<EscalationKind>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let mut workflow = self.store.load_workflow(id)?;
        if workflow.status.is_terminal() {
            return Ok(());
        }
        workflow.status = WorkflowStatus::Failed;
        workflow.failure_reason = Some(reason.to_string());
        workflow.updated_at = now;
        if !self.store.update_workflow(&workflow)? {
            return Ok(());
        }
        if let Some(kind) = kind {
            self.store.record_escalation(id, kind, Some(reason), now)?;
        }
        self.store.record_audit(id, "workflow_failed", Some(reason), now)?;
        error!("workflow {} failed: {}", id, reason);
        Ok(())
    }
}
