use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use super::effects::{
    DeliveryReceipt, DispatchError, EmailMessage, FulfillmentDispatch, NotificationDispatcher,
    RefundError, RefundProcessor, RefundRequest,
};
use super::eligibility::EligibilityEvaluator;
use super::events::{interpret_warehouse_reply, WarehouseDisposition};
use super::machine::{EngineOptions, WorkflowEngine};
use super::strategy::{CancelAttempt, CancelOutcome, StrategyError};
use super::types::{
    CancellationRequest, CancellationWorkflow, EscalationKind, FulfillmentConfig,
    FulfillmentMethod, WorkflowStatus, WorkflowStep,
};

/// Scripted collaborator bundle: records every outbound call and plays back
/// queued failures.
#[derive(Default)]
struct ScriptedEffects {
    sent: Mutex<Vec<EmailMessage>>,
    email_errors: Mutex<VecDeque<DispatchError>>,
    refunds: Mutex<Vec<RefundRequest>>,
    refund_error: Mutex<Option<String>>,
    cancel_script: Mutex<VecDeque<Result<CancelAttempt, StrategyError>>>,
    cancel_calls: Mutex<u32>,
}

impl ScriptedEffects {
    fn sent_subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|message| message.subject.clone())
            .collect()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }

    fn push_email_error(&self, error: DispatchError) {
        self.email_errors.lock().expect("email lock").push_back(error);
    }

    fn script_cancel(&self, results: Vec<Result<CancelAttempt, StrategyError>>) {
        *self.cancel_script.lock().expect("cancel lock") = results.into();
    }

    fn fail_refunds(&self, message: &str) {
        *self.refund_error.lock().expect("refund lock") = Some(message.to_string());
    }

    fn refund_count(&self) -> usize {
        self.refunds.lock().expect("refunds lock").len()
    }

    fn cancel_calls(&self) -> u32 {
        *self.cancel_calls.lock().expect("calls lock")
    }
}

impl NotificationDispatcher for &ScriptedEffects {
    fn send_email(&self, message: &EmailMessage) -> Result<DeliveryReceipt, DispatchError> {
        if let Some(error) = self.email_errors.lock().expect("email lock").pop_front() {
            return Err(error);
        }
        self.sent.lock().expect("sent lock").push(message.clone());
        Ok(DeliveryReceipt {
            message_id: Some(format!("mid-{}", self.sent_count())),
        })
    }
}

impl RefundProcessor for &ScriptedEffects {
    fn process_refund(&self, request: &RefundRequest) -> Result<(), RefundError> {
        if let Some(message) = self.refund_error.lock().expect("refund lock").clone() {
            return Err(RefundError::Failed(message));
        }
        self.refunds.lock().expect("refunds lock").push(request.clone());
        Ok(())
    }
}

impl FulfillmentDispatch for &ScriptedEffects {
    fn attempt_cancel(
        &self,
        _workflow: &CancellationWorkflow,
        _config: &FulfillmentConfig,
    ) -> Result<CancelAttempt, StrategyError> {
        *self.cancel_calls.lock().expect("calls lock") += 1;
        match self.cancel_script.lock().expect("cancel lock").pop_front() {
            Some(result) => result,
            None => Ok(CancelAttempt {
                outcome: CancelOutcome::Canceled,
                detail: None,
            }),
        }
    }
}

fn test_options() -> EngineOptions {
    EngineOptions {
        warehouse_reply_sla: Duration::hours(8),
        cancel_retry_limit: 3,
        cancel_retry_base_delay: std::time::Duration::from_millis(1),
    }
}

fn engine<'a>(
    temp: &TempDir,
    effects: &'a ScriptedEffects,
) -> WorkflowEngine<&'a ScriptedEffects> {
    WorkflowEngine::new(temp.path().join("workflows.db"), effects, test_options())
        .expect("engine")
}

fn warehouse_config() -> FulfillmentConfig {
    FulfillmentConfig {
        method: FulfillmentMethod::WarehouseEmail,
        warehouse_email: Some("warehouse@example.com".to_string()),
        shipbob_token: None,
        shipstation_api_key: None,
        shipstation_api_secret: None,
        require_approval: false,
        store_utc_offset_minutes: 0,
    }
}

fn shipbob_config() -> FulfillmentConfig {
    FulfillmentConfig {
        method: FulfillmentMethod::ShipBob,
        warehouse_email: None,
        shipbob_token: Some("sb-token".to_string()),
        shipstation_api_key: None,
        shipstation_api_secret: None,
        require_approval: false,
        store_utc_offset_minutes: 0,
    }
}

fn request(order_created_at: DateTime<Utc>) -> CancellationRequest {
    CancellationRequest {
        order_number: "1001".to_string(),
        order_total_cents: 2599,
        customer_email: "jordan@example.com".to_string(),
        order_created_at,
    }
}

// 2026-01-05 is a Monday.
fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).single().expect("valid")
}

fn friday(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 9, hour, minute, 0)
        .single()
        .expect("valid")
}

#[test]
fn weekday_orders_get_a_24_hour_window() {
    let evaluator = EligibilityEvaluator::new(0);
    let created = monday_morning();

    let decision = evaluator.evaluate(created, created + Duration::hours(23));
    assert!(decision.eligible);
    assert_eq!(decision.deadline, created + Duration::hours(24));

    let late = evaluator.evaluate(created, created + Duration::hours(25));
    assert!(!late.eligible);
    assert_eq!(late.reason, "Too Late");
}

#[test]
fn deadline_boundary_is_inclusive() {
    let evaluator = EligibilityEvaluator::new(0);
    let created = monday_morning();
    let decision = evaluator.evaluate(created, created + Duration::hours(24));
    assert!(decision.eligible);
}

#[test]
fn friday_before_noon_keeps_the_24_hour_window() {
    let evaluator = EligibilityEvaluator::new(0);
    let created = friday(11, 0);
    let decision = evaluator.evaluate(created, created + Duration::hours(1));
    assert_eq!(decision.deadline, created + Duration::hours(24));
}

#[test]
fn friday_afternoon_extends_to_monday_noon() {
    let evaluator = EligibilityEvaluator::new(0);
    let created = friday(13, 0);
    let decision = evaluator.evaluate(created, created + Duration::hours(1));
    let monday_noon = Utc.with_ymd_and_hms(2026, 1, 12, 12, 0, 0).single().expect("valid");
    assert_eq!(decision.deadline, monday_noon);

    // Sunday evening is still inside the weekend window.
    let sunday_evening = Utc.with_ymd_and_hms(2026, 1, 11, 20, 0, 0).single().expect("valid");
    assert!(evaluator.evaluate(created, sunday_evening).eligible);
}

#[test]
fn weekend_orders_extend_to_monday_noon() {
    let evaluator = EligibilityEvaluator::new(0);
    let monday_noon = Utc.with_ymd_and_hms(2026, 1, 12, 12, 0, 0).single().expect("valid");

    let saturday = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).single().expect("valid");
    assert_eq!(evaluator.evaluate(saturday, saturday).deadline, monday_noon);

    let sunday = Utc.with_ymd_and_hms(2026, 1, 11, 8, 30, 0).single().expect("valid");
    assert_eq!(evaluator.evaluate(sunday, sunday).deadline, monday_noon);
}

#[test]
fn eligibility_uses_store_local_time() {
    // 10:30 UTC is 12:30 in a UTC+2 store, so Friday afternoon rules apply.
    let evaluator = EligibilityEvaluator::new(120);
    let created = friday(10, 30);
    let decision = evaluator.evaluate(created, created);
    let monday_noon_local = Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).single().expect("valid");
    assert_eq!(decision.deadline, monday_noon_local);
}

#[test]
fn warehouse_replies_are_classified_by_decline_markers() {
    assert_eq!(
        interpret_warehouse_reply("Done, order pulled from the line."),
        WarehouseDisposition::Accepted
    );
    assert_eq!(
        interpret_warehouse_reply("Sorry, it already shipped this morning."),
        WarehouseDisposition::Declined
    );
    assert_eq!(
        interpret_warehouse_reply("Too late, the truck left an hour ago"),
        WarehouseDisposition::Declined
    );
    assert_eq!(
        interpret_warehouse_reply("We cannot cancel this one."),
        WarehouseDisposition::Declined
    );
}

#[test]
fn warehouse_path_cancels_refunds_and_confirms() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    assert_eq!(workflow.status, WorkflowStatus::AwaitingWarehouse);
    assert_eq!(workflow.step, WorkflowStep::AwaitWarehouse);
    assert!(workflow.customer_acknowledgment_sent);
    let subjects = fx.sent_subjects();
    assert_eq!(subjects.len(), 2);
    assert!(subjects[0].starts_with("We're on it"));
    assert!(subjects[1].starts_with("Cancellation request"));

    let done = engine
        .record_warehouse_reply(workflow.id, "All set, pulled it off the line.", now + Duration::hours(1))
        .expect("reply");
    assert_eq!(done.status, WorkflowStatus::Canceled);
    assert_eq!(done.was_canceled, Some(true));
    assert!(done.refund_processed);
    assert_eq!(done.refund_amount_cents, Some(2599));
    assert_eq!(fx.refund_count(), 1);
    let refund = fx.refunds.lock().expect("refunds lock")[0].clone();
    assert_eq!(refund.idempotency_key, workflow.id.to_string());
    assert!(fx
        .sent_subjects()
        .last()
        .expect("confirmation")
        .contains("has been canceled"));
}

#[test]
fn declined_warehouse_reply_closes_without_refund() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    let done = engine
        .record_warehouse_reply(workflow.id, "Already shipped, cannot cancel.", now + Duration::hours(1))
        .expect("reply");

    assert_eq!(done.status, WorkflowStatus::CannotCancel);
    assert_eq!(done.was_canceled, Some(false));
    assert!(!done.refund_processed);
    assert_eq!(fx.refund_count(), 0);
    assert!(fx
        .sent_subjects()
        .last()
        .expect("declined notice")
        .contains("could not be canceled"));
}

#[test]
fn duplicate_warehouse_reply_is_ignored() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    let first = engine
        .record_warehouse_reply(workflow.id, "Canceled it.", now + Duration::hours(1))
        .expect("first reply");
    let emails_after_first = fx.sent_count();

    // A contradictory second reply must not flip the stored outcome.
    let second = engine
        .record_warehouse_reply(workflow.id, "Actually it already shipped.", now + Duration::hours(2))
        .expect("second reply");
    assert_eq!(second.status, first.status);
    assert_eq!(second.was_canceled, Some(true));
    assert_eq!(fx.sent_count(), emails_after_first);
    assert_eq!(fx.refund_count(), 1);

    let audit = engine.store().audit_for(workflow.id).expect("audit");
    assert!(audit.iter().any(|entry| entry.event == "warehouse_reply_ignored"));
}

#[test]
fn too_late_requests_short_circuit() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::days(7)), warehouse_config(), now)
        .expect("create");

    assert_eq!(workflow.status, WorkflowStatus::CannotCancel);
    assert_eq!(workflow.was_canceled, Some(false));
    assert_eq!(workflow.eligibility_reason.as_deref(), Some("Too Late"));
    let subjects = fx.sent_subjects();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].contains("can no longer be canceled"));
    assert_eq!(fx.refund_count(), 0);
}

#[test]
fn sweep_times_out_stale_warehouse_waits() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");

    let early = engine.sweep(now + Duration::hours(7)).expect("early sweep");
    assert_eq!(early.timed_out, 0);
    assert_eq!(early.skipped, 1);

    let late = engine.sweep(now + Duration::hours(9)).expect("late sweep");
    assert_eq!(late.timed_out, 1);

    let failed = engine.store().load_workflow(workflow.id).expect("load");
    assert_eq!(failed.status, WorkflowStatus::Failed);
    assert!(failed.failure_reason.expect("reason").contains("no warehouse reply"));
    let escalations = engine.store().escalations_for(workflow.id).expect("escalations");
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].kind, EscalationKind::WarehouseTimeout);
    assert_eq!(fx.refund_count(), 0);

    // A reply arriving after the timeout no longer changes anything.
    let after = engine
        .record_warehouse_reply(workflow.id, "Canceled it.", now + Duration::hours(10))
        .expect("late reply");
    assert_eq!(after.status, WorkflowStatus::Failed);
}

#[test]
fn automated_path_completes_with_refund() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), shipbob_config(), now)
        .expect("create");

    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(workflow.was_canceled, Some(true));
    assert!(workflow.refund_processed);
    assert_eq!(fx.cancel_calls(), 1);
    assert_eq!(fx.refund_count(), 1);
    assert_eq!(fx.sent_count(), 2);
}

#[test]
fn automated_path_maps_cannot_cancel() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.script_cancel(vec![Ok(CancelAttempt {
        outcome: CancelOutcome::CannotCancel,
        detail: Some("already fulfilled".to_string()),
    })]);
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), shipbob_config(), now)
        .expect("create");

    assert_eq!(workflow.status, WorkflowStatus::CannotCancel);
    assert_eq!(workflow.was_canceled, Some(false));
    assert_eq!(fx.refund_count(), 0);
    assert!(fx
        .sent_subjects()
        .last()
        .expect("declined notice")
        .contains("could not be canceled"));
}

#[test]
fn transient_cancel_errors_are_retried() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.script_cancel(vec![
        Err(StrategyError::Transient("502 from shipbob".to_string())),
        Err(StrategyError::Transient("503 from shipbob".to_string())),
        Ok(CancelAttempt {
            outcome: CancelOutcome::Canceled,
            detail: None,
        }),
    ]);
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), shipbob_config(), now)
        .expect("create");

    assert_eq!(fx.cancel_calls(), 3);
    assert_eq!(workflow.status, WorkflowStatus::Completed);
}

#[test]
fn exhausted_retries_fail_the_workflow() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.script_cancel(vec![
        Err(StrategyError::Transient("502".to_string())),
        Err(StrategyError::Transient("502".to_string())),
        Err(StrategyError::Transient("502".to_string())),
    ]);
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), shipbob_config(), now)
        .expect("create");

    assert_eq!(fx.cancel_calls(), 3);
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    let escalations = engine.store().escalations_for(workflow.id).expect("escalations");
    assert_eq!(escalations[0].kind, EscalationKind::WorkflowFailed);
}

#[test]
fn permanent_cancel_errors_fail_without_retry() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.script_cancel(vec![Err(StrategyError::MissingCredential("shipbob_token"))]);
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), shipbob_config(), now)
        .expect("create");

    assert_eq!(fx.cancel_calls(), 1);
    assert_eq!(workflow.status, WorkflowStatus::Failed);
}

#[test]
fn pending_outcome_from_an_automated_backend_is_a_fault() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.script_cancel(vec![Ok(CancelAttempt {
        outcome: CancelOutcome::Pending,
        detail: None,
    })]);
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), shipbob_config(), now)
        .expect("create");
    assert_eq!(workflow.status, WorkflowStatus::Failed);
}

#[test]
fn refund_failure_escalates_instead_of_rolling_back() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.fail_refunds("gateway declined");
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), shipbob_config(), now)
        .expect("create");

    // The cancellation stands even though the refund did not go through.
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert!(!workflow.refund_processed);
    assert!(workflow.needs_reconciliation);
    let escalations = engine.store().escalations_for(workflow.id).expect("escalations");
    assert_eq!(escalations[0].kind, EscalationKind::RefundReconciliation);
    assert!(fx
        .sent_subjects()
        .last()
        .expect("confirmation")
        .contains("has been canceled"));
}

#[test]
fn retryable_email_failure_parks_and_sweep_retries() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.push_email_error(DispatchError::Retryable("postmark 503".to_string()));
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    assert_eq!(workflow.status, WorkflowStatus::Processing);
    assert_eq!(workflow.step, WorkflowStep::AcknowledgeCustomer);
    assert_eq!(fx.sent_count(), 0);

    let report = engine.sweep(now + Duration::minutes(5)).expect("sweep");
    assert_eq!(report.advanced, 1);

    let resumed = engine.store().load_workflow(workflow.id).expect("load");
    assert_eq!(resumed.status, WorkflowStatus::AwaitingWarehouse);
    assert_eq!(fx.sent_count(), 2);
}

#[test]
fn permanent_email_failure_fails_the_workflow() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    fx.push_email_error(DispatchError::Permanent("invalid recipient".to_string()));
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert!(workflow
        .failure_reason
        .expect("reason")
        .contains("email delivery failed"));
}

#[test]
fn refund_is_not_repeated_when_the_result_email_is_retried() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");

    // Fail only the confirmation email; the refund has already been claimed.
    fx.push_email_error(DispatchError::Retryable("postmark 503".to_string()));
    let parked = engine
        .record_warehouse_reply(workflow.id, "Canceled.", now + Duration::hours(1))
        .expect("reply");
    assert_eq!(parked.step, WorkflowStep::ProcessResult);
    assert_eq!(fx.refund_count(), 1);

    let report = engine.sweep(now + Duration::hours(1)).expect("sweep");
    assert_eq!(report.advanced, 1);
    let done = engine.store().load_workflow(workflow.id).expect("load");
    assert_eq!(done.status, WorkflowStatus::Canceled);
    assert_eq!(fx.refund_count(), 1);
}

#[test]
fn approval_gate_parks_each_mutating_step() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();
    let mut config = warehouse_config();
    config.require_approval = true;

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), config, now)
        .expect("create");
    assert_eq!(workflow.step, WorkflowStep::EmailWarehouse);
    assert_eq!(fx.sent_count(), 1, "only the acknowledgment goes out ungated");

    let pending = engine
        .store()
        .pending_approval(workflow.id)
        .expect("pending")
        .expect("item");
    assert_eq!(pending.action, super::approval::GatedAction::EmailWarehouse);

    // The sweep must not push past a pending approval.
    let report = engine.sweep(now + Duration::minutes(10)).expect("sweep");
    assert_eq!(report.advanced, 0);

    let approved = engine
        .resolve_approval(workflow.id, true, None, now + Duration::minutes(30))
        .expect("approve");
    assert_eq!(approved.status, WorkflowStatus::AwaitingWarehouse);
    assert_eq!(fx.sent_count(), 2);

    let parked = engine
        .record_warehouse_reply(workflow.id, "Canceled.", now + Duration::hours(1))
        .expect("reply");
    assert_eq!(parked.step, WorkflowStep::ProcessResult);
    let refund_gate = engine
        .store()
        .pending_approval(workflow.id)
        .expect("pending")
        .expect("item");
    assert_eq!(refund_gate.action, super::approval::GatedAction::Refund);
    assert_eq!(fx.refund_count(), 0);

    let done = engine
        .resolve_approval(workflow.id, true, None, now + Duration::hours(2))
        .expect("approve refund");
    assert_eq!(done.status, WorkflowStatus::Canceled);
    assert_eq!(fx.refund_count(), 1);
}

#[test]
fn rejected_approval_fails_the_workflow() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();
    let mut config = warehouse_config();
    config.require_approval = true;

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), config, now)
        .expect("create");
    let rejected = engine
        .resolve_approval(workflow.id, false, Some("customer withdrew"), now)
        .expect("reject");

    assert_eq!(rejected.status, WorkflowStatus::Failed);
    assert!(rejected
        .failure_reason
        .expect("reason")
        .contains("approval rejected"));
    assert_eq!(fx.sent_count(), 1);
    // A rejection is an expected outcome, not a fault: nothing lands in the
    // operator escalation queue.
    let escalations = engine.store().escalations_for(workflow.id).expect("escalations");
    assert!(escalations.is_empty());
}

#[test]
fn resolving_without_a_pending_approval_is_a_noop() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    let unchanged = engine
        .resolve_approval(workflow.id, true, None, now)
        .expect("resolve");
    assert_eq!(unchanged.status, WorkflowStatus::AwaitingWarehouse);
}

#[test]
fn workflow_survives_an_engine_restart() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let now = monday_morning();
    let id = {
        let engine = engine(&temp, &fx);
        engine
            .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
            .expect("create")
            .id
    };

    // A fresh engine over the same database picks up where the first left off.
    let engine = engine(&temp, &fx);
    let done = engine
        .record_warehouse_reply(id, "Canceled.", now + Duration::hours(1))
        .expect("reply");
    assert_eq!(done.status, WorkflowStatus::Canceled);
    assert_eq!(fx.refund_count(), 1);
}

#[test]
fn outcome_is_written_exactly_once() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    assert!(engine
        .store()
        .set_outcome_once(workflow.id, true, now)
        .expect("first write"));
    assert!(!engine
        .store()
        .set_outcome_once(workflow.id, false, now)
        .expect("second write"));
    let loaded = engine.store().load_workflow(workflow.id).expect("load");
    assert_eq!(loaded.was_canceled, Some(true));
}

#[test]
fn stale_write_cannot_resurrect_a_terminal_workflow() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    let mut stale = engine.store().load_workflow(workflow.id).expect("load");
    assert_eq!(stale.status, WorkflowStatus::AwaitingWarehouse);

    let swept = engine.sweep(now + Duration::hours(9)).expect("sweep");
    assert_eq!(swept.timed_out, 1);

    // A writer still holding the pre-sweep copy loses the race: the update
    // matches no row and the workflow stays failed.
    stale.updated_at = now + Duration::hours(10);
    assert!(!engine.store().update_workflow(&stale).expect("stale write"));
    let current = engine.store().load_workflow(workflow.id).expect("reload");
    assert_eq!(current.status, WorkflowStatus::Failed);
    assert!(current.failure_reason.expect("reason").contains("no warehouse reply"));
}

#[test]
fn store_roundtrips_workflow_and_config() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    let loaded = engine.store().load_workflow(workflow.id).expect("load");
    assert_eq!(loaded.order_number, "1001");
    assert_eq!(loaded.order_total_cents, 2599);
    assert_eq!(loaded.fulfillment_method, FulfillmentMethod::WarehouseEmail);

    let config = engine.store().load_config(workflow.id).expect("config");
    assert_eq!(config.warehouse_email.as_deref(), Some("warehouse@example.com"));

    let open = engine.store().list_non_terminal().expect("list");
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, workflow.id);
}

#[test]
fn audit_trail_records_the_full_path() {
    let temp = TempDir::new().expect("tempdir");
    let fx = ScriptedEffects::default();
    let engine = engine(&temp, &fx);
    let now = monday_morning();

    let workflow = engine
        .create_workflow(request(now - Duration::hours(2)), warehouse_config(), now)
        .expect("create");
    engine
        .record_warehouse_reply(workflow.id, "Canceled.", now + Duration::hours(1))
        .expect("reply");

    let events: Vec<String> = engine
        .store()
        .audit_for(workflow.id)
        .expect("audit")
        .into_iter()
        .map(|entry| entry.event)
        .collect();
    for expected in [
        "workflow_created",
        "order_identified",
        "eligibility_checked",
        "warehouse_emailed",
        "warehouse_reply_received",
        "refund_processed",
        "workflow_closed",
    ] {
        assert!(events.iter().any(|event| event == expected), "missing {expected}");
    }
}
