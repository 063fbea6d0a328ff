use super::strategy::{strategy_for, CancelAttempt, CancelOrderRequest, StrategyError};
use super::types::{CancellationWorkflow, FulfillmentConfig};

/// Outbound HTML email, already rendered from a template.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("retryable email delivery error: {0}")]
    Retryable(String),
    #[error("email delivery failed: {0}")]
    Permanent(String),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Retryable(_))
    }
}

pub trait NotificationDispatcher {
    fn send_email(&self, message: &EmailMessage) -> Result<DeliveryReceipt, DispatchError>;
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub order_number: String,
    pub amount_cents: i64,
    /// Stable per-workflow key; a retried or duplicated call never
    /// double-refunds.
    pub idempotency_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RefundError {
    #[error("refund failed: {0}")]
    Failed(String),
}

pub trait RefundProcessor {
    fn process_refund(&self, request: &RefundRequest) -> Result<(), RefundError>;
}

pub trait FulfillmentDispatch {
    fn attempt_cancel(
        &self,
        workflow: &CancellationWorkflow,
        config: &FulfillmentConfig,
    ) -> Result<CancelAttempt, StrategyError>;
}

/// Everything the engine needs from the outside world, behind one seam so
/// tests can script it.
pub trait Effects: NotificationDispatcher + RefundProcessor + FulfillmentDispatch {}

impl<T: NotificationDispatcher + RefundProcessor + FulfillmentDispatch> Effects for T {}

/// Production collaborator bundle wired to the sibling crates.
#[derive(Debug, Default, Clone)]
pub struct ModuleEffects;

impl NotificationDispatcher for ModuleEffects {
    fn send_email(&self, message: &EmailMessage) -> Result<DeliveryReceipt, DispatchError> {
        let params = notify_module::SendEmailParams {
            subject: message.subject.clone(),
            html_body: message.html_body.clone(),
            from: None,
            to: vec![message.to.clone()],
            cc: vec![],
            bcc: vec![],
            tag: Some("cancellation-workflow".to_string()),
        };
        match notify_module::send_email(&params) {
            Ok(receipt) => Ok(DeliveryReceipt {
                message_id: Some(receipt.message_id),
            }),
            Err(err) if err.is_retryable() => Err(DispatchError::Retryable(err.to_string())),
            Err(err) => Err(DispatchError::Permanent(err.to_string())),
        }
    }
}

impl RefundProcessor for ModuleEffects {
    fn process_refund(&self, request: &RefundRequest) -> Result<(), RefundError> {
        let client = commerce_module::CommerceClient::from_env()
            .map_err(|err| RefundError::Failed(err.to_string()))?;
        let params = commerce_module::RefundParams {
            order_number: request.order_number.clone(),
            amount_cents: request.amount_cents,
            idempotency_key: request.idempotency_key.clone(),
        };
        client
            .process_refund(&params)
            .map(|_| ())
            .map_err(|err| RefundError::Failed(err.to_string()))
    }
}

impl FulfillmentDispatch for ModuleEffects {
    fn attempt_cancel(
        &self,
        workflow: &CancellationWorkflow,
        config: &FulfillmentConfig,
    ) -> Result<CancelAttempt, StrategyError> {
        let strategy = strategy_for(config)?;
        strategy.attempt_cancel(&CancelOrderRequest {
            order_number: &workflow.order_number,
            customer_email: &workflow.customer_email,
        })
    }
}
