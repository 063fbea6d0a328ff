use commerce_module::{CommerceClient, CommerceError, OrderCancelResult, ShipBobClient, ShipStationClient};
use serde::{Deserialize, Serialize};

use super::types::{FulfillmentConfig, FulfillmentMethod};

/// Outcome of one cancellation attempt against a fulfillment backend.
/// `Pending` is only valid for the warehouse-email variant, where the real
/// answer arrives later as an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Canceled,
    CannotCancel,
    Pending,
}

#[derive(Debug, Clone)]
pub struct CancelAttempt {
    pub outcome: CancelOutcome,
    pub detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("transient fulfillment error: {0}")]
    Transient(String),
    #[error("fulfillment error: {0}")]
    Permanent(String),
    #[error("fulfillment config missing {0}")]
    MissingCredential(&'static str),
}

impl StrategyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StrategyError::Transient(_))
    }
}

#[derive(Debug, Clone)]
pub struct CancelOrderRequest<'a> {
    pub order_number: &'a str,
    pub customer_email: &'a str,
}

/// One cancellation backend. The variant is picked once, from the method
/// frozen on the workflow, and holds whatever credentials it needs from the
/// config snapshot.
pub trait FulfillmentStrategy {
    fn attempt_cancel(&self, order: &CancelOrderRequest<'_>) -> Result<CancelAttempt, StrategyError>;
}

/// Human warehouse team reached by email; the engine owns the outbound
/// request, so this variant only reports that the outcome is pending.
pub struct WarehouseEmailStrategy;

impl FulfillmentStrategy for WarehouseEmailStrategy {
    fn attempt_cancel(&self, _order: &CancelOrderRequest<'_>) -> Result<CancelAttempt, StrategyError> {
        Ok(CancelAttempt {
            outcome: CancelOutcome::Pending,
            detail: Some("awaiting warehouse reply".to_string()),
        })
    }
}

pub struct ShipBobStrategy {
    client: ShipBobClient,
}

impl ShipBobStrategy {
    pub fn new(token: &str) -> Self {
        Self {
            client: ShipBobClient::new(token),
        }
    }
}

impl FulfillmentStrategy for ShipBobStrategy {
    fn attempt_cancel(&self, order: &CancelOrderRequest<'_>) -> Result<CancelAttempt, StrategyError> {
        map_cancel_result(self.client.cancel_order(order.order_number))
    }
}

pub struct ShipStationStrategy {
    client: ShipStationClient,
}

impl ShipStationStrategy {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            client: ShipStationClient::new(api_key, api_secret),
        }
    }
}

impl FulfillmentStrategy for ShipStationStrategy {
    fn attempt_cancel(&self, order: &CancelOrderRequest<'_>) -> Result<CancelAttempt, StrategyError> {
        map_cancel_result(self.client.cancel_order(order.order_number))
    }
}

/// Merchant ships in house; cancellation is a status flip on the commerce
/// platform itself.
pub struct SelfFulfillmentStrategy {
    client: CommerceClient,
}

impl SelfFulfillmentStrategy {
    pub fn new(client: CommerceClient) -> Self {
        Self { client }
    }
}

impl FulfillmentStrategy for SelfFulfillmentStrategy {
    fn attempt_cancel(&self, order: &CancelOrderRequest<'_>) -> Result<CancelAttempt, StrategyError> {
        map_cancel_result(self.client.cancel_order(order.order_number))
    }
}

/// Build the strategy for a workflow's frozen method from its config
/// snapshot.
pub(crate) fn strategy_for(
    config: &FulfillmentConfig,
) -> Result<Box<dyn FulfillmentStrategy>, StrategyError> {
    match config.method {
        FulfillmentMethod::WarehouseEmail => Ok(Box::new(WarehouseEmailStrategy)),
        FulfillmentMethod::ShipBob => {
            let token = config
                .shipbob_token
                .as_deref()
                .ok_or(StrategyError::MissingCredential("shipbob_token"))?;
            Ok(Box::new(ShipBobStrategy::new(token)))
        }
        FulfillmentMethod::ShipStation => {
            let api_key = config
                .shipstation_api_key
                .as_deref()
                .ok_or(StrategyError::MissingCredential("shipstation_api_key"))?;
            let api_secret = config
                .shipstation_api_secret
                .as_deref()
                .ok_or(StrategyError::MissingCredential("shipstation_api_secret"))?;
            Ok(Box::new(ShipStationStrategy::new(api_key, api_secret)))
        }
        FulfillmentMethod::SelfFulfillment => {
            let client = CommerceClient::from_env()
                .map_err(|err| StrategyError::Permanent(err.to_string()))?;
            Ok(Box::new(SelfFulfillmentStrategy::new(client)))
        }
    }
}

fn map_cancel_result(
    result: Result<OrderCancelResult, CommerceError>,
) -> Result<CancelAttempt, StrategyError> {
    match result {
        Ok(OrderCancelResult::Canceled) => Ok(CancelAttempt {
            outcome: CancelOutcome::Canceled,
            detail: None,
        }),
        Ok(OrderCancelResult::CannotCancel { detail }) => Ok(CancelAttempt {
            outcome: CancelOutcome::CannotCancel,
            detail: Some(detail),
        }),
        Err(err) if err.is_transient() => Err(StrategyError::Transient(err.to_string())),
        Err(err) => Err(StrategyError::Permanent(err.to_string())),
    }
}
