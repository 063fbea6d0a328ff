use std::env;

use serde::{Deserialize, Serialize};

use crate::error::CommerceError;
use crate::types::{Order, OrderCancelResult, RefundParams, RefundReceipt};

/// Client for the merchant's commerce platform: order lookup, order
/// cancellation for self-fulfilled merchants, and refunds.
pub struct CommerceClient {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl CommerceClient {
    pub fn from_env() -> Result<Self, CommerceError> {
        dotenvy::dotenv().ok();
        let base_url = env::var("COMMERCE_API_BASE")
            .map_err(|_| CommerceError::MissingEnv("COMMERCE_API_BASE"))?;
        let token = env::var("COMMERCE_API_TOKEN")
            .map_err(|_| CommerceError::MissingEnv("COMMERCE_API_TOKEN"))?;
        Ok(Self::new(base_url, token))
    }

    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn fetch_order(&self, order_number: &str) -> Result<Order, CommerceError> {
        let response = self
            .client
            .get(format!("{}/orders/{}", self.base_url, order_number))
            .bearer_auth(&self.token)
            .send()?;
        if response.status().as_u16() == 404 {
            return Err(CommerceError::OrderNotFound(order_number.to_string()));
        }
        let response = check_status(response)?;
        Ok(response.json::<Order>()?)
    }

    /// Cancel an order on the platform itself. A 422 means the platform
    /// declined (typically already fulfilled), which is an answer, not an
    /// error.
    pub fn cancel_order(&self, order_number: &str) -> Result<OrderCancelResult, CommerceError> {
        let response = self
            .client
            .post(format!("{}/orders/{}/cancel", self.base_url, order_number))
            .bearer_auth(&self.token)
            .send()?;
        if response.status().as_u16() == 404 {
            return Err(CommerceError::OrderNotFound(order_number.to_string()));
        }
        if response.status().as_u16() == 422 {
            let detail = error_message(response);
            return Ok(OrderCancelResult::CannotCancel { detail });
        }
        check_status(response)?;
        Ok(OrderCancelResult::Canceled)
    }

    pub fn process_refund(&self, params: &RefundParams) -> Result<RefundReceipt, CommerceError> {
        #[derive(Serialize)]
        struct RefundBody<'a> {
            order_number: &'a str,
            amount_cents: i64,
        }
        let response = self
            .client
            .post(format!("{}/refunds", self.base_url))
            .bearer_auth(&self.token)
            .header("Idempotency-Key", &params.idempotency_key)
            .json(&RefundBody {
                order_number: &params.order_number,
                amount_cents: params.amount_cents,
            })
            .send()?;
        let response = check_status(response)?;
        Ok(response.json::<RefundReceipt>()?)
    }
}

pub(crate) fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, CommerceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(CommerceError::Api {
            status: status.as_u16(),
            message: error_message(response),
        })
    }
}

pub(crate) fn error_message(response: reqwest::blocking::Response) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        #[serde(alias = "error", alias = "Message", default)]
        message: String,
    }
    match response.json::<ApiError>() {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => "unknown api error".to_string(),
    }
}
