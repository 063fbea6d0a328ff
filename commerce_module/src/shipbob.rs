use std::env;

use serde::Deserialize;

use crate::commerce::{check_status, error_message};
use crate::error::CommerceError;
use crate::types::OrderCancelResult;

const SHIPBOB_API_URL: &str = "https://api.shipbob.com/1.0";

/// ShipBob cancels by internal order id, so every cancellation is a lookup
/// by reference id followed by the cancel call.
pub struct ShipBobClient {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct ShipBobOrder {
    id: i64,
    #[serde(default)]
    status: Option<String>,
}

impl ShipBobClient {
    pub fn new(token: impl Into<String>) -> Self {
        let base_url =
            env::var("SHIPBOB_API_BASE").unwrap_or_else(|_| SHIPBOB_API_URL.to_string());
        Self::with_base_url(base_url, token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn cancel_order(&self, order_number: &str) -> Result<OrderCancelResult, CommerceError> {
        let order = self.find_order(order_number)?;
        if let Some(status) = order.status.as_deref() {
            if status.eq_ignore_ascii_case("fulfilled") || status.eq_ignore_ascii_case("shipped") {
                return Ok(OrderCancelResult::CannotCancel {
                    detail: format!("shipbob order already {}", status.to_lowercase()),
                });
            }
        }

        let response = self
            .client
            .post(format!("{}/order/{}/cancel", self.base_url, order.id))
            .bearer_auth(&self.token)
            .send()?;
        if response.status().as_u16() == 422 {
            let detail = error_message(response);
            return Ok(OrderCancelResult::CannotCancel { detail });
        }
        check_status(response)?;
        Ok(OrderCancelResult::Canceled)
    }

    fn find_order(&self, order_number: &str) -> Result<ShipBobOrder, CommerceError> {
        let response = self
            .client
            .get(format!("{}/order", self.base_url))
            .query(&[("ReferenceIds", order_number)])
            .bearer_auth(&self.token)
            .send()?;
        let response = check_status(response)?;
        let orders: Vec<ShipBobOrder> = response.json()?;
        orders
            .into_iter()
            .next()
            .ok_or_else(|| CommerceError::OrderNotFound(order_number.to_string()))
    }
}
