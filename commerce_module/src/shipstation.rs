use std::env;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::commerce::check_status;
use crate::error::CommerceError;
use crate::types::OrderCancelResult;

const SHIPSTATION_API_URL: &str = "https://ssapi.shipstation.com";

/// ShipStation has no cancel endpoint; an order is canceled by resubmitting
/// it through /orders/createorder with orderStatus set to "cancelled".
pub struct ShipStationClient {
    base_url: String,
    auth_header: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct OrderListResponse {
    orders: Vec<ShipStationOrder>,
}

#[derive(Debug, Deserialize)]
struct ShipStationOrder {
    #[serde(rename = "orderKey")]
    order_key: String,
    #[serde(rename = "orderNumber")]
    order_number: String,
    #[serde(rename = "orderStatus")]
    order_status: String,
}

#[derive(Serialize)]
struct CancelBody<'a> {
    #[serde(rename = "orderNumber")]
    order_number: &'a str,
    #[serde(rename = "orderKey")]
    order_key: &'a str,
    #[serde(rename = "orderStatus")]
    order_status: &'a str,
}

impl ShipStationClient {
    pub fn new(api_key: impl AsRef<str>, api_secret: impl AsRef<str>) -> Self {
        let base_url =
            env::var("SHIPSTATION_API_BASE").unwrap_or_else(|_| SHIPSTATION_API_URL.to_string());
        Self::with_base_url(base_url, api_key, api_secret)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl AsRef<str>,
        api_secret: impl AsRef<str>,
    ) -> Self {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", api_key.as_ref(), api_secret.as_ref()));
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header: format!("Basic {}", credentials),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn cancel_order(&self, order_number: &str) -> Result<OrderCancelResult, CommerceError> {
        let order = self.find_order(order_number)?;
        match order.order_status.as_str() {
            "shipped" | "fulfilled" => {
                return Ok(OrderCancelResult::CannotCancel {
                    detail: format!("shipstation order already {}", order.order_status),
                })
            }
            "cancelled" => return Ok(OrderCancelResult::Canceled),
            _ => {}
        }

        let response = self
            .client
            .post(format!("{}/orders/createorder", self.base_url))
            .header("Authorization", &self.auth_header)
            .json(&CancelBody {
                order_number: &order.order_number,
                order_key: &order.order_key,
                order_status: "cancelled",
            })
            .send()?;
        check_status(response)?;
        Ok(OrderCancelResult::Canceled)
    }

    fn find_order(&self, order_number: &str) -> Result<ShipStationOrder, CommerceError> {
        let response = self
            .client
            .get(format!("{}/orders", self.base_url))
            .query(&[("orderNumber", order_number)])
            .header("Authorization", &self.auth_header)
            .send()?;
        let response = check_status(response)?;
        let list: OrderListResponse = response.json()?;
        list.orders
            .into_iter()
            .find(|order| order.order_number == order_number)
            .ok_or_else(|| CommerceError::OrderNotFound(order_number.to_string()))
    }
}
