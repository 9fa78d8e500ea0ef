//! services/api/src/adapters/paypal.rs
//!
//! PayPal REST client. Implements the `PaymentService` port: obtains an
//! OAuth token with the client credentials and captures approved orders.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use studius_core::{
    domain::CapturedPayment,
    ports::{PaymentService, PortError, PortResult},
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PaymentService` against the PayPal REST API.
#[derive(Clone)]
pub struct PayPalAdapter {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
}

impl PayPalAdapter {
    /// Creates a new `PayPalAdapter`.
    pub fn new(
        client_id: String,
        client_secret: String,
        base_url: String,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn access_token(&self) -> PortResult<String> {
        let token: TokenResponse = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(request_failed)?
            .error_for_status()
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)?;
        Ok(token.access_token)
    }
}

fn request_failed(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("PayPal request failed: {}", e))
}

/// Converts a decimal amount string like "9.99" into cents.
fn amount_to_cents(value: &str) -> Option<i64> {
    let parsed: f64 = value.trim().parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some((parsed * 100.0).round() as i64)
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct CaptureOrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    amount: Amount,
}

#[derive(Deserialize)]
struct Amount {
    currency_code: String,
    value: String,
}

fn to_captured_payment(response: CaptureOrderResponse) -> PortResult<CapturedPayment> {
    let capture = response
        .purchase_units
        .into_iter()
        .filter_map(|u| u.payments)
        .flat_map(|p| p.captures)
        .next()
        .ok_or_else(|| {
            PortError::Unexpected(format!("Order {} has no captured payment", response.id))
        })?;
    let amount_cents = amount_to_cents(&capture.amount.value).ok_or_else(|| {
        PortError::Unexpected(format!(
            "Order {} reported an unreadable amount: {}",
            response.id, capture.amount.value
        ))
    })?;
    Ok(CapturedPayment {
        order_id: response.id,
        currency: capture.amount.currency_code,
        amount_cents,
        completed: response.status.eq_ignore_ascii_case("COMPLETED"),
    })
}

//=========================================================================================
// `PaymentService` Trait Implementation
//=========================================================================================

#[async_trait]
impl PaymentService for PayPalAdapter {
    async fn capture_order(&self, order_id: &str) -> PortResult<CapturedPayment> {
        let token = self.access_token().await?;
        debug!(order_id, "capturing PayPal order");

        let response: CaptureOrderResponse = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, order_id
            ))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(request_failed)?
            .error_for_status()
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)?;

        to_captured_payment(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_amounts_to_cents() {
        assert_eq!(amount_to_cents("9.99"), Some(999));
        assert_eq!(amount_to_cents("20"), Some(2000));
        assert_eq!(amount_to_cents("0.50"), Some(50));
        assert_eq!(amount_to_cents(" 4.99 "), Some(499));
        assert_eq!(amount_to_cents("-1.00"), None);
        assert_eq!(amount_to_cents("molto"), None);
    }

    #[test]
    fn maps_a_completed_capture() {
        let response: CaptureOrderResponse = serde_json::from_str(
            r#"{
                "id": "5O190127TN364715T",
                "status": "COMPLETED",
                "purchase_units": [{
                    "payments": {
                        "captures": [{
                            "amount": {"currency_code": "EUR", "value": "9.99"}
                        }]
                    }
                }]
            }"#,
        )
        .unwrap();
        let payment = to_captured_payment(response).unwrap();
        assert_eq!(payment.order_id, "5O190127TN364715T");
        assert_eq!(payment.currency, "EUR");
        assert_eq!(payment.amount_cents, 999);
        assert!(payment.completed);
    }

    #[test]
    fn rejects_an_order_with_no_captures() {
        let response: CaptureOrderResponse =
            serde_json::from_str(r#"{"id": "X", "status": "CREATED", "purchase_units": []}"#)
                .unwrap();
        assert!(to_captured_payment(response).is_err());
    }
}
