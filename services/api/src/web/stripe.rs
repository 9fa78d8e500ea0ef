//! services/api/src/web/stripe.rs
//!
//! The Stripe webhook. Signature verification runs over the raw body before
//! any JSON parsing: the `Stripe-Signature` header carries a timestamp and
//! one or more `v1` HMAC-SHA256 signatures of `"{timestamp}.{body}"`.
//!
//! Handled events: `checkout.session.completed` (one-time credit packs),
//! `invoice.paid` (subscription renewal), `customer.subscription.deleted`
//! (downgrade). Everything else is acknowledged and ignored.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use studius_core::{
    domain::SubscriptionPlan,
    pricing::{find_pack, monthly_credits},
};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::web::{port_error_response, state::AppState};

/// Maximum accepted age of a signed payload.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

//=========================================================================================
// Signature Verification
//=========================================================================================

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SignatureError {
    MalformedHeader,
    TimestampOutOfTolerance,
    NoMatchingSignature,
}

/// Verifies a `Stripe-Signature` header against the raw request body.
pub(crate) fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex_decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now_unix - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedHeader)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    for candidate in &candidates {
        if candidate.len() == expected.len()
            && bool::from(candidate.as_slice().ct_eq(expected.as_slice()))
        {
            return Ok(());
        }
    }
    Err(SignatureError::NoMatchingSignature)
}

fn hex_decode(value: &str) -> Result<Vec<u8>, ()> {
    // the header is attacker-controlled; non-ASCII input must fail cleanly
    // instead of slicing inside a multibyte character
    if !value.is_ascii() || value.len() % 2 != 0 {
        return Err(());
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutSessionObject {
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    metadata: CheckoutMetadata,
}

#[derive(Deserialize, Default)]
struct CheckoutMetadata {
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default)]
    pack: Option<String>,
    #[serde(default)]
    plan: Option<String>,
}

#[derive(Deserialize)]
struct InvoiceObject {
    customer: String,
    #[serde(default)]
    subscription_details: Option<SubscriptionDetails>,
}

#[derive(Deserialize)]
struct SubscriptionDetails {
    #[serde(default)]
    metadata: CheckoutMetadata,
}

#[derive(Deserialize)]
struct SubscriptionObject {
    customer: String,
}

//=========================================================================================
// Handler
//=========================================================================================

/// Stripe webhook endpoint. Unrecognized events are acknowledged with 200 so
/// Stripe does not retry them.
#[utoipa::path(
    post,
    path = "/api/stripe/webhook",
    request_body(content_type = "application/json", description = "Raw Stripe event payload."),
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Invalid signature or payload"),
        (status = 500, description = "Webhook secret not configured")
    )
)]
pub async fn stripe_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let secret = state.config.stripe_webhook_secret.as_ref().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Il webhook Stripe non è configurato.".to_string(),
    ))?;
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Intestazione Stripe-Signature mancante.".to_string(),
        ))?;

    verify_signature(secret, signature, &body, chrono::Utc::now().timestamp()).map_err(|e| {
        warn!("Stripe signature rejected: {e:?}");
        (
            StatusCode::BAD_REQUEST,
            "Firma del webhook non valida.".to_string(),
        )
    })?;

    let event: StripeEvent = serde_json::from_slice(&body).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "Payload dell'evento non valido.".to_string(),
        )
    })?;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            handle_checkout_completed(&state, event.data.object).await?
        }
        "invoice.paid" => handle_invoice_paid(&state, event.data.object).await?,
        "customer.subscription.deleted" => {
            handle_subscription_deleted(&state, event.data.object).await?
        }
        other => {
            info!(event_type = other, "Ignoring unhandled Stripe event");
        }
    }

    Ok(StatusCode::OK)
}

/// One-time credit pack purchase: the checkout session metadata names the
/// buyer and the pack.
async fn handle_checkout_completed(
    state: &AppState,
    object: serde_json::Value,
) -> Result<(), (StatusCode, String)> {
    let session: CheckoutSessionObject = serde_json::from_value(object).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "Sessione di checkout non leggibile.".to_string(),
        )
    })?;
    let Some(user_id) = session.metadata.user_id else {
        warn!("Checkout session without user_id metadata, ignoring");
        return Ok(());
    };

    if let Some(customer) = &session.customer {
        state
            .db
            .set_stripe_customer(user_id, customer)
            .await
            .map_err(port_error_response)?;
    }

    let Some(pack_slug) = session.metadata.pack.as_deref() else {
        // a subscription checkout; fulfillment happens on invoice.paid
        return Ok(());
    };
    let Some(pack) = find_pack(pack_slug) else {
        warn!(pack = pack_slug, "Checkout names an unknown credit pack, ignoring");
        return Ok(());
    };

    state
        .db
        .grant_credits(user_id, pack.credits, "stripe-checkout", pack.label)
        .await
        .map_err(port_error_response)?;
    info!(user_id = %user_id, credits = pack.credits, "Credit pack fulfilled");
    Ok(())
}

/// Subscription renewal: grant the monthly credits and (re)activate the plan.
async fn handle_invoice_paid(
    state: &AppState,
    object: serde_json::Value,
) -> Result<(), (StatusCode, String)> {
    let invoice: InvoiceObject = serde_json::from_value(object).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "Fattura non leggibile.".to_string(),
        )
    })?;
    let user = state
        .db
        .get_user_by_stripe_customer(&invoice.customer)
        .await
        .map_err(port_error_response)?;

    let plan = invoice
        .subscription_details
        .and_then(|d| d.metadata.plan)
        .map(|p| SubscriptionPlan::parse(&p))
        .unwrap_or(user.plan);
    let grant = monthly_credits(plan);

    state
        .db
        .update_subscription(user.id, plan, true)
        .await
        .map_err(port_error_response)?;
    if grant > 0 {
        state
            .db
            .grant_credits(
                user.id,
                grant,
                "subscription",
                "Crediti mensili dell'abbonamento",
            )
            .await
            .map_err(port_error_response)?;
    }
    info!(user_id = %user.id, plan = plan.as_str(), grant, "Subscription invoice fulfilled");
    Ok(())
}

/// Subscription ended: back to the free plan, credits stay.
async fn handle_subscription_deleted(
    state: &AppState,
    object: serde_json::Value,
) -> Result<(), (StatusCode, String)> {
    let subscription: SubscriptionObject = serde_json::from_value(object).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "Abbonamento non leggibile.".to_string(),
        )
    })?;
    let user = state
        .db
        .get_user_by_stripe_customer(&subscription.customer)
        .await
        .map_err(port_error_response)?;
    state
        .db
        .update_subscription(user.id, SubscriptionPlan::Free, false)
        .await
        .map_err(port_error_response)?;
    info!(user_id = %user.id, "Subscription canceled, user downgraded to free");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    #[test]
    fn accepts_a_valid_signature() {
        let secret = "whsec_test";
        let body = br#"{"type":"invoice.paid"}"#;
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(secret, now, body));
        assert_eq!(verify_signature(secret, &header, body, now), Ok(()));
    }

    #[test]
    fn accepts_when_any_v1_signature_matches() {
        let secret = "whsec_test";
        let body = b"payload";
        let now = 1_700_000_000;
        let header = format!("t={now},v1={},v1={}", "ab".repeat(32), sign(secret, now, body));
        assert_eq!(verify_signature(secret, &header, body, now), Ok(()));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let secret = "whsec_test";
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(secret, now, b"original"));
        assert_eq!(
            verify_signature(secret, &header, b"tampered", now),
            Err(SignatureError::NoMatchingSignature)
        );
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let secret = "whsec_test";
        let body = b"payload";
        let then = 1_700_000_000;
        let header = format!("t={then},v1={}", sign(secret, then, body));
        assert_eq!(
            verify_signature(secret, &header, body, then + TIMESTAMP_TOLERANCE_SECS + 1),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn rejects_non_ascii_signature_values_without_panicking() {
        let secret = "whsec_test";
        let body = b"payload";
        let now = 1_700_000_000;
        // a multibyte character of even byte length must not be sliced
        let header = format!("t={now},v1=€x");
        assert_eq!(
            verify_signature(secret, &header, body, now),
            Err(SignatureError::MalformedHeader)
        );
        // a garbage candidate next to a valid one is skipped, not fatal
        let header = format!("t={now},v1=€x,v1={}", sign(secret, now, body));
        assert_eq!(verify_signature(secret, &header, body, now), Ok(()));
    }

    #[test]
    fn rejects_a_malformed_header() {
        assert_eq!(
            verify_signature("whsec_test", "v1=aabb", b"x", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verify_signature("whsec_test", "t=123", b"x", 123),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn checkout_metadata_parses() {
        let object: CheckoutSessionObject = serde_json::from_str(
            r#"{
                "customer": "cus_123",
                "metadata": {"user_id": "6f0b8f7e-17a5-44f0-9d59-14573df17c4d", "pack": "medium"}
            }"#,
        )
        .unwrap();
        assert_eq!(object.customer.as_deref(), Some("cus_123"));
        assert_eq!(object.metadata.pack.as_deref(), Some("medium"));
        assert!(object.metadata.user_id.is_some());
    }

    #[test]
    fn invoice_plan_metadata_is_optional() {
        let invoice: InvoiceObject =
            serde_json::from_str(r#"{"customer": "cus_123"}"#).unwrap();
        assert!(invoice.subscription_details.is_none());

        let invoice: InvoiceObject = serde_json::from_str(
            r#"{"customer": "cus_123", "subscription_details": {"metadata": {"plan": "pro"}}}"#,
        )
        .unwrap();
        let plan = invoice
            .subscription_details
            .and_then(|d| d.metadata.plan)
            .map(|p| SubscriptionPlan::parse(&p));
        assert_eq!(plan, Some(SubscriptionPlan::Pro));
    }
}
