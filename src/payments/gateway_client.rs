use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::value_objects::charges::{BillingKey, ChargeApproval, ChargeError, ChargeRequest};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    /// External latency is unbounded; every call gets this client timeout.
    pub timeout: Duration,
}

/// Minimal charge-by-token client built on reqwest. One attempt per call;
/// retry policy lives with the caller.
pub struct BillingGatewayClient {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeBody<'a> {
    customer_key: &'a str,
    amount: i32,
    currency: &'a str,
    order_id: &'a str,
    order_name: &'a str,
    customer_email: &'a str,
    customer_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeResponse {
    payment_key: String,
    order_id: String,
    amount: Option<i64>,
    total_amount: Option<i64>,
    #[allow(dead_code)]
    method: Option<String>,
    approved_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorEnvelope {
    code: Option<String>,
    message: Option<String>,
}

impl BillingGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let authorization = format!(
            "Basic {}",
            BASE64.encode(format!("{}:", config.secret_key))
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    /// `POST /billing/{billingKey}`. The billing key only ever appears in
    /// the request path; log fields carry the order id instead.
    pub async fn charge_billing_key(
        &self,
        billing_key: &BillingKey,
        request: &ChargeRequest,
    ) -> Result<ChargeApproval, ChargeError> {
        let url = format!("{}/billing/{}", self.base_url, billing_key.expose());
        let body = ChargeBody {
            customer_key: &request.customer_key,
            amount: request.amount_minor,
            currency: &request.currency,
            order_id: &request.order_id,
            order_name: &request.order_name,
            customer_email: &request.customer_email,
            customer_name: &request.customer_name,
        };

        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| Self::transport_error(err, &request.order_id))?;

        Self::parse_charge_response(resp, &request.order_id, request.amount_minor).await
    }

    /// Looks up a previously submitted order, used to reconcile attempts
    /// whose ledger write never completed. `None` means the gateway has no
    /// approved charge under this order id.
    pub async fn find_approved_order(&self, order_id: &str) -> Result<Option<ChargeApproval>> {
        let url = format!("{}/billing/orders/{}", self.base_url, order_id);

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(
                order_id,
                status = %status,
                response_body = %body,
                "gateway order lookup failed"
            );
            anyhow::bail!("gateway order lookup failed for {} (status {})", order_id, status);
        }

        let parsed: ChargeResponse = resp.json().await?;
        Ok(Some(Self::approval_from(parsed, 0)))
    }

    async fn parse_charge_response(
        resp: reqwest::Response,
        order_id: &str,
        requested_amount: i32,
    ) -> Result<ChargeApproval, ChargeError> {
        let status = resp.status();

        if status.is_success() {
            let parsed: ChargeResponse = resp.json().await.map_err(|err| {
                error!(order_id, error = %err, "gateway returned an unreadable success body");
                ChargeError::Unavailable("unreadable gateway response".to_string())
            })?;
            return Ok(Self::approval_from(parsed, requested_amount));
        }

        let body = resp.text().await.unwrap_or_default();
        let envelope: GatewayErrorEnvelope =
            serde_json::from_str(&body).unwrap_or(GatewayErrorEnvelope {
                code: None,
                message: None,
            });

        error!(
            order_id,
            status = %status,
            gateway_error_code = ?envelope.code,
            gateway_error_message = ?envelope.message,
            "gateway charge request failed"
        );

        if status.is_server_error() {
            return Err(ChargeError::Unavailable(format!(
                "gateway responded with status {status}"
            )));
        }

        Err(ChargeError::Declined {
            code: envelope.code.unwrap_or_else(|| "GATEWAY_DECLINED".to_string()),
            message: envelope
                .message
                .unwrap_or_else(|| format!("gateway responded with status {status}")),
        })
    }

    fn transport_error(err: reqwest::Error, order_id: &str) -> ChargeError {
        if err.is_timeout() {
            error!(order_id, "gateway charge request timed out");
            return ChargeError::Timeout;
        }
        error!(order_id, error = %err, "gateway unreachable");
        ChargeError::Unavailable(err.to_string())
    }

    fn approval_from(parsed: ChargeResponse, fallback_amount: i32) -> ChargeApproval {
        let amount_minor = parsed
            .amount
            .or(parsed.total_amount)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(fallback_amount);
        let approved_at = parsed
            .approved_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        ChargeApproval {
            payment_key: parsed.payment_key,
            order_id: parsed.order_id,
            amount_minor,
            approved_at,
        }
    }
}
