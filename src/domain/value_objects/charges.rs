use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reference prefix marking a cycle that was settled without contacting the
/// gateway (100%-discount cycles).
pub const WAIVED_REFERENCE_PREFIX: &str = "waived-";

/// Decrypted gateway billing key. Redacted from `Debug` so it can never leak
/// through logs or error chains.
#[derive(Clone)]
pub struct BillingKey(String);

impl BillingKey {
    pub fn new(raw: String) -> Self {
        Self(raw)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BillingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BillingKey([redacted])")
    }
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub customer_key: String,
    pub amount_minor: i32,
    pub currency: String,
    pub order_id: String,
    pub order_name: String,
    pub customer_email: String,
    pub customer_name: String,
}

#[derive(Debug, Clone)]
pub struct ChargeApproval {
    pub payment_key: String,
    pub order_id: String,
    pub amount_minor: i32,
    pub approved_at: DateTime<Utc>,
}

impl ChargeApproval {
    /// Synthesized approval for a fully discounted cycle; keeps the
    /// bookkeeping path uniform with real charges.
    pub fn waived(order_id: String, approved_at: DateTime<Utc>) -> Self {
        Self {
            payment_key: format!("{WAIVED_REFERENCE_PREFIX}{order_id}"),
            order_id,
            amount_minor: 0,
            approved_at,
        }
    }

    pub fn is_waived(&self) -> bool {
        self.payment_key.starts_with(WAIVED_REFERENCE_PREFIX)
    }
}

/// Normalized charge failure. Every variant counts toward the consecutive
/// failure budget; none is retried inside the adapter itself.
#[derive(Debug, Error)]
pub enum ChargeError {
    #[error("user has no stored payment method")]
    NoPaymentMethod,
    #[error("gateway declined the charge ({code}): {message}")]
    Declined { code: String, message: String },
    #[error("gateway call timed out")]
    Timeout,
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl ChargeError {
    /// Machine-readable code recorded in the billing history.
    pub fn code(&self) -> &str {
        match self {
            ChargeError::NoPaymentMethod => "NO_PAYMENT_METHOD",
            ChargeError::Declined { code, .. } => code,
            ChargeError::Timeout => "GATEWAY_TIMEOUT",
            ChargeError::Unavailable(_) => "GATEWAY_UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_key_debug_is_redacted() {
        let key = BillingKey::new("bk_live_secret".to_string());
        assert_eq!(format!("{key:?}"), "BillingKey([redacted])");
        assert_eq!(key.expose(), "bk_live_secret");
    }

    #[test]
    fn waived_approval_is_marked() {
        let approval = ChargeApproval::waived("bill-1".to_string(), Utc::now());
        assert!(approval.is_waived());
        assert_eq!(approval.amount_minor, 0);
        assert_eq!(approval.payment_key, "waived-bill-1");
    }

    #[test]
    fn charge_error_codes() {
        assert_eq!(ChargeError::NoPaymentMethod.code(), "NO_PAYMENT_METHOD");
        assert_eq!(ChargeError::Timeout.code(), "GATEWAY_TIMEOUT");
        assert_eq!(
            ChargeError::Declined {
                code: "INVALID_CARD".to_string(),
                message: "card expired".to_string(),
            }
            .code(),
            "INVALID_CARD"
        );
    }
}
