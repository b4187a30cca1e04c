use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::SubscriptionEntity,
    value_objects::{
        enums::payment_statuses::PaymentStatus,
        renewals::{FailureTransition, SuccessTransition},
    },
};

/// Billing-facing user fields carried alongside a selected subscription.
#[derive(Debug, Clone)]
pub struct BillingProfile {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub customer_key: String,
    pub billing_key_enc: Option<String>,
}

/// One subscription selected for a billing pass.
#[derive(Debug, Clone)]
pub struct BillingCandidate {
    pub subscription: SubscriptionEntity,
    pub profile: BillingProfile,
}

/// Everything the ledger writer persists for one successful cycle,
/// committed as a single transaction.
#[derive(Debug, Clone)]
pub struct SuccessfulCycle {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub original_amount_minor: i32,
    pub discount_minor: i32,
    pub amount_minor: i32,
    pub coupon_application_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub gateway_payment_key: Option<String>,
    pub approved_at: DateTime<Utc>,
    pub transition: SuccessTransition,
}

/// Failure counterpart: state transition plus an audit row, no payment and
/// no coupon mutation.
#[derive(Debug, Clone)]
pub struct FailedCycle {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub amount_minor: i32,
    pub error_code: String,
    pub error_message: String,
    pub attempted_at: DateTime<Utc>,
    pub transition: FailureTransition,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BillingRunReport {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}
