use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::{
        coupon_applications::CouponApplicationEntity, coupons::DiscountCouponEntity,
        payments::PaymentEntity, subscriptions::SubscriptionEntity,
    },
    value_objects::billing::{BillingCandidate, FailedCycle, SuccessfulCycle},
};

#[automock]
#[async_trait]
pub trait BillingRepository {
    /// Subscriptions due for a regular renewal whose owner has a stored
    /// billing key.
    async fn due_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BillingCandidate>>;

    /// Subscriptions in grace period still eligible for a retry.
    async fn grace_period_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BillingCandidate>>;

    /// Single-row claim taken before charging so overlapping passes cannot
    /// double-charge. Returns the claimed row, or `None` when another worker
    /// holds a fresh claim or the subscription is no longer eligible.
    /// Claims older than `claim_ttl` count as abandoned and may be retaken.
    async fn claim_for_billing(
        &self,
        subscription_id: Uuid,
        worker_id: &str,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Drops a claim without recording an outcome (early-exit paths only;
    /// the ledger writes release the claim themselves).
    async fn release_claim(&self, subscription_id: Uuid) -> Result<()>;

    /// Persists the order id of the attempt about to be charged, so a crash
    /// between charge and ledger write can be reconciled later.
    async fn mark_attempt_started(&self, subscription_id: Uuid, order_id: &str) -> Result<()>;

    /// The active coupon application governing this subscription's next
    /// cycle, if any, joined with its coupon.
    async fn active_coupon_application(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<(CouponApplicationEntity, DiscountCouponEntity)>>;

    async fn find_payment_by_order(&self, order_id: &str) -> Result<Option<PaymentEntity>>;

    /// Atomic ledger write for a successful cycle: payment row, subscription
    /// advance, history row, coupon decrement. Returns the payment id.
    async fn record_cycle_success(&self, cycle: SuccessfulCycle) -> Result<Uuid>;

    /// Atomic ledger write for a failed attempt: failure transition plus a
    /// history row.
    async fn record_cycle_failure(&self, cycle: FailedCycle) -> Result<()>;
}
