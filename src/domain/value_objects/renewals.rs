use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    entities::subscriptions::SubscriptionEntity,
    value_objects::enums::recurring_statuses::RecurringStatus,
};

/// Consecutive failures tolerated before the renewal is canceled for good.
pub const MAX_FAILED_ATTEMPTS: i32 = 3;
/// Window after a failed charge during which retries are still permitted.
pub const GRACE_PERIOD_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTransition {
    pub failed_attempts: i32,
    pub recurring_status: RecurringStatus,
    pub grace_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessTransition {
    pub last_billing_at: DateTime<Utc>,
    pub next_billing_at: DateTime<Utc>,
}

/// State after one more failed charge attempt. The third consecutive failure
/// is terminal; earlier ones open (or extend) the grace period.
pub fn failure_transition(prior_failed_attempts: i32, now: DateTime<Utc>) -> FailureTransition {
    let failed_attempts = prior_failed_attempts + 1;

    if failed_attempts >= MAX_FAILED_ATTEMPTS {
        FailureTransition {
            failed_attempts,
            recurring_status: RecurringStatus::Canceled,
            grace_period_end: None,
        }
    } else {
        FailureTransition {
            failed_attempts,
            recurring_status: RecurringStatus::PendingPayment,
            grace_period_end: Some(now + Duration::days(GRACE_PERIOD_DAYS)),
        }
    }
}

/// State after a successful charge from any non-terminal state: counters
/// reset and the next cycle is scheduled one plan duration out.
pub fn success_transition(now: DateTime<Utc>, plan_duration_days: i32) -> SuccessTransition {
    SuccessTransition {
        last_billing_at: now,
        next_billing_at: now + Duration::days(plan_duration_days as i64),
    }
}

/// A subscription in grace may be retried only while the window is open and
/// the attempt budget is not exhausted.
pub fn retry_eligible(subscription: &SubscriptionEntity, now: DateTime<Utc>) -> bool {
    RecurringStatus::from_str(&subscription.recurring_status) == RecurringStatus::PendingPayment
        && subscription.failed_attempts < MAX_FAILED_ATTEMPTS
        && subscription
            .grace_period_end
            .is_some_and(|deadline| now < deadline)
}

/// Due for a regular renewal: healthy, auto-renew on, billing date reached.
pub fn due_for_renewal(subscription: &SubscriptionEntity, now: DateTime<Utc>) -> bool {
    RecurringStatus::from_str(&subscription.recurring_status) == RecurringStatus::Active
        && subscription.auto_renew
        && subscription.next_billing_at <= now
}
