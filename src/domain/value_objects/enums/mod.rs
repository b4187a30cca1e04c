pub mod billing_attempt_statuses;
pub mod payment_statuses;
pub mod recurring_statuses;
pub mod subscription_statuses;
