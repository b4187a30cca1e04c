use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::subscriptions;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub recurring_status: String,
    pub auto_renew: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub next_billing_at: DateTime<Utc>,
    pub last_billing_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub last_failure_reason: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub grace_period_end: Option<DateTime<Utc>>,
    /// Order id of a charge attempt whose ledger write has not completed yet.
    /// A dangling value means a prior run may have charged without recording.
    pub pending_order_id: Option<String>,
    pub billing_locked_at: Option<DateTime<Utc>>,
    pub billing_locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
