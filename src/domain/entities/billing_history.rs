use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::billing_history;

/// Append-only audit trail of every attempt, success and failure alike.
/// Kept independent of `payments` for reconciliation.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = billing_history)]
pub struct BillingHistoryEntity {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub status: String,
    pub amount_minor: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = billing_history)]
pub struct InsertBillingHistoryEntity {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub status: String,
    pub amount_minor: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}
