use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::discount_coupons;

/// Exactly one of `discount_percent` / `flat_discount_minor` is non-zero.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = discount_coupons)]
pub struct DiscountCouponEntity {
    pub id: Uuid,
    pub code: String,
    pub discount_percent: i32,
    pub flat_discount_minor: i32,
    pub deadline: DateTime<Utc>,
    pub is_active: bool,
    pub recurring_months: Option<i32>,
    pub created_at: DateTime<Utc>,
}
