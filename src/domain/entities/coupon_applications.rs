use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::coupon_applications;

/// Binds one coupon to one subscription. At most one row per subscription
/// may have `is_active = true`; once `remaining_months` reaches zero the row
/// is deactivated for good.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = coupon_applications)]
pub struct CouponApplicationEntity {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub coupon_id: Uuid,
    pub applied_count: i32,
    pub remaining_months: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
