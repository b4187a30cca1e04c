use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::payments;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub amount_minor: i32,
    pub original_amount_minor: i32,
    pub discount_minor: i32,
    pub coupon_application_id: Option<Uuid>,
    pub status: String,
    pub gateway_payment_key: Option<String>,
    pub approved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub amount_minor: i32,
    pub original_amount_minor: i32,
    pub discount_minor: i32,
    pub coupon_application_id: Option<Uuid>,
    pub status: String,
    pub gateway_payment_key: Option<String>,
    pub approved_at: DateTime<Utc>,
}
