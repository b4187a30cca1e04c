use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::users;

/// Billing-facing slice of the account system's user record.
/// `billing_key_enc` holds the gateway billing key as AES-GCM ciphertext;
/// it is decrypted in-process right before a charge and never logged.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = users)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub customer_key: String,
    pub billing_key_enc: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
