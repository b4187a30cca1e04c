use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::{insert_into, prelude::*, update};
use tracing::warn;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            billing_history::InsertBillingHistoryEntity,
            coupon_applications::CouponApplicationEntity,
            coupons::DiscountCouponEntity,
            payments::{InsertPaymentEntity, PaymentEntity},
            subscriptions::SubscriptionEntity,
            users::UserEntity,
        },
        repositories::billing::BillingRepository,
        value_objects::{
            billing::{BillingCandidate, BillingProfile, FailedCycle, SuccessfulCycle},
            enums::{
                billing_attempt_statuses::BillingAttemptStatus,
                recurring_statuses::RecurringStatus,
            },
            renewals::{self, due_for_renewal, retry_eligible},
        },
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{
            billing_history, coupon_applications, discount_coupons, payments, subscriptions, users,
        },
    },
};

pub struct BillingPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl BillingPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    fn to_candidates(rows: Vec<(SubscriptionEntity, UserEntity)>) -> Vec<BillingCandidate> {
        rows.into_iter()
            .map(|(subscription, user)| BillingCandidate {
                subscription,
                profile: BillingProfile {
                    user_id: user.id,
                    email: user.email,
                    name: user.name,
                    customer_key: user.customer_key,
                    billing_key_enc: user.billing_key_enc,
                },
            })
            .collect()
    }
}

#[async_trait]
impl BillingRepository for BillingPostgres {
    async fn due_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BillingCandidate>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = subscriptions::table
            .inner_join(users::table)
            .filter(subscriptions::recurring_status.eq(RecurringStatus::Active.as_str()))
            .filter(subscriptions::auto_renew.eq(true))
            .filter(subscriptions::next_billing_at.le(now))
            .filter(users::billing_key_enc.is_not_null())
            .order(subscriptions::next_billing_at.asc())
            .limit(limit)
            .select((SubscriptionEntity::as_select(), UserEntity::as_select()))
            .load::<(SubscriptionEntity, UserEntity)>(&mut conn)?;

        Ok(Self::to_candidates(rows))
    }

    async fn grace_period_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BillingCandidate>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = subscriptions::table
            .inner_join(users::table)
            .filter(subscriptions::recurring_status.eq(RecurringStatus::PendingPayment.as_str()))
            .filter(subscriptions::grace_period_end.gt(now))
            .filter(subscriptions::failed_attempts.lt(renewals::MAX_FAILED_ATTEMPTS))
            .order(subscriptions::grace_period_end.asc())
            .limit(limit)
            .select((SubscriptionEntity::as_select(), UserEntity::as_select()))
            .load::<(SubscriptionEntity, UserEntity)>(&mut conn)?;

        Ok(Self::to_candidates(rows))
    }

    async fn claim_for_billing(
        &self,
        subscription_id: Uuid,
        worker_id: &str,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let stale_before = now - claim_ttl;
        let worker_id = worker_id.to_string();

        let claimed = conn.transaction::<Option<SubscriptionEntity>, diesel::result::Error, _>(
            |conn| {
                let candidate: Option<SubscriptionEntity> = subscriptions::table
                    .find(subscription_id)
                    .select(SubscriptionEntity::as_select())
                    .for_update()
                    .skip_locked()
                    .first::<SubscriptionEntity>(conn)
                    .optional()?;

                let Some(subscription) = candidate else {
                    return Ok(None);
                };

                // A fresh claim from another worker wins; stale ones are
                // abandoned leftovers from a crashed run.
                if subscription
                    .billing_locked_at
                    .is_some_and(|locked_at| locked_at > stale_before)
                {
                    return Ok(None);
                }

                // Re-check eligibility under the row lock: the subscription
                // may have been billed between selection and claim.
                if !due_for_renewal(&subscription, now) && !retry_eligible(&subscription, now) {
                    return Ok(None);
                }

                let updated = update(subscriptions::table.find(subscription_id))
                    .set((
                        subscriptions::billing_locked_at.eq(Some(now)),
                        subscriptions::billing_locked_by.eq(Some(worker_id.clone())),
                        subscriptions::updated_at.eq(now),
                    ))
                    .returning(SubscriptionEntity::as_returning())
                    .get_result::<SubscriptionEntity>(conn)?;

                Ok(Some(updated))
            },
        )?;

        Ok(claimed)
    }

    async fn release_claim(&self, subscription_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.find(subscription_id))
            .set((
                subscriptions::billing_locked_at.eq::<Option<DateTime<Utc>>>(None),
                subscriptions::billing_locked_by.eq::<Option<String>>(None),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_attempt_started(&self, subscription_id: Uuid, order_id: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.find(subscription_id))
            .set(subscriptions::pending_order_id.eq(Some(order_id.to_string())))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn active_coupon_application(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<(CouponApplicationEntity, DiscountCouponEntity)>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let mut rows = coupon_applications::table
            .inner_join(discount_coupons::table)
            .filter(coupon_applications::subscription_id.eq(subscription_id))
            .filter(coupon_applications::is_active.eq(true))
            .order(coupon_applications::created_at.asc())
            .select((
                CouponApplicationEntity::as_select(),
                DiscountCouponEntity::as_select(),
            ))
            .load::<(CouponApplicationEntity, DiscountCouponEntity)>(&mut conn)?;

        if rows.len() > 1 {
            warn!(
                %subscription_id,
                active_applications = rows.len(),
                "multiple active coupon applications; using the oldest"
            );
        }

        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn find_payment_by_order(&self, order_id: &str) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .filter(payments::order_id.eq(order_id))
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
    }

    async fn record_cycle_success(&self, cycle: SuccessfulCycle) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let transition = cycle.transition;

        let payment_id = conn.transaction::<Uuid, diesel::result::Error, _>(|conn| {
            let payment_id = insert_into(payments::table)
                .values(&InsertPaymentEntity {
                    subscription_id: cycle.subscription_id,
                    user_id: cycle.user_id,
                    order_id: cycle.order_id.clone(),
                    amount_minor: cycle.amount_minor,
                    original_amount_minor: cycle.original_amount_minor,
                    discount_minor: cycle.discount_minor,
                    coupon_application_id: cycle.coupon_application_id,
                    status: cycle.payment_status.to_string(),
                    gateway_payment_key: cycle.gateway_payment_key.clone(),
                    approved_at: cycle.approved_at,
                })
                .returning(payments::id)
                .get_result::<Uuid>(conn)?;

            update(subscriptions::table.find(cycle.subscription_id))
                .set((
                    subscriptions::recurring_status.eq(RecurringStatus::Active.as_str()),
                    subscriptions::failed_attempts.eq(0),
                    subscriptions::last_failure_reason.eq::<Option<String>>(None),
                    subscriptions::last_failure_at.eq::<Option<DateTime<Utc>>>(None),
                    subscriptions::grace_period_end.eq::<Option<DateTime<Utc>>>(None),
                    subscriptions::last_billing_at.eq(Some(transition.last_billing_at)),
                    subscriptions::next_billing_at.eq(transition.next_billing_at),
                    subscriptions::pending_order_id.eq::<Option<String>>(None),
                    subscriptions::billing_locked_at.eq::<Option<DateTime<Utc>>>(None),
                    subscriptions::billing_locked_by.eq::<Option<String>>(None),
                    subscriptions::updated_at.eq(transition.last_billing_at),
                ))
                .execute(conn)?;

            insert_into(billing_history::table)
                .values(&InsertBillingHistoryEntity {
                    subscription_id: cycle.subscription_id,
                    user_id: cycle.user_id,
                    order_id: cycle.order_id.clone(),
                    status: BillingAttemptStatus::Success.to_string(),
                    amount_minor: cycle.amount_minor,
                    error_code: None,
                    error_message: None,
                    attempted_at: transition.last_billing_at,
                })
                .execute(conn)?;

            if let Some(application_id) = cycle.coupon_application_id {
                let application: CouponApplicationEntity = coupon_applications::table
                    .find(application_id)
                    .select(CouponApplicationEntity::as_select())
                    .for_update()
                    .first::<CouponApplicationEntity>(conn)?;

                let remaining_months = application.remaining_months.map(|months| months - 1);
                // Deactivates exactly when the post-decrement count hits 0;
                // unlimited coupons (NULL) never deactivate this way.
                let still_active = remaining_months.map_or(true, |months| months > 0);

                update(coupon_applications::table.find(application_id))
                    .set((
                        coupon_applications::applied_count.eq(application.applied_count + 1),
                        coupon_applications::remaining_months.eq(remaining_months),
                        coupon_applications::is_active.eq(application.is_active && still_active),
                        coupon_applications::updated_at.eq(transition.last_billing_at),
                    ))
                    .execute(conn)?;
            }

            Ok(payment_id)
        })?;

        Ok(payment_id)
    }

    async fn record_cycle_failure(&self, cycle: FailedCycle) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let transition = cycle.transition;

        conn.transaction::<(), diesel::result::Error, _>(|conn| {
            update(subscriptions::table.find(cycle.subscription_id))
                .set((
                    subscriptions::recurring_status.eq(transition.recurring_status.as_str()),
                    subscriptions::failed_attempts.eq(transition.failed_attempts),
                    subscriptions::last_failure_reason.eq(Some(cycle.error_code.clone())),
                    subscriptions::last_failure_at.eq(Some(cycle.attempted_at)),
                    subscriptions::grace_period_end.eq(transition.grace_period_end),
                    subscriptions::pending_order_id.eq::<Option<String>>(None),
                    subscriptions::billing_locked_at.eq::<Option<DateTime<Utc>>>(None),
                    subscriptions::billing_locked_by.eq::<Option<String>>(None),
                    subscriptions::updated_at.eq(cycle.attempted_at),
                ))
                .execute(conn)?;

            insert_into(billing_history::table)
                .values(&InsertBillingHistoryEntity {
                    subscription_id: cycle.subscription_id,
                    user_id: cycle.user_id,
                    order_id: cycle.order_id.clone(),
                    status: BillingAttemptStatus::Failed.to_string(),
                    amount_minor: cycle.amount_minor,
                    error_code: Some(cycle.error_code.clone()),
                    error_message: Some(cycle.error_message.clone()),
                    attempted_at: cycle.attempted_at,
                })
                .execute(conn)?;

            Ok(())
        })?;

        Ok(())
    }
}
