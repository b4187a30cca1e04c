use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::{StreamExt, stream};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{plans::PlanEntity, subscriptions::SubscriptionEntity},
        repositories::{billing::BillingRepository, plans::PlanRepository},
        value_objects::{
            billing::{
                BillingCandidate, BillingProfile, BillingRunReport, FailedCycle, SuccessfulCycle,
            },
            charges::{BillingKey, ChargeApproval, ChargeError, ChargeRequest},
            discounts::{CouponCycleState, DiscountBreakdown, discount_for},
            enums::{payment_statuses::PaymentStatus, recurring_statuses::RecurringStatus},
            renewals::{failure_transition, success_transition},
        },
    },
    notifications::{BillingNotification, Notifier},
    payments::{billing_key::BillingKeyCipher, gateway_client::BillingGatewayClient},
};

#[cfg(test)]
mod tests;

/// Charge-by-token gateway as the orchestrator sees it. One attempt per
/// call; the adapter never retries on its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        billing_key: &BillingKey,
        request: ChargeRequest,
    ) -> Result<ChargeApproval, ChargeError>;

    async fn find_approved_order(&self, order_id: &str) -> AnyResult<Option<ChargeApproval>>;
}

#[async_trait]
impl PaymentGateway for BillingGatewayClient {
    async fn charge(
        &self,
        billing_key: &BillingKey,
        request: ChargeRequest,
    ) -> Result<ChargeApproval, ChargeError> {
        self.charge_billing_key(billing_key, &request).await
    }

    async fn find_approved_order(&self, order_id: &str) -> AnyResult<Option<ChargeApproval>> {
        BillingGatewayClient::find_approved_order(self, order_id).await
    }
}

#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub currency: String,
    /// Upper bound on subscriptions pulled per pass; the rest wait for the
    /// next run.
    pub batch_size: i64,
    /// Concurrent in-flight cycles, bounded by gateway rate limits. 1 keeps
    /// the batch strictly sequential.
    pub max_in_flight: usize,
    /// Claims older than this are treated as abandoned by a crashed run.
    pub claim_ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Renewed,
    Failed,
    Skipped,
}

pub struct RecurringBillingUseCase<B, P, G>
where
    B: BillingRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    billing_repo: Arc<B>,
    plan_repo: Arc<P>,
    gateway: Arc<G>,
    cipher: Arc<BillingKeyCipher>,
    notifier: Notifier,
    settings: BillingSettings,
    worker_id: String,
}

impl<B, P, G> RecurringBillingUseCase<B, P, G>
where
    B: BillingRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    pub fn new(
        billing_repo: Arc<B>,
        plan_repo: Arc<P>,
        gateway: Arc<G>,
        cipher: Arc<BillingKeyCipher>,
        notifier: Notifier,
        settings: BillingSettings,
    ) -> Self {
        Self {
            billing_repo,
            plan_repo,
            gateway,
            cipher,
            notifier,
            settings,
            worker_id: format!("billing-worker-{}", Uuid::new_v4()),
        }
    }

    /// Main renewal pass: everything due for a regular renewal plus
    /// grace-period retries, one batch.
    pub async fn run_renewal_pass(
        &self,
        now: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> AnyResult<BillingRunReport> {
        let mut candidates = self
            .billing_repo
            .due_candidates(now, self.settings.batch_size)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "billing: failed to select due subscriptions");
                err
            })?;

        let retries = self
            .billing_repo
            .grace_period_candidates(now, self.settings.batch_size)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "billing: failed to select grace-period subscriptions");
                err
            })?;
        candidates.extend(retries);

        info!(
            candidate_count = candidates.len(),
            "billing: renewal pass selected"
        );
        Ok(self.process_batch(candidates, now, deadline).await)
    }

    /// Narrow pass re-attempting only grace-period subscriptions; meant to
    /// run on a tighter schedule than the full renewal pass.
    pub async fn run_grace_retry_pass(
        &self,
        now: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> AnyResult<BillingRunReport> {
        let candidates = self
            .billing_repo
            .grace_period_candidates(now, self.settings.batch_size)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "billing: failed to select grace-period subscriptions");
                err
            })?;

        info!(
            candidate_count = candidates.len(),
            "billing: grace retry pass selected"
        );
        Ok(self.process_batch(candidates, now, deadline).await)
    }

    async fn process_batch(
        &self,
        candidates: Vec<BillingCandidate>,
        now: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> BillingRunReport {
        let mut report = BillingRunReport {
            selected: candidates.len(),
            ..Default::default()
        };

        let outcomes = stream::iter(
            candidates
                .into_iter()
                .map(|candidate| self.process_candidate(candidate, now, deadline)),
        )
        .buffer_unordered(self.settings.max_in_flight.max(1))
        .collect::<Vec<CycleOutcome>>()
        .await;

        for outcome in outcomes {
            match outcome {
                CycleOutcome::Renewed => report.succeeded += 1,
                CycleOutcome::Failed => report.failed += 1,
                CycleOutcome::Skipped => report.skipped += 1,
            }
        }

        info!(
            selected = report.selected,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "billing: pass finished"
        );

        report
    }

    /// One subscription's failure must not abort the rest of the batch:
    /// every error is converted into an outcome here.
    async fn process_candidate(
        &self,
        candidate: BillingCandidate,
        now: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> CycleOutcome {
        let subscription_id = candidate.subscription.id;

        if deadline.is_some_and(|deadline| Utc::now() >= deadline) {
            info!(%subscription_id, "billing: pass deadline reached; leaving for the next run");
            return CycleOutcome::Skipped;
        }

        match self.bill_candidate(candidate, now).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    %subscription_id,
                    error = ?err,
                    "billing: cycle aborted by an internal error"
                );
                CycleOutcome::Failed
            }
        }
    }

    async fn bill_candidate(
        &self,
        candidate: BillingCandidate,
        now: DateTime<Utc>,
    ) -> AnyResult<CycleOutcome> {
        let subscription_id = candidate.subscription.id;

        let claimed = self
            .billing_repo
            .claim_for_billing(
                subscription_id,
                &self.worker_id,
                now,
                self.settings.claim_ttl,
            )
            .await?;

        let Some(subscription) = claimed else {
            info!(%subscription_id, "billing: subscription already claimed or no longer eligible");
            return Ok(CycleOutcome::Skipped);
        };

        match self
            .bill_claimed(&subscription, &candidate.profile, now)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Not a charge outcome, so no failure transition: drop the
                // claim and let the next pass try again.
                if let Err(release_err) = self.billing_repo.release_claim(subscription_id).await {
                    error!(
                        %subscription_id,
                        db_error = ?release_err,
                        "billing: failed to release claim after internal error"
                    );
                }
                Err(err)
            }
        }
    }

    async fn bill_claimed(
        &self,
        subscription: &SubscriptionEntity,
        profile: &BillingProfile,
        now: DateTime<Utc>,
    ) -> AnyResult<CycleOutcome> {
        let plan = self
            .plan_repo
            .find_by_id(subscription.plan_id)
            .await
            .map_err(|err| {
                error!(
                    subscription_id = %subscription.id,
                    plan_id = %subscription.plan_id,
                    db_error = ?err,
                    "billing: failed to load plan"
                );
                err
            })?;

        if let Some(order_id) = subscription.pending_order_id.clone() {
            if let Some(outcome) = self
                .reconcile_pending_order(subscription, &plan, &order_id, now)
                .await?
            {
                return Ok(outcome);
            }
        }

        let application = self
            .billing_repo
            .active_coupon_application(subscription.id)
            .await?;
        let coupon_state = application.as_ref().map(|(application, coupon)| {
            CouponCycleState {
                discount_percent: coupon.discount_percent,
                flat_discount_minor: coupon.flat_discount_minor,
                remaining_months: application.remaining_months,
            }
        });
        let breakdown = discount_for(plan.price_minor, coupon_state.as_ref());
        // The coupon governs this cycle only when it actually reduced it.
        let coupon_application_id = application
            .as_ref()
            .filter(|_| breakdown.discount_minor > 0)
            .map(|(application, _)| application.id);

        let order_id = format!("bill-{}", Uuid::new_v4());
        self.billing_repo
            .mark_attempt_started(subscription.id, &order_id)
            .await?;

        info!(
            subscription_id = %subscription.id,
            order_id = %order_id,
            original_amount = plan.price_minor,
            discount = breakdown.discount_minor,
            amount = breakdown.final_minor,
            coupon_applied = coupon_application_id.is_some(),
            "billing: charging cycle"
        );

        match self
            .charge_or_waive(subscription, profile, &plan, &breakdown, coupon_application_id.is_some(), &order_id, now)
            .await
        {
            Ok(approval) => {
                self.settle_success(
                    subscription,
                    &plan,
                    &breakdown,
                    coupon_application_id,
                    approval,
                    now,
                )
                .await
            }
            Err(charge_error) => {
                self.settle_failure(subscription, &breakdown, &order_id, charge_error, now)
                    .await
            }
        }
    }

    /// Zero-amount cycles produced by a coupon never reach the network; a
    /// missing billing key fails fast before any call.
    async fn charge_or_waive(
        &self,
        subscription: &SubscriptionEntity,
        profile: &BillingProfile,
        plan: &PlanEntity,
        breakdown: &DiscountBreakdown,
        coupon_applied: bool,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ChargeApproval, ChargeError> {
        if coupon_applied && breakdown.final_minor == 0 {
            info!(
                subscription_id = %subscription.id,
                order_id,
                "billing: cycle fully discounted; gateway call waived"
            );
            return Ok(ChargeApproval::waived(order_id.to_string(), now));
        }

        let Some(billing_key_enc) = profile.billing_key_enc.as_deref() else {
            return Err(ChargeError::NoPaymentMethod);
        };

        // Decrypted at the last moment and dropped right after the call.
        let billing_key = self.cipher.decrypt(billing_key_enc).map_err(|err| {
            error!(
                subscription_id = %subscription.id,
                error = %err,
                "billing: stored billing key is unusable"
            );
            ChargeError::NoPaymentMethod
        })?;

        let request = ChargeRequest {
            customer_key: profile.customer_key.clone(),
            amount_minor: breakdown.final_minor,
            currency: self.settings.currency.clone(),
            order_id: order_id.to_string(),
            order_name: format!("{} renewal", plan.name),
            customer_email: profile.email.clone(),
            customer_name: profile.name.clone(),
        };

        self.gateway.charge(&billing_key, request).await
    }

    async fn settle_success(
        &self,
        subscription: &SubscriptionEntity,
        plan: &PlanEntity,
        breakdown: &DiscountBreakdown,
        coupon_application_id: Option<Uuid>,
        approval: ChargeApproval,
        now: DateTime<Utc>,
    ) -> AnyResult<CycleOutcome> {
        let waived = approval.is_waived();
        let cycle = SuccessfulCycle {
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            order_id: approval.order_id.clone(),
            original_amount_minor: plan.price_minor,
            discount_minor: breakdown.discount_minor,
            amount_minor: approval.amount_minor,
            coupon_application_id,
            payment_status: if waived {
                PaymentStatus::Waived
            } else {
                PaymentStatus::Paid
            },
            gateway_payment_key: Some(approval.payment_key.clone()),
            approved_at: approval.approved_at,
            transition: success_transition(now, plan.duration_days),
        };

        self.billing_repo
            .record_cycle_success(cycle)
            .await
            .map_err(|err| {
                // The charge went through; the dangling order id left on the
                // subscription lets the next pass reconcile instead of
                // charging twice.
                error!(
                    subscription_id = %subscription.id,
                    order_id = %approval.order_id,
                    db_error = ?err,
                    "billing: ledger write failed after a successful charge"
                );
                err
            })?;

        info!(
            subscription_id = %subscription.id,
            order_id = %approval.order_id,
            amount = approval.amount_minor,
            waived,
            "billing: cycle renewed"
        );

        self.notifier.try_notify(if waived {
            BillingNotification::RenewalWaived {
                user_id: subscription.user_id,
                subscription_id: subscription.id,
            }
        } else {
            BillingNotification::RenewalCharged {
                user_id: subscription.user_id,
                subscription_id: subscription.id,
                amount_minor: approval.amount_minor,
                approved_at: approval.approved_at,
            }
        });

        Ok(CycleOutcome::Renewed)
    }

    async fn settle_failure(
        &self,
        subscription: &SubscriptionEntity,
        breakdown: &DiscountBreakdown,
        order_id: &str,
        charge_error: ChargeError,
        now: DateTime<Utc>,
    ) -> AnyResult<CycleOutcome> {
        let transition = failure_transition(subscription.failed_attempts, now);

        warn!(
            subscription_id = %subscription.id,
            order_id,
            error_code = charge_error.code(),
            failed_attempts = transition.failed_attempts,
            recurring_status = %transition.recurring_status,
            "billing: charge attempt failed"
        );

        let cycle = FailedCycle {
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            order_id: order_id.to_string(),
            amount_minor: breakdown.final_minor,
            error_code: charge_error.code().to_string(),
            error_message: charge_error.to_string(),
            attempted_at: now,
            transition,
        };

        self.billing_repo.record_cycle_failure(cycle).await?;

        self.notifier
            .try_notify(if transition.recurring_status == RecurringStatus::Canceled {
                BillingNotification::SubscriptionCanceled {
                    user_id: subscription.user_id,
                    subscription_id: subscription.id,
                }
            } else {
                BillingNotification::PaymentFailed {
                    user_id: subscription.user_id,
                    subscription_id: subscription.id,
                    error_code: charge_error.code().to_string(),
                    grace_period_end: transition.grace_period_end,
                }
            });

        Ok(CycleOutcome::Failed)
    }

    /// Before re-charging a cycle whose ledger write may have been lost,
    /// ask the gateway about the dangling order.
    async fn reconcile_pending_order(
        &self,
        subscription: &SubscriptionEntity,
        plan: &PlanEntity,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> AnyResult<Option<CycleOutcome>> {
        if self
            .billing_repo
            .find_payment_by_order(order_id)
            .await?
            .is_some()
        {
            // Already in the ledger; the pointer is leftover state and the
            // fresh cycle proceeds normally.
            return Ok(None);
        }

        let approval = self.gateway.find_approved_order(order_id).await?;
        let Some(approval) = approval else {
            info!(
                subscription_id = %subscription.id,
                order_id,
                "billing: dangling order was never approved; charging fresh"
            );
            return Ok(None);
        };

        warn!(
            subscription_id = %subscription.id,
            order_id,
            amount = approval.amount_minor,
            "billing: recovering a charged but unrecorded cycle"
        );

        let discount_minor = (plan.price_minor - approval.amount_minor).max(0);
        let application = self
            .billing_repo
            .active_coupon_application(subscription.id)
            .await?;
        let coupon_application_id = application
            .filter(|_| discount_minor > 0)
            .map(|(application, _)| application.id);

        let waived = approval.is_waived();
        let cycle = SuccessfulCycle {
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            order_id: approval.order_id.clone(),
            original_amount_minor: plan.price_minor,
            discount_minor,
            amount_minor: approval.amount_minor,
            coupon_application_id,
            payment_status: if waived {
                PaymentStatus::Waived
            } else {
                PaymentStatus::Paid
            },
            gateway_payment_key: Some(approval.payment_key.clone()),
            approved_at: approval.approved_at,
            transition: success_transition(now, plan.duration_days),
        };

        self.billing_repo.record_cycle_success(cycle).await?;

        self.notifier.try_notify(BillingNotification::RenewalCharged {
            user_id: subscription.user_id,
            subscription_id: subscription.id,
            amount_minor: approval.amount_minor,
            approved_at: approval.approved_at,
        });

        Ok(Some(CycleOutcome::Renewed))
    }
}
