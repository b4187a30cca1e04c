use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{BillingSettings, MockPaymentGateway, RecurringBillingUseCase};
use crate::{
    domain::{
        entities::{
            coupon_applications::CouponApplicationEntity, coupons::DiscountCouponEntity,
            plans::PlanEntity, subscriptions::SubscriptionEntity,
        },
        repositories::{billing::MockBillingRepository, plans::MockPlanRepository},
        value_objects::{
            billing::{BillingCandidate, BillingProfile},
            charges::{BillingKey, ChargeApproval, ChargeError},
            enums::{
                payment_statuses::PaymentStatus, recurring_statuses::RecurringStatus,
            },
        },
    },
    notifications::Notifier,
    payments::billing_key::BillingKeyCipher,
};

const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
const RAW_BILLING_KEY: &str = "bk_live_test";

fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

fn billing_time() -> DateTime<Utc> {
    at("2026-03-01T03:00:00Z")
}

fn cipher() -> Arc<BillingKeyCipher> {
    Arc::new(BillingKeyCipher::from_hex(KEY_HEX).unwrap())
}

fn encrypted_billing_key(cipher: &BillingKeyCipher) -> String {
    cipher
        .encrypt(&BillingKey::new(RAW_BILLING_KEY.to_string()))
        .unwrap()
}

fn plan(price_minor: i32) -> PlanEntity {
    PlanEntity {
        id: Uuid::new_v4(),
        name: "Premium".to_string(),
        price_minor,
        duration_days: 30,
        is_active: true,
        created_at: at("2026-01-01T00:00:00Z"),
    }
}

fn subscription(plan_id: Uuid) -> SubscriptionEntity {
    let starts_at = at("2026-02-01T00:00:00Z");
    SubscriptionEntity {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        plan_id,
        status: "active".to_string(),
        recurring_status: RecurringStatus::Active.as_str().to_string(),
        auto_renew: true,
        starts_at,
        ends_at: at("2026-03-03T00:00:00Z"),
        next_billing_at: billing_time(),
        last_billing_at: Some(starts_at),
        failed_attempts: 0,
        last_failure_reason: None,
        last_failure_at: None,
        grace_period_end: None,
        pending_order_id: None,
        billing_locked_at: None,
        billing_locked_by: None,
        created_at: starts_at,
        updated_at: starts_at,
    }
}

fn candidate(subscription: &SubscriptionEntity, billing_key_enc: Option<String>) -> BillingCandidate {
    BillingCandidate {
        subscription: subscription.clone(),
        profile: BillingProfile {
            user_id: subscription.user_id,
            email: "learner@example.com".to_string(),
            name: "Learner".to_string(),
            customer_key: format!("cust-{}", subscription.user_id),
            billing_key_enc,
        },
    }
}

fn percent_coupon(percent: i32) -> DiscountCouponEntity {
    DiscountCouponEntity {
        id: Uuid::new_v4(),
        code: "LAUNCH".to_string(),
        discount_percent: percent,
        flat_discount_minor: 0,
        deadline: at("2026-12-31T00:00:00Z"),
        is_active: true,
        recurring_months: Some(3),
        created_at: at("2026-01-01T00:00:00Z"),
    }
}

fn application(subscription_id: Uuid, coupon_id: Uuid, remaining: Option<i32>) -> CouponApplicationEntity {
    CouponApplicationEntity {
        id: Uuid::new_v4(),
        subscription_id,
        coupon_id,
        applied_count: 0,
        remaining_months: remaining,
        is_active: true,
        created_at: at("2026-02-01T00:00:00Z"),
        updated_at: at("2026-02-01T00:00:00Z"),
    }
}

fn settings() -> BillingSettings {
    BillingSettings {
        currency: "KRW".to_string(),
        batch_size: 100,
        max_in_flight: 1,
        claim_ttl: Duration::minutes(10),
    }
}

fn usecase(
    billing_repo: MockBillingRepository,
    plan_repo: MockPlanRepository,
    gateway: MockPaymentGateway,
) -> RecurringBillingUseCase<MockBillingRepository, MockPlanRepository, MockPaymentGateway> {
    RecurringBillingUseCase::new(
        Arc::new(billing_repo),
        Arc::new(plan_repo),
        Arc::new(gateway),
        cipher(),
        Notifier::new(vec![]),
        settings(),
    )
}

fn expect_claim_returns(
    billing_repo: &mut MockBillingRepository,
    subscription: &SubscriptionEntity,
) {
    let claimed = subscription.clone();
    billing_repo
        .expect_claim_for_billing()
        .returning(move |_, _, _, _| Ok(Some(claimed.clone())));
}

#[tokio::test]
async fn percent_coupon_halves_the_charge() {
    let plan = plan(10_000);
    let sub = subscription(plan.id);
    let coupon = percent_coupon(50);
    let app = application(sub.id, coupon.id, Some(3));
    let app_id = app.id;
    let next_billing = billing_time() + Duration::days(30);

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    expect_claim_returns(&mut billing_repo, &sub);
    billing_repo
        .expect_active_coupon_application()
        .returning(move |_| Ok(Some((app.clone(), coupon.clone()))));
    billing_repo
        .expect_mark_attempt_started()
        .times(1)
        .returning(|_, _| Ok(()));
    billing_repo
        .expect_record_cycle_success()
        .withf(move |cycle| {
            cycle.amount_minor == 5_000
                && cycle.original_amount_minor == 10_000
                && cycle.discount_minor == 5_000
                && cycle.coupon_application_id == Some(app_id)
                && cycle.payment_status == PaymentStatus::Paid
                && cycle.transition.next_billing_at == next_billing
        })
        .times(1)
        .returning(|_| Ok(Uuid::new_v4()));

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    gateway
        .expect_charge()
        .withf(|key, request| {
            key.expose() == RAW_BILLING_KEY
                && request.amount_minor == 5_000
                && request.currency == "KRW"
                && request.order_id.starts_with("bill-")
        })
        .times(1)
        .returning(|_, request| {
            Ok(ChargeApproval {
                payment_key: "pay-1".to_string(),
                order_id: request.order_id,
                amount_minor: request.amount_minor,
                approved_at: billing_time(),
            })
        });

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();

    assert_eq!(report.selected, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn coupon_decays_and_fourth_cycle_charges_full_price() {
    let plan = plan(10_000);
    let sub = subscription(plan.id);
    let coupon = percent_coupon(50);

    // Pre-decrement remaining months as the repository would report them
    // cycle by cycle; after the third success the application is inactive.
    let coupon_states: Arc<Mutex<Vec<Option<i32>>>> =
        Arc::new(Mutex::new(vec![Some(3), Some(2), Some(1)]));
    let charged_amounts: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(vec![]));
    let coupon_refs: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(vec![]));

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    expect_claim_returns(&mut billing_repo, &sub);
    let states = Arc::clone(&coupon_states);
    let sub_id = sub.id;
    billing_repo
        .expect_active_coupon_application()
        .returning(move |_| {
            let mut states = states.lock().unwrap();
            if states.is_empty() {
                // Deactivated after the third applied cycle.
                Ok(None)
            } else {
                let remaining = states.remove(0);
                Ok(Some((
                    application(sub_id, coupon.id, remaining),
                    coupon.clone(),
                )))
            }
        });
    billing_repo
        .expect_mark_attempt_started()
        .returning(|_, _| Ok(()));
    let refs = Arc::clone(&coupon_refs);
    billing_repo
        .expect_record_cycle_success()
        .returning(move |cycle| {
            refs.lock().unwrap().push(cycle.coupon_application_id.is_some());
            Ok(Uuid::new_v4())
        });

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    let amounts = Arc::clone(&charged_amounts);
    gateway.expect_charge().returning(move |_, request| {
        amounts.lock().unwrap().push(request.amount_minor);
        Ok(ChargeApproval {
            payment_key: format!("pay-{}", request.order_id),
            order_id: request.order_id,
            amount_minor: request.amount_minor,
            approved_at: billing_time(),
        })
    });

    let usecase = usecase(billing_repo, plan_repo, gateway);
    for _ in 0..4 {
        let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();
        assert_eq!(report.succeeded, 1);
    }

    assert_eq!(
        *charged_amounts.lock().unwrap(),
        vec![5_000, 5_000, 5_000, 10_000]
    );
    assert_eq!(*coupon_refs.lock().unwrap(), vec![true, true, true, false]);
}

#[tokio::test]
async fn full_discount_never_calls_the_gateway() {
    let plan = plan(10_000);
    let sub = subscription(plan.id);
    let coupon = percent_coupon(100);
    let app = application(sub.id, coupon.id, Some(2));
    let app_id = app.id;

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    expect_claim_returns(&mut billing_repo, &sub);
    billing_repo
        .expect_active_coupon_application()
        .returning(move |_| Ok(Some((app.clone(), coupon.clone()))));
    billing_repo
        .expect_mark_attempt_started()
        .returning(|_, _| Ok(()));
    billing_repo
        .expect_record_cycle_success()
        .withf(move |cycle| {
            cycle.amount_minor == 0
                && cycle.discount_minor == 10_000
                && cycle.payment_status == PaymentStatus::Waived
                && cycle.coupon_application_id == Some(app_id)
                && cycle
                    .gateway_payment_key
                    .as_deref()
                    .is_some_and(|key| key.starts_with("waived-"))
        })
        .times(1)
        .returning(|_| Ok(Uuid::new_v4()));

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().never();

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();

    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn missing_billing_key_opens_grace_period() {
    let plan = plan(10_000);
    let sub = subscription(plan.id);
    let grace_end = billing_time() + Duration::days(3);

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, None);
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    expect_claim_returns(&mut billing_repo, &sub);
    billing_repo
        .expect_active_coupon_application()
        .returning(|_| Ok(None));
    billing_repo
        .expect_mark_attempt_started()
        .returning(|_, _| Ok(()));
    billing_repo
        .expect_record_cycle_failure()
        .withf(move |cycle| {
            cycle.error_code == "NO_PAYMENT_METHOD"
                && cycle.transition.failed_attempts == 1
                && cycle.transition.recurring_status == RecurringStatus::PendingPayment
                && cycle.transition.grace_period_end == Some(grace_end)
        })
        .times(1)
        .returning(|_| Ok(()));

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().never();

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();

    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn third_consecutive_failure_cancels_the_renewal() {
    let plan = plan(10_000);
    let mut sub = subscription(plan.id);
    sub.recurring_status = RecurringStatus::PendingPayment.as_str().to_string();
    sub.failed_attempts = 2;
    sub.grace_period_end = Some(billing_time() + Duration::days(1));

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo.expect_due_candidates().never();
    billing_repo
        .expect_grace_period_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    expect_claim_returns(&mut billing_repo, &sub);
    billing_repo
        .expect_active_coupon_application()
        .returning(|_| Ok(None));
    billing_repo
        .expect_mark_attempt_started()
        .returning(|_, _| Ok(()));
    billing_repo
        .expect_record_cycle_failure()
        .withf(|cycle| {
            cycle.transition.failed_attempts == 3
                && cycle.transition.recurring_status == RecurringStatus::Canceled
                && cycle.transition.grace_period_end.is_none()
        })
        .times(1)
        .returning(|_| Ok(()));

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().times(1).returning(|_, _| {
        Err(ChargeError::Declined {
            code: "INSUFFICIENT_FUNDS".to_string(),
            message: "insufficient balance".to_string(),
        })
    });

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase
        .run_grace_retry_pass(billing_time(), None)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn success_during_grace_resets_the_failure_counter() {
    let plan = plan(10_000);
    let mut sub = subscription(plan.id);
    sub.recurring_status = RecurringStatus::PendingPayment.as_str().to_string();
    sub.failed_attempts = 1;
    sub.grace_period_end = Some(billing_time() + Duration::days(2));
    let next_billing = billing_time() + Duration::days(30);

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_grace_period_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    expect_claim_returns(&mut billing_repo, &sub);
    billing_repo
        .expect_active_coupon_application()
        .returning(|_| Ok(None));
    billing_repo
        .expect_mark_attempt_started()
        .returning(|_, _| Ok(()));
    // The repository applies the success transition, which zeroes the
    // counter and reschedules the next cycle.
    billing_repo
        .expect_record_cycle_success()
        .withf(move |cycle| {
            cycle.amount_minor == 10_000 && cycle.transition.next_billing_at == next_billing
        })
        .times(1)
        .returning(|_| Ok(Uuid::new_v4()));

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().times(1).returning(|_, request| {
        Ok(ChargeApproval {
            payment_key: "pay-2".to_string(),
            order_id: request.order_id,
            amount_minor: request.amount_minor,
            approved_at: billing_time(),
        })
    });

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase
        .run_grace_retry_pass(billing_time(), None)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn contended_claim_is_skipped_without_charging() {
    let plan = plan(10_000);
    let sub = subscription(plan.id);

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    billing_repo
        .expect_claim_for_billing()
        .times(1)
        .returning(|_, _, _, _| Ok(None));
    billing_repo.expect_record_cycle_success().never();
    billing_repo.expect_record_cycle_failure().never();

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().never();

    let usecase = usecase(billing_repo, MockPlanRepository::new(), gateway);
    let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();

    assert_eq!(report.selected, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.succeeded, 0);
}

#[tokio::test]
async fn one_broken_subscription_does_not_abort_the_batch() {
    let healthy_plan = plan(10_000);
    let broken_plan_id = Uuid::new_v4();
    let healthy = subscription(healthy_plan.id);
    let broken = subscription(broken_plan_id);

    let mut billing_repo = MockBillingRepository::new();
    let key_enc = encrypted_billing_key(&cipher());
    let candidates = vec![
        candidate(&broken, Some(key_enc.clone())),
        candidate(&healthy, Some(key_enc)),
    ];
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(candidates.clone()));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    let broken_clone = broken.clone();
    let healthy_clone = healthy.clone();
    billing_repo
        .expect_claim_for_billing()
        .returning(move |id, _, _, _| {
            Ok(Some(if id == broken_clone.id {
                broken_clone.clone()
            } else {
                healthy_clone.clone()
            }))
        });
    // The broken subscription's claim is dropped so the next pass retries.
    billing_repo
        .expect_release_claim()
        .withf(move |id| *id == broken.id)
        .times(1)
        .returning(|_| Ok(()));
    billing_repo
        .expect_active_coupon_application()
        .returning(|_| Ok(None));
    billing_repo
        .expect_mark_attempt_started()
        .returning(|_, _| Ok(()));
    billing_repo
        .expect_record_cycle_success()
        .times(1)
        .returning(|_| Ok(Uuid::new_v4()));

    let mut plan_repo = MockPlanRepository::new();
    let healthy_plan_clone = healthy_plan.clone();
    plan_repo.expect_find_by_id().returning(move |id| {
        if id == broken_plan_id {
            Err(anyhow!("plan row missing"))
        } else {
            Ok(healthy_plan_clone.clone())
        }
    });

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().times(1).returning(|_, request| {
        Ok(ChargeApproval {
            payment_key: "pay-3".to_string(),
            order_id: request.order_id,
            amount_minor: request.amount_minor,
            approved_at: billing_time(),
        })
    });

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();

    assert_eq!(report.selected, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn expired_deadline_leaves_the_batch_untouched() {
    let plan = plan(10_000);
    let sub = subscription(plan.id);

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    billing_repo.expect_claim_for_billing().never();
    billing_repo.expect_record_cycle_success().never();

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().never();

    let usecase = usecase(billing_repo, MockPlanRepository::new(), gateway);
    // Deadline already behind the wall clock: nothing may be attempted.
    let report = usecase
        .run_renewal_pass(billing_time(), Some(billing_time()))
        .await
        .unwrap();

    assert_eq!(report.selected, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn dangling_order_is_recovered_without_a_second_charge() {
    let plan = plan(10_000);
    let mut sub = subscription(plan.id);
    sub.pending_order_id = Some("bill-dangling".to_string());
    let coupon = percent_coupon(50);
    let app = application(sub.id, coupon.id, Some(3));
    let app_id = app.id;

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    expect_claim_returns(&mut billing_repo, &sub);
    billing_repo
        .expect_find_payment_by_order()
        .withf(|order_id| order_id == "bill-dangling")
        .times(1)
        .returning(|_| Ok(None));
    billing_repo
        .expect_active_coupon_application()
        .returning(move |_| Ok(Some((app.clone(), coupon.clone()))));
    billing_repo.expect_mark_attempt_started().never();
    billing_repo
        .expect_record_cycle_success()
        .withf(move |cycle| {
            cycle.order_id == "bill-dangling"
                && cycle.amount_minor == 5_000
                && cycle.discount_minor == 5_000
                && cycle.coupon_application_id == Some(app_id)
        })
        .times(1)
        .returning(|_| Ok(Uuid::new_v4()));

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    gateway.expect_charge().never();
    gateway
        .expect_find_approved_order()
        .withf(|order_id| order_id == "bill-dangling")
        .times(1)
        .returning(|order_id| {
            Ok(Some(ChargeApproval {
                payment_key: "pay-recovered".to_string(),
                order_id: order_id.to_string(),
                amount_minor: 5_000,
                approved_at: billing_time(),
            }))
        });

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();

    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn unapproved_dangling_order_charges_fresh() {
    let plan = plan(10_000);
    let mut sub = subscription(plan.id);
    sub.pending_order_id = Some("bill-lost".to_string());

    let mut billing_repo = MockBillingRepository::new();
    let cand = candidate(&sub, Some(encrypted_billing_key(&cipher())));
    billing_repo
        .expect_due_candidates()
        .returning(move |_, _| Ok(vec![cand.clone()]));
    billing_repo
        .expect_grace_period_candidates()
        .returning(|_, _| Ok(vec![]));
    expect_claim_returns(&mut billing_repo, &sub);
    billing_repo
        .expect_find_payment_by_order()
        .returning(|_| Ok(None));
    billing_repo
        .expect_active_coupon_application()
        .returning(|_| Ok(None));
    // A fresh order id replaces the lost one before the new charge.
    billing_repo
        .expect_mark_attempt_started()
        .withf(|_, order_id| order_id != "bill-lost")
        .times(1)
        .returning(|_, _| Ok(()));
    billing_repo
        .expect_record_cycle_success()
        .times(1)
        .returning(|_| Ok(Uuid::new_v4()));

    let mut plan_repo = MockPlanRepository::new();
    let plan_clone = plan.clone();
    plan_repo
        .expect_find_by_id()
        .returning(move |_| Ok(plan_clone.clone()));

    let mut gateway = MockPaymentGateway::new();
    gateway
        .expect_find_approved_order()
        .returning(|_| Ok(None));
    gateway.expect_charge().times(1).returning(|_, request| {
        Ok(ChargeApproval {
            payment_key: "pay-4".to_string(),
            order_id: request.order_id,
            amount_minor: request.amount_minor,
            approved_at: billing_time(),
        })
    });

    let usecase = usecase(billing_repo, plan_repo, gateway);
    let report = usecase.run_renewal_pass(billing_time(), None).await.unwrap();

    assert_eq!(report.succeeded, 1);
}
