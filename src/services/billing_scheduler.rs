use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{error, info};

use crate::{
    application::usecases::recurring_billing::{PaymentGateway, RecurringBillingUseCase},
    domain::repositories::{billing::BillingRepository, plans::PlanRepository},
};

/// Periodic full renewal pass. Errors are logged and the loop keeps going;
/// unprocessed subscriptions are picked up on the next tick.
pub async fn run_renewal_loop<B, P, G>(
    usecase: Arc<RecurringBillingUseCase<B, P, G>>,
    interval: StdDuration,
    pass_deadline: Duration,
) -> Result<()>
where
    B: BillingRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    loop {
        let now = Utc::now();
        match usecase.run_renewal_pass(now, Some(now + pass_deadline)).await {
            Ok(report) => info!(
                selected = report.selected,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "Renewal pass completed"
            ),
            Err(e) => error!("Error while running renewal pass: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}

/// Tighter loop re-attempting only grace-period subscriptions, so
/// recoveries land well inside the grace window.
pub async fn run_grace_retry_loop<B, P, G>(
    usecase: Arc<RecurringBillingUseCase<B, P, G>>,
    interval: StdDuration,
    pass_deadline: Duration,
) -> Result<()>
where
    B: BillingRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    loop {
        let now = Utc::now();
        match usecase
            .run_grace_retry_pass(now, Some(now + pass_deadline))
            .await
        {
            Ok(report) => info!(
                selected = report.selected,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "Grace retry pass completed"
            ),
            Err(e) => error!("Error while running grace retry pass: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}
