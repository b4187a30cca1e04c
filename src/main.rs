use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use renewal_engine::{
    application::usecases::recurring_billing::{BillingSettings, RecurringBillingUseCase},
    config,
    infrastructure::postgres::{
        postgres_connection,
        repositories::{billing::BillingPostgres, plans::PlanPostgres},
    },
    notifications::{LogNotificationProvider, Notifier},
    payments::{
        billing_key::BillingKeyCipher,
        gateway_client::{BillingGatewayClient, GatewayConfig},
    },
    services,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Billing worker exited with error: {}", error);
        std::process::exit(1);
    }
}

fn init_tracing() -> Result<()> {
    // EnvFilter (RUST_LOG) with a safe default level for production.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&config.database.url)?;
    info!("Postgres connection has been established");

    let db_pool = Arc::new(postgres_pool);
    let billing_repository = Arc::new(BillingPostgres::new(Arc::clone(&db_pool)));
    let plan_repository = Arc::new(PlanPostgres::new(Arc::clone(&db_pool)));

    let gateway = Arc::new(BillingGatewayClient::new(GatewayConfig {
        base_url: config.gateway.base_url.clone(),
        secret_key: config.gateway.secret_key.clone(),
        timeout: Duration::from_secs(config.gateway.timeout_secs),
    })?);
    let cipher = Arc::new(BillingKeyCipher::from_hex(
        &config.billing.billing_key_master_hex,
    )?);
    let notifier = Notifier::new(vec![Arc::new(LogNotificationProvider)]);

    let settings = BillingSettings {
        currency: config.billing.currency.clone(),
        batch_size: config.billing.batch_size,
        max_in_flight: config.billing.max_in_flight,
        claim_ttl: chrono::Duration::seconds(config.billing.claim_ttl_secs),
    };

    let usecase = Arc::new(RecurringBillingUseCase::new(
        billing_repository,
        plan_repository,
        gateway,
        cipher,
        notifier,
        settings,
    ));

    info!("Billing worker started");

    let pass_deadline = chrono::Duration::seconds(config.billing.pass_deadline_secs);

    let renewal_loop = tokio::spawn(services::billing_scheduler::run_renewal_loop(
        Arc::clone(&usecase),
        Duration::from_secs(config.billing.renewal_interval_secs),
        pass_deadline,
    ));
    let retry_loop = tokio::spawn(services::billing_scheduler::run_grace_retry_loop(
        usecase,
        Duration::from_secs(config.billing.retry_interval_secs),
        pass_deadline,
    ));

    tokio::select! {
        result = renewal_loop => result??,
        result = retry_loop => result??,
    };

    Ok(())
}
