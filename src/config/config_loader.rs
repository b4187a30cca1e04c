use anyhow::{Context, Result};

use super::config_model::{Billing, Database, DotEnvyConfig, Gateway};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let gateway = Gateway {
        base_url: std::env::var("PAYMENT_GATEWAY_BASE_URL")
            .expect("PAYMENT_GATEWAY_BASE_URL is invalid"),
        secret_key: std::env::var("PAYMENT_GATEWAY_SECRET_KEY")
            .expect("PAYMENT_GATEWAY_SECRET_KEY is invalid"),
        timeout_secs: std::env::var("PAYMENT_GATEWAY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("PAYMENT_GATEWAY_TIMEOUT_SECS is invalid")?,
    };

    let billing = Billing {
        currency: std::env::var("BILLING_CURRENCY").unwrap_or_else(|_| "KRW".to_string()),
        renewal_interval_secs: std::env::var("BILLING_RENEWAL_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .context("BILLING_RENEWAL_INTERVAL_SECS is invalid")?,
        retry_interval_secs: std::env::var("BILLING_RETRY_INTERVAL_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .context("BILLING_RETRY_INTERVAL_SECS is invalid")?,
        batch_size: std::env::var("BILLING_BATCH_SIZE")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .context("BILLING_BATCH_SIZE is invalid")?,
        max_in_flight: std::env::var("BILLING_MAX_IN_FLIGHT")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .context("BILLING_MAX_IN_FLIGHT is invalid")?,
        pass_deadline_secs: std::env::var("BILLING_PASS_DEADLINE_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse()
            .context("BILLING_PASS_DEADLINE_SECS is invalid")?,
        claim_ttl_secs: std::env::var("BILLING_CLAIM_TTL_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .context("BILLING_CLAIM_TTL_SECS is invalid")?,
        billing_key_master_hex: std::env::var("BILLING_KEY_MASTER_KEY_HEX")
            .expect("BILLING_KEY_MASTER_KEY_HEX is invalid"),
    };

    Ok(DotEnvyConfig {
        database,
        gateway,
        billing,
    })
}
