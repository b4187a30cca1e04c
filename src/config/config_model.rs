#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub database: Database,
    pub gateway: Gateway,
    pub billing: Billing,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Billing {
    pub currency: String,
    /// Seconds between full renewal passes.
    pub renewal_interval_secs: u64,
    /// Seconds between grace-period retry passes; tighter than the renewal
    /// schedule so recoveries land inside the grace window.
    pub retry_interval_secs: u64,
    pub batch_size: i64,
    pub max_in_flight: usize,
    /// Per-pass budget; subscriptions not reached in time wait for the next
    /// run.
    pub pass_deadline_secs: i64,
    /// Age at which a billing claim counts as abandoned.
    pub claim_ttl_secs: i64,
    /// Hex-encoded AES-256 master key for stored billing keys.
    pub billing_key_master_hex: String,
}
