pub mod billing_key;
pub mod gateway_client;
