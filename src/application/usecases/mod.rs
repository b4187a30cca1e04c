pub mod recurring_billing;
