use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Renewal state of a subscription. `Canceled` is terminal: no further
/// attempts are scheduled once it is reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecurringStatus {
    Active,
    PendingPayment,
    Canceled,
}

impl RecurringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringStatus::Active => "active",
            RecurringStatus::PendingPayment => "pending_payment",
            RecurringStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "active" => RecurringStatus::Active,
            "pending_payment" => RecurringStatus::PendingPayment,
            _ => RecurringStatus::Canceled,
        }
    }
}

impl Display for RecurringStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
