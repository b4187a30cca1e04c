use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BillingAttemptStatus {
    Success,
    Failed,
}

impl BillingAttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingAttemptStatus::Success => "success",
            BillingAttemptStatus::Failed => "failed",
        }
    }
}

impl Display for BillingAttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
