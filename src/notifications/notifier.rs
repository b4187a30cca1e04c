use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Billing outcome events handed to users via email/push. Delivery is a
/// post-commit side effect: a provider failure never touches billing state.
#[derive(Clone, Debug)]
pub enum BillingNotification {
    RenewalCharged {
        user_id: Uuid,
        subscription_id: Uuid,
        amount_minor: i32,
        approved_at: DateTime<Utc>,
    },
    RenewalWaived {
        user_id: Uuid,
        subscription_id: Uuid,
    },
    PaymentFailed {
        user_id: Uuid,
        subscription_id: Uuid,
        error_code: String,
        grace_period_end: Option<DateTime<Utc>>,
    },
    SubscriptionCanceled {
        user_id: Uuid,
        subscription_id: Uuid,
    },
}

#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send(&self, event: &BillingNotification) -> Result<()>;
    fn provider_name(&self) -> &'static str;
}

/// Stand-in for the platform's push/email pipeline: logs the event and
/// succeeds.
pub struct LogNotificationProvider;

#[async_trait]
impl NotificationProvider for LogNotificationProvider {
    async fn send(&self, event: &BillingNotification) -> Result<()> {
        info!(event = ?event, "billing notification");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "log"
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<BillingNotification>,
}

impl Notifier {
    pub fn new(providers: Vec<Arc<dyn NotificationProvider>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<BillingNotification>(256);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for provider in &providers {
                    if let Err(error) = provider.send(&event).await {
                        warn!(
                            provider = provider.provider_name(),
                            error = %error,
                            "Notification provider failed"
                        );
                    }
                }
            }
        });

        Self { tx }
    }

    /// Non-blocking enqueue; a full queue drops the event with a warning
    /// rather than stalling the billing pass.
    pub fn try_notify(&self, event: BillingNotification) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Notification queue full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Notification queue closed; dropping event");
            }
        }
    }
}
