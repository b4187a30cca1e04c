mod notifier;

pub use notifier::{BillingNotification, LogNotificationProvider, NotificationProvider, Notifier};
