use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::models::requests::RequestKind;
use crate::notify::{NotificationError, NotificationResult, Notifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NewRequest { kind: RequestKind, request_number: String, request_id: i32 },
    Approval { email: String, username: String, request_number: String, approved: bool, reason: Option<String> },
    Credentials { email: String, username: String, password: String },
    AttributeChange { email: String, username: String, attribute: String, new_value: String, approved: bool },
}

/// Records every notification; can be told to fail or stall after recording.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
    stall: Arc<Mutex<Option<Duration>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stall(&self, delay: Option<Duration>) {
        if let Ok(mut stall) = self.stall.lock() {
            *stall = delay;
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn approvals(&self) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| matches!(n, Notification::Approval { .. }))
            .collect()
    }

    async fn record(&self, notification: Notification) -> NotificationResult<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
        let stall = self.stall.lock().ok().and_then(|stall| *stall);
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Delivery("relay refused the message".to_string()));
        }
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    async fn notify_new_request(&self, kind: RequestKind, request_number: &str, request_id: i32) -> NotificationResult<()> {
        self.record(Notification::NewRequest {
            kind,
            request_number: request_number.to_string(),
            request_id,
        })
        .await
    }

    async fn notify_approval(
        &self,
        email: &str,
        username: &str,
        request_number: &str,
        approved: bool,
        reason: Option<&str>,
    ) -> NotificationResult<()> {
        self.record(Notification::Approval {
            email: email.to_string(),
            username: username.to_string(),
            request_number: request_number.to_string(),
            approved,
            reason: reason.map(str::to_string),
        })
        .await
    }

    async fn notify_new_credentials(&self, email: &str, username: &str, password: &str) -> NotificationResult<()> {
        self.record(Notification::Credentials {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
    }

    async fn notify_attribute_change(
        &self,
        email: &str,
        username: &str,
        attribute: &str,
        new_value: &str,
        approved: bool,
    ) -> NotificationResult<()> {
        self.record(Notification::AttributeChange {
            email: email.to_string(),
            username: username.to_string(),
            attribute: attribute.to_string(),
            new_value: new_value.to_string(),
            approved,
        })
        .await
    }
}
