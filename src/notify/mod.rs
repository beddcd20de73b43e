// Notifier capability and the mail it sends.
//
// Notifications are best-effort: callers log failures and carry on, so a
// broken mail relay never changes the outcome of a lifecycle transition.

pub mod email;
pub mod log;

use std::future::Future;

use crate::db::models::requests::RequestKind;

pub use email::SmtpMailer;
pub use log::LogMailer;

pub type NotificationResult<T> = Result<T, NotificationError>;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

pub trait Notifier: Send + Sync + 'static {
    /// Tells the help desk a new request is waiting.
    fn notify_new_request(
        &self,
        kind: RequestKind,
        request_number: &str,
        request_id: i32,
    ) -> impl Future<Output = NotificationResult<()>> + Send;

    /// Tells the requester how their request was decided.
    fn notify_approval(
        &self,
        email: &str,
        username: &str,
        request_number: &str,
        approved: bool,
        reason: Option<&str>,
    ) -> impl Future<Output = NotificationResult<()>> + Send;

    fn notify_new_credentials(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> impl Future<Output = NotificationResult<()>> + Send;

    fn notify_attribute_change(
        &self,
        email: &str,
        username: &str,
        attribute: &str,
        new_value: &str,
        approved: bool,
    ) -> impl Future<Output = NotificationResult<()>> + Send;
}

/// A plain-text message ready for a [`MailTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Body carries credentials and must never be logged.
    pub sensitive: bool,
}

impl OutboundMail {
    pub fn to(address: impl Into<String>) -> Self {
        Self {
            to: address.into(),
            subject: String::new(),
            body: String::new(),
            sensitive: false,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

pub trait MailTransport: Send + Sync + 'static {
    fn deliver(&self, mail: OutboundMail) -> impl Future<Output = NotificationResult<()>> + Send;
}

/// Runtime choice between a real relay and the log sink.
pub enum Delivery {
    Smtp(SmtpMailer),
    Log(LogMailer),
}

impl MailTransport for Delivery {
    async fn deliver(&self, mail: OutboundMail) -> NotificationResult<()> {
        match self {
            Delivery::Smtp(mailer) => mailer.deliver(mail).await,
            Delivery::Log(mailer) => mailer.deliver(mail).await,
        }
    }
}

/// [`Notifier`] that renders each event into an [`OutboundMail`].
pub struct MailNotifier<T> {
    transport: T,
    admin_email: Option<String>,
}

impl<T: MailTransport> MailNotifier<T> {
    pub fn new(transport: T, admin_email: Option<String>) -> Self {
        Self { transport, admin_email }
    }
}

pub fn new_request_mail(to: &str, kind: RequestKind, request_number: &str, request_id: i32) -> OutboundMail {
    OutboundMail::to(to)
        .subject(format!("New {} request {request_number}", kind.label().to_lowercase()))
        .body(format!(
            "A new {} request is waiting for review.\n\n\
             Request number: {request_number}\n\
             Reference: {}/{request_id}\n",
            kind.label().to_lowercase(),
            kind.as_str(),
        ))
}

pub fn decision_mail(
    to: &str,
    username: &str,
    request_number: &str,
    approved: bool,
    reason: Option<&str>,
) -> OutboundMail {
    let verdict = if approved { "approved" } else { "rejected" };
    let mut body = format!("Hello {username},\n\nYour request {request_number} has been {verdict}.\n");
    if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
        body.push_str(&format!("\nReason: {reason}\n"));
    }
    OutboundMail::to(to)
        .subject(format!("Request {request_number} {verdict}"))
        .body(body)
}

pub fn credentials_mail(to: &str, username: &str, password: &str) -> OutboundMail {
    OutboundMail::to(to)
        .subject(format!("Temporary credentials for {username}"))
        .body(format!(
            "Account: {username}\n\
             Temporary password: {password}\n\n\
             You will be asked to choose a new password at first logon.\n"
        ))
        .sensitive()
}

pub fn attribute_change_mail(
    to: &str,
    username: &str,
    attribute: &str,
    new_value: &str,
    approved: bool,
) -> OutboundMail {
    let (subject, line) = if approved {
        (
            format!("Directory attribute {attribute} updated"),
            format!("The attribute {attribute} of account {username} is now \"{new_value}\"."),
        )
    } else {
        (
            format!("Directory attribute {attribute} change declined"),
            format!("The requested change of {attribute} for account {username} was declined."),
        )
    };
    OutboundMail::to(to).subject(subject).body(format!("{line}\n"))
}

impl<T: MailTransport> Notifier for MailNotifier<T> {
    async fn notify_new_request(&self, kind: RequestKind, request_number: &str, request_id: i32) -> NotificationResult<()> {
        let Some(admin) = self.admin_email.as_deref() else {
            tracing::debug!(%request_number, "no help desk address configured; skipping new request mail");
            return Ok(());
        };
        self.transport
            .deliver(new_request_mail(admin, kind, request_number, request_id))
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
        self.transport
            .deliver(decision_mail(email, username, request_number, approved, reason))
            .await
    }

    async fn notify_new_credentials(&self, email: &str, username: &str, password: &str) -> NotificationResult<()> {
        self.transport.deliver(credentials_mail(email, username, password)).await
    }

    async fn notify_attribute_change(
        &self,
        email: &str,
        username: &str,
        attribute: &str,
        new_value: &str,
        approved: bool,
    ) -> NotificationResult<()> {
        self.transport
            .deliver(attribute_change_mail(email, username, attribute, new_value, approved))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Outbox(Arc<Mutex<Vec<OutboundMail>>>);

    impl MailTransport for Outbox {
        async fn deliver(&self, mail: OutboundMail) -> NotificationResult<()> {
            self.0.lock().unwrap().push(mail);
            Ok(())
        }
    }

    #[tokio::test]
    async fn new_request_goes_to_the_help_desk() {
        let outbox = Outbox::default();
        let notifier = MailNotifier::new(outbox.clone(), Some("helpdesk@corp.local".into()));

        notifier
            .notify_new_request(RequestKind::Group, "GRP20261018001", 4)
            .await
            .unwrap();

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "helpdesk@corp.local");
        assert!(sent[0].subject.contains("GRP20261018001"));
        assert!(sent[0].body.contains("group/4"));
    }

    #[tokio::test]
    async fn new_request_without_help_desk_address_sends_nothing() {
        let outbox = Outbox::default();
        let notifier = MailNotifier::new(outbox.clone(), None);

        notifier
            .notify_new_request(RequestKind::Creation, "CRT-20260001", 1)
            .await
            .unwrap();
        assert!(outbox.0.lock().unwrap().is_empty());
    }

    #[test]
    fn rejection_mail_carries_the_reason() {
        let mail = decision_mail("jdoe@corp.local", "jdoe", "DEL-20260003", false, Some("duplicate"));
        assert_eq!(mail.subject, "Request DEL-20260003 rejected");
        assert!(mail.body.contains("Reason: duplicate"));
        assert!(!mail.sensitive);
    }

    #[test]
    fn credentials_mail_is_sensitive() {
        let mail = credentials_mail("jdoe@corp.local", "jdoe", "Xy7!pass");
        assert!(mail.sensitive);
        assert!(mail.body.contains("Xy7!pass"));
    }
}
