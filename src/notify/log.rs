use tracing::info;

use super::{MailTransport, NotificationResult, OutboundMail};

/// Writes mail to the log instead of sending it. Used when no relay is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

impl MailTransport for LogMailer {
    async fn deliver(&self, mail: OutboundMail) -> NotificationResult<()> {
        let body = if mail.sensitive { "<redacted>" } else { mail.body.as_str() };
        info!(to = %mail.to, subject = %mail.subject, body = %body, "mail (log delivery)");
        Ok(())
    }
}
