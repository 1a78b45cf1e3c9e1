//! Send emails to user for important updates.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Mail templates list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Ask user to confirm the email address used on registration.
    Verification,
}

/// Outgoing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub template: Template,
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Mail {
    /// Build the verification mail for `to`, pointing at `link`.
    pub fn verification(to: impl Into<String>, link: &str) -> Self {
        Self {
            template: Template::Verification,
            to: to.into(),
            subject: "Please verify your email before using our services!".into(),
            html: format!(
                "<h3>Here is your verification link:</h3><h3>{link}</h3><h3>Sincerely</h3>"
            ),
        }
    }
}

/// Outbound email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<()>;
}

/// Mailer writing messages to the log instead of a mail provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        tracing::info!(
            template = ?mail.template,
            to = %mail.to,
            subject = %mail.subject,
            "mail sent"
        );
        tracing::trace!(html = %mail.html, "mail content");
        Ok(())
    }
}

/// Keeps every sent mail in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<Mail>>,
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}
