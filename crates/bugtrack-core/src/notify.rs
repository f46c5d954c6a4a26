//! Email notifications
//!
//! `Notifier` is the seam between the bug workflow and the outside world.
//! `SmtpNotifier` talks to a real relay, `LogNotifier` stands in when no relay
//! is configured.

use crate::config::{SmtpConfig, SmtpTls};
use crate::{Bug, Error, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// One outbound email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Notification {
    /// Tell the assigned developer about a bug they now own.
    ///
    /// Returns `None` when the bug has no developer with a usable address.
    pub fn assignment(bug: &Bug) -> Option<Self> {
        let to = bug.assignee_email()?;
        Some(Self {
            to: to.to_string(),
            subject: format!("New Bug Assigned: \"{}\"", bug.title),
            text: format!(
                "You have been assigned a new bug.\n\nTitle: {}\nDescription: {}\nPriority: {}",
                bug.title, bug.description, bug.priority
            ),
            html: format!(
                "<p>You have been assigned a new bug.</p><h3>{}</h3><p>{}</p><p><b>Priority:</b> {}</p>",
                escape_html(&bug.title),
                escape_html(&bug.description),
                bug.priority
            ),
        })
    }

    /// Tell the assigned developer that the bug moved to a new status.
    ///
    /// Returns `None` when the bug has no developer with a usable address.
    pub fn status_changed(bug: &Bug) -> Option<Self> {
        let to = bug.assignee_email()?;
        Some(Self {
            to: to.to_string(),
            subject: format!("Bug Status Updated: \"{}\"", bug.title),
            text: format!(
                "The status of the bug \"{}\" has been updated to {}.",
                bug.title, bug.status
            ),
            html: format!(
                "<p>The status of the bug \"{}\" has been updated to <b>{}</b>.</p>",
                escape_html(&bug.title),
                bug.status
            ),
        })
    }

    /// Diagnostic message used to check relay settings
    pub fn test(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: "Test Email from Bug Tracker".to_string(),
            text: "This is a test email to verify your SMTP configuration.".to_string(),
            html: "<p>This is a test email to verify your SMTP configuration.</p>".to_string(),
        }
    }
}

/// Delivers notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            "mail relay not configured, notification logged only"
        );
        Ok(())
    }
}

/// Notifier backed by an SMTP relay
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::Config("smtp.host is not set".into()))?;

        let mut builder = match config.tls {
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| Error::Mail(e.to_string()))?,
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| Error::Mail(e.to_string()))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        builder = builder
            .port(config.effective_port())
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| Error::Config(format!("smtp.from {:?}: {e}", config.from)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let to = notification
            .to
            .parse::<Mailbox>()
            .map_err(|e| Error::Mail(format!("bad recipient {:?}: {e}", notification.to)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                notification.text.clone(),
                notification.html.clone(),
            ))
            .map_err(|e| Error::Mail(e.to_string()))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| Error::Mail(e.to_string()))?;

        tracing::info!(
            to = %notification.to,
            code = %response.code(),
            "notification delivered to relay"
        );
        Ok(())
    }
}

/// Build the notifier described by `config`
pub fn from_config(config: &SmtpConfig) -> Result<Box<dyn Notifier>> {
    if config.is_configured() {
        Ok(Box::new(SmtpNotifier::new(config)?))
    } else {
        Ok(Box::new(LogNotifier))
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Developer, Priority, Status};
    use chrono::Utc;

    fn bug(developer: Option<Developer>) -> Bug {
        Bug {
            id: 1,
            title: "Crash <on> save".into(),
            description: "Steps & trace".into(),
            status: Status::InProgress,
            priority: Priority::High,
            developer_id: developer.as_ref().map(|d| d.id),
            due_date: None,
            created_at: Utc::now(),
            developer,
        }
    }

    fn ada() -> Developer {
        Developer {
            id: 1,
            name: "Ada".into(),
            email: "ada@x.com".into(),
        }
    }

    #[test]
    fn test_assignment_message() {
        let note = Notification::assignment(&bug(Some(ada()))).unwrap();
        assert_eq!(note.to, "ada@x.com");
        assert_eq!(note.subject, "New Bug Assigned: \"Crash <on> save\"");
        assert!(note.text.contains("Description: Steps & trace"));
        assert!(note.text.contains("Priority: HIGH"));
        assert!(note.html.contains("<h3>Crash &lt;on&gt; save</h3>"));
        assert!(note.html.contains("Steps &amp; trace"));
    }

    #[test]
    fn test_status_message() {
        let note = Notification::status_changed(&bug(Some(ada()))).unwrap();
        assert_eq!(note.subject, "Bug Status Updated: \"Crash <on> save\"");
        assert!(note.text.ends_with("has been updated to IN_PROGRESS."));
        assert!(note.html.contains("<b>IN_PROGRESS</b>"));
    }

    #[test]
    fn test_no_message_without_address() {
        assert!(Notification::assignment(&bug(None)).is_none());
        let mut blank = ada();
        blank.email = "  ".into();
        assert!(Notification::status_changed(&bug(Some(blank))).is_none());
    }

    #[test]
    fn test_unconfigured_relay_falls_back_to_log() {
        assert!(from_config(&SmtpConfig::default()).is_ok());
    }

    #[test]
    fn test_smtp_notifier_rejects_bad_from() {
        let config = SmtpConfig {
            host: Some("localhost".into()),
            tls: SmtpTls::None,
            from: "not an address".into(),
            ..SmtpConfig::default()
        };
        assert!(matches!(SmtpNotifier::new(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let note = Notification::test("ops@x.com");
        assert!(LogNotifier.send(&note).await.is_ok());
    }
}
