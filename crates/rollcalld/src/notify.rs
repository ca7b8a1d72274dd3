//! Notification dispatch — best-effort, fire-and-forget.
//!
//! The decision loop hands over a name; the dispatcher resolves the
//! contact and builds the outbound message. Delivery failures are logged
//! and never propagated: the attendance fact is already durable by the
//! time a notification fires, so a lost alert loses nothing but the
//! alert.

use rollcall_store::Store;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// An outbound message, transport-agnostic.
#[derive(Debug, Clone)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Outbound delivery boundary. The relay that actually speaks SMTP lives
/// outside this process; in-tree the default transport records the
/// message in the log.
pub trait MailTransport: Send + Sync {
    fn send(&self, message: &Message) -> Result<(), TransportError>;
}

/// Default transport: structured log of the outbound message.
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "outbound message"
        );
        Ok(())
    }
}

/// Called by the decision loop when a new attendance fact is recorded.
pub trait Notifier {
    fn notify(&self, name: &str);
}

/// Resolves the student's contact and mails the guardian.
pub struct EmailNotifier {
    store: Store,
    transport: Arc<dyn MailTransport>,
}

impl EmailNotifier {
    /// `store` should be this notifier's own handle; dispatch can run
    /// while the capture loop holds its own connection.
    pub fn new(store: Store, transport: Arc<dyn MailTransport>) -> Self {
        Self { store, transport }
    }
}

impl Notifier for EmailNotifier {
    fn notify(&self, name: &str) {
        let contact = match self.store.contact(name) {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                tracing::warn!(name, "no contact on file, notification skipped");
                return;
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "contact lookup failed, notification skipped");
                return;
            }
        };

        let Some(email) = contact.email else {
            tracing::warn!(name, "contact has no email, notification skipped");
            return;
        };

        let message = attendance_message(name, &email);
        match self.transport.send(&message) {
            Ok(()) => tracing::info!(name, to = %message.to, "attendance notification sent"),
            Err(e) => tracing::warn!(name, error = %e, "notification delivery failed"),
        }
    }
}

fn attendance_message(name: &str, email: &str) -> Message {
    Message {
        to: email.to_string(),
        subject: format!("Attendance Marked - {name}"),
        body: format!(
            "Dear Parent/Guardian,\n\n\
             This is to inform you that attendance has been marked for {name}.\n\n\
             Best regards,\n\
             Rollcall Attendance System\n"
        ),
        attachments: Vec::new(),
    }
}
