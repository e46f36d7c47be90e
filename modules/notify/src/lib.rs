//! Outbound notifications: the `Notifier` seam, the email API client and the liveness heartbeat.

mod brevo;
mod heartbeat;

pub use brevo::{BrevoConfig, BrevoNotifier, EmailPayload};
pub use heartbeat::spawn_heartbeat;

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Message { subject: subject.into(), body: body.into() }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode notification payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("notifier is not configured: {0}")]
    Config(String),
}

/// Delivers a message somewhere and reports a status code.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<u16, NotifyError>;
}

/// Best-effort delivery: failures and non-2xx statuses are logged and otherwise ignored.
pub async fn deliver(notifier: &dyn Notifier, message: &Message) -> Option<u16> {
    match notifier.send(message).await {
        Ok(status) if (200..300).contains(&status) => Some(status),
        Ok(status) => {
            warn!(subject = %message.subject, status, "notification rejected");
            Some(status)
        }
        Err(e) => {
            warn!(subject = %message.subject, error = %e, "notification failed");
            None
        }
    }
}

/// Writes messages to the log instead of sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &Message) -> Result<u16, NotifyError> {
        info!(subject = %message.subject, "{}", message.body.trim_end());
        Ok(200)
    }
}

/// Keeps every message in memory and answers with a fixed status.
#[derive(Debug)]
pub struct RecordingNotifier {
    status: u16,
    sent: Mutex<Vec<Message>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::with_status(200)
    }
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: u16) -> Self {
        RecordingNotifier { status, sent: Mutex::new(Vec::new()) }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count_subject(&self, subject: &str) -> usize {
        self.messages().iter().filter(|m| m.subject == subject).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &Message) -> Result<u16, NotifyError> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).push(message.clone());
        Ok(self.status)
    }
}
