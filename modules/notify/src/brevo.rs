use crate::{Message, Notifier, NotifyError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Transactional email API endpoint and the addresses used for every message.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BrevoConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default = "default_to_name")]
    pub to_name: String,
    #[serde(default)]
    pub to_email: String,
}

fn default_sender_name() -> String { "Port Scanner Bot".into() }
fn default_to_name() -> String { "Admin".into() }

impl BrevoConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, sender_email: impl Into<String>, to_email: impl Into<String>) -> Self {
        BrevoConfig {
            url: url.into(),
            api_key: api_key.into(),
            sender_name: default_sender_name(),
            sender_email: sender_email.into(),
            to_name: default_to_name(),
            to_email: to_email.into(),
        }
    }

    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.url.trim().is_empty() {
            return Err(NotifyError::Config("BREVO_URL is not set".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(NotifyError::Config("BREVO_APIKEY is not set".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Contact {
    pub email: String,
    pub name: String,
}

/// JSON body accepted by the email API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailPayload {
    pub sender: Contact,
    pub to: Vec<Contact>,
    pub subject: String,
    pub html_content: String,
    pub headers: BTreeMap<String, String>,
}

impl EmailPayload {
    pub fn build(cfg: &BrevoConfig, message: &Message, at: OffsetDateTime) -> Self {
        let stamp = at.format(&Rfc3339).unwrap_or_default();
        let body = message.body.replace('\n', "<br>");
        let html = format!(
            "<html><head></head><body><p>{body}<br>on {stamp} in timezone UTC</p></body></html>"
        );
        EmailPayload {
            sender: Contact { email: cfg.sender_email.clone(), name: cfg.sender_name.clone() },
            to: vec![Contact { email: cfg.to_email.clone(), name: cfg.to_name.clone() }],
            subject: message.subject.clone(),
            html_content: html,
            headers: BTreeMap::from([("Reply-To".to_string(), cfg.sender_email.clone())]),
        }
    }
}

pub struct BrevoNotifier {
    client: Client,
    cfg: BrevoConfig,
}

impl BrevoNotifier {
    pub fn new(cfg: BrevoConfig, request_timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(format!("sweeper/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(cfg, client)
    }

    pub fn with_client(cfg: BrevoConfig, client: Client) -> Result<Self, NotifyError> {
        cfg.validate()?;
        Ok(BrevoNotifier { client, cfg })
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    async fn send(&self, message: &Message) -> Result<u16, NotifyError> {
        let payload = EmailPayload::build(&self.cfg, message, OffsetDateTime::now_utc());
        let body = serde_json::to_vec_pretty(&payload)?;
        let res = self
            .client
            .post(&self.cfg.url)
            .header("accept", "application/json")
            .header("api-key", &self.cfg.api_key)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;
        Ok(res.status().as_u16())
    }
}
