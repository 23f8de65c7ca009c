//! E-mail digest of newly inserted opportunities, delivered through a transactional mail relay.

use std::sync::Arc;

use askama::Template;
use async_trait::async_trait;
use chrono::NaiveDate;
use paoh_core::Opportunity;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

pub const CRATE_NAME: &str = "paoh-notify";

/// Items rendered in full before the "+N more" note.
pub const PREVIEW_LIMIT: usize = 15;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("rendering digest: {0}")]
    Render(#[from] askama::Error),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("mail relay returned {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Submit-only outbound mail.
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn submit(&self, message: &MailMessage) -> Result<(), NotifyError>;
}

/// JSON-over-HTTP relay authenticated with the sender's credentials.
#[derive(Debug, Clone)]
pub struct HttpMailRelay {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
}

impl HttpMailRelay {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl MailRelay for HttpMailRelay {
    async fn submit(&self, message: &MailMessage) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(message)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::HttpStatus {
                status,
                url: self.endpoint.clone(),
            });
        }
        Ok(())
    }
}

/// Keeps submitted messages in memory; can be told to refuse them.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutbox {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    refuse: bool,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailRelay for MemoryOutbox {
    async fn submit(&self, message: &MailMessage) -> Result<(), NotifyError> {
        if self.refuse {
            return Err(NotifyError::Message("relay refused message".to_string()));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderCredentials {
    pub address: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct DigestConfig {
    /// `None` disables the digest.
    pub sender: Option<SenderCredentials>,
    pub recipients: Vec<String>,
    pub sheet_id: String,
}

/// Human view of the spreadsheet.
pub fn sheet_link(sheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{sheet_id}")
}

pub fn digest_subject(today: NaiveDate) -> String {
    format!("Weekly Opportunities Report - {}", today.format("%m/%d/%Y"))
}

struct DigestItem<'a> {
    title: &'a str,
    link: &'a str,
    organization: &'a str,
    budget: &'a str,
    deadline: &'a str,
}

#[derive(Template)]
#[template(path = "digest.html")]
struct DigestTemplate<'a> {
    total: usize,
    sheet_link: &'a str,
    items: Vec<DigestItem<'a>>,
    remaining: usize,
}

/// Render the HTML body: the first [`PREVIEW_LIMIT`] items, then a note for the rest.
pub fn render_digest(items: &[Opportunity], sheet_link: &str) -> Result<String, NotifyError> {
    let preview: Vec<DigestItem<'_>> = items
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|o| DigestItem {
            title: o.title(),
            link: o.link(),
            organization: o.organization(),
            budget: o.budget(),
            deadline: o.deadline(),
        })
        .collect();
    let tpl = DigestTemplate {
        total: items.len(),
        sheet_link,
        remaining: items.len().saturating_sub(preview.len()),
        items: preview,
    };
    Ok(tpl.render()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoCredentials,
    NoRelay,
    NoRecipients,
    NothingNew,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Skipped { reason: SkipReason },
    Sent { recipients: usize, previewed: usize },
    Failed { error: String },
}

pub struct NotificationDigest {
    config: DigestConfig,
    relay: Option<Arc<dyn MailRelay>>,
}

impl NotificationDigest {
    pub fn new(config: DigestConfig, relay: Option<Arc<dyn MailRelay>>) -> Self {
        Self { config, relay }
    }

    /// Send the digest for `items`. Never fails: problems are logged and reported in the outcome.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn send(&self, items: &[Opportunity], today: NaiveDate) -> DeliveryOutcome {
        let skip = |reason: SkipReason| {
            info!(?reason, "digest skipped");
            DeliveryOutcome::Skipped { reason }
        };
        let Some(sender) = &self.config.sender else {
            return skip(SkipReason::NoCredentials);
        };
        if items.is_empty() {
            return skip(SkipReason::NothingNew);
        }
        if self.config.recipients.is_empty() {
            return skip(SkipReason::NoRecipients);
        }
        let Some(relay) = &self.relay else {
            return skip(SkipReason::NoRelay);
        };

        let html = match render_digest(items, &sheet_link(&self.config.sheet_id)) {
            Ok(html) => html,
            Err(err) => {
                error!(error = %err, "digest render failed");
                return DeliveryOutcome::Failed { error: err.to_string() };
            }
        };
        let message = MailMessage {
            from: sender.address.clone(),
            to: self.config.recipients.clone(),
            subject: digest_subject(today),
            html,
        };

        match relay.submit(&message).await {
            Ok(()) => {
                info!(recipients = message.to.len(), "digest sent");
                DeliveryOutcome::Sent {
                    recipients: message.to.len(),
                    previewed: items.len().min(PREVIEW_LIMIT),
                }
            }
            Err(err) => {
                error!(error = %err, "digest delivery failed");
                DeliveryOutcome::Failed { error: err.to_string() }
            }
        }
    }
}
