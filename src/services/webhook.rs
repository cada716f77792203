//! Catalog notifications posted to a Discord-compatible webhook
//!
//! Fire-and-forget: a failed or unconfigured webhook never affects pipeline
//! outcome, failures are logged at warn and dropped.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

/// A newly cataloged entity worth announcing.
#[derive(Debug, Clone)]
pub struct CatalogNotification {
    pub title: String,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

/// Sink for catalog notifications; tests substitute a recording fake.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: CatalogNotification);
}

/// Webhook sink posting one embed per notification.
pub struct DiscordWebhook {
    http: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    async fn notify(&self, notification: CatalogNotification) {
        let mut embed = json!({
            "title": notification.title,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Some(link) = &notification.link {
            embed["url"] = json!(link);
        }
        if let Some(image) = &notification.image_url {
            embed["image"] = json!({ "url": image });
        }

        let result = self
            .http
            .post(&self.url)
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => debug!(title = %notification.title, "Catalog notification sent"),
            Err(e) => warn!(title = %notification.title, error = %e, "Catalog notification failed"),
        }
    }
}

/// Sink used when no webhook URL is configured.
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify(&self, notification: CatalogNotification) {
        debug!(title = %notification.title, "Notifications disabled, skipping");
    }
}
