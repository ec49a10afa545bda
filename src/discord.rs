use crate::config::Config;
use crate::error::CollectError;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// One message as returned by `GET /channels/{id}/messages`. Only the
/// fields the flat record needs are decoded; the four side-channel lists
/// stay raw JSON so they can be re-serialized verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub timestamp: String,
    #[serde(default)]
    pub author: RawAuthor,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub message_reference: Option<RawMessageReference>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub embeds: Vec<Value>,
    #[serde(default)]
    pub reactions: Vec<Value>,
    #[serde(default)]
    pub mentions: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAuthor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessageReference {
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

pub struct DiscordClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    page_limit: usize,
}

impl DiscordClient {
    /// The token is sent as-is so both `Bot <token>` and user tokens work.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: config.discord_token.clone(),
            base_url: DISCORD_API_BASE.to_string(),
            page_limit: config.fetch_page_limit,
        }
    }

    /// Point the client at a different API root, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Walks the channel's history backwards, page by page, and returns
    /// every message created at or after `horizon`, newest first.
    ///
    /// The loop ends when a page comes back shorter than the page limit
    /// (history exhausted) or at the first message older than the horizon.
    /// Messages on the page after that one are discarded: the listing is
    /// ordered newest-first, so nothing past the boundary can be in window.
    pub async fn fetch_window(
        &self,
        channel_id: &str,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<RawMessage>, CollectError> {
        info!(
            "Fetching messages from channel {} back to {}",
            channel_id, horizon
        );

        let mut collected = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let page = self.messages_page(channel_id, before.as_deref()).await?;
            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            // Oldest id on the page, the cursor for the next (older) page.
            let cursor = page.last().map(|m| m.id.clone());

            for msg in page {
                if parse_timestamp(&msg.id, &msg.timestamp)? < horizon {
                    info!("Total fetched: {} messages", collected.len());
                    return Ok(collected);
                }
                collected.push(msg);
            }

            debug!("Fetched {} messages in this page", page_len);

            if page_len < self.page_limit {
                break;
            }
            before = cursor;
        }

        info!("Total fetched: {} messages", collected.len());
        Ok(collected)
    }

    async fn messages_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
    ) -> Result<Vec<RawMessage>, CollectError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let mut request = self
            .http
            .get(&url)
            .header(AUTHORIZATION, &self.token)
            .query(&[("limit", self.page_limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before)]);
        }

        let fetch_err = |source| CollectError::Fetch {
            channel_id: channel_id.to_string(),
            source,
        };
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        response.json().await.map_err(fetch_err)
    }

    /// Channel metadata. Failures are non-fatal: the record fields this
    /// feeds are cosmetic, so a lookup error degrades to `None`.
    pub async fn channel_info(&self, channel_id: &str) -> Option<ChannelInfo> {
        let url = format!("{}/channels/{}", self.base_url, channel_id);
        match self.get_json(&url).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Failed to fetch channel info for {}: {}", channel_id, e);
                None
            }
        }
    }

    /// Guild metadata, same degradation policy as the channel lookup.
    pub async fn guild_info(&self, guild_id: &str) -> Option<GuildInfo> {
        let url = format!("{}/guilds/{}", self.base_url, guild_id);
        match self.get_json(&url).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Failed to fetch guild info for {}: {}", guild_id, e);
                None
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> reqwest::Result<T> {
        self.http
            .get(url)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

fn parse_timestamp(message_id: &str, raw: &str) -> Result<DateTime<Utc>, CollectError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| CollectError::Timestamp {
            message_id: message_id.to_string(),
            source,
        })
}
