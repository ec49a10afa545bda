use crate::config::Config;
use crate::discord::DiscordClient;
use crate::error::CollectError;
use crate::record::format_messages;
use crate::supabase::SupabaseStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::info;

/// How far back a collection reaches. Built through the validating
/// constructors so an out-of-range request is rejected before any network
/// call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Hours(u32),
    Days(u32),
}

impl Window {
    pub const MAX_HOURS: u32 = 24;

    pub fn hours(hours: u32) -> Result<Self, CollectError> {
        if (1..=Self::MAX_HOURS).contains(&hours) {
            Ok(Window::Hours(hours))
        } else {
            Err(CollectError::Window(format!(
                "hours must be between 1 and {}, got {}",
                Self::MAX_HOURS,
                hours
            )))
        }
    }

    pub fn days(days: u32) -> Result<Self, CollectError> {
        if days >= 1 {
            Ok(Window::Days(days))
        } else {
            Err(CollectError::Window("days must be at least 1".to_string()))
        }
    }

    pub fn lookback(self) -> Duration {
        match self {
            Window::Hours(h) => Duration::hours(h as i64),
            Window::Days(d) => Duration::days(d as i64),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Hours(h) => write!(f, "{}h", h),
            Window::Days(d) => write!(f, "{}d", d),
        }
    }
}

/// What a finished collection reports back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub status: String,
    pub channel_id: String,
    pub channel_name: String,
    pub server_name: String,
    pub window: String,
    pub messages_fetched: usize,
    pub messages_saved: usize,
    pub execution_time: String,
    pub timestamp: DateTime<Utc>,
}

/// Runs the whole fetch, enrich, format and upsert pipeline for one
/// channel. Each call is one sequential unit of work; concurrent calls for
/// the same channel are not deduplicated, the idempotent upsert makes them
/// converge.
pub struct Collector {
    discord: DiscordClient,
    store: SupabaseStore,
}

impl Collector {
    pub fn new(config: &Config) -> Self {
        Self {
            discord: DiscordClient::new(config),
            store: SupabaseStore::new(config),
        }
    }

    pub fn from_parts(discord: DiscordClient, store: SupabaseStore) -> Self {
        Self { discord, store }
    }

    pub async fn collect(
        &self,
        channel_id: &str,
        window: Window,
    ) -> Result<CollectionSummary, CollectError> {
        let started = Instant::now();
        let started_at = Utc::now();
        let horizon = started_at - window.lookback();
        info!(
            "Starting collection for channel {}, last {}",
            channel_id, window
        );

        let messages = self.discord.fetch_window(channel_id, horizon).await?;

        let channel = self.discord.channel_info(channel_id).await;
        let guild = match channel.as_ref().and_then(|c| c.guild_id.as_deref()) {
            Some(guild_id) => self.discord.guild_info(guild_id).await,
            None => None,
        };

        let records = format_messages(&messages, channel.as_ref(), guild.as_ref());
        let saved = self.store.upsert(&records).await?;

        let elapsed = std::time::Duration::from_millis(started.elapsed().as_millis() as u64);
        let summary = CollectionSummary {
            status: "success".to_string(),
            channel_id: channel_id.to_string(),
            channel_name: channel.map(|c| c.name).unwrap_or_default(),
            server_name: guild.map(|g| g.name).unwrap_or_default(),
            window: window.to_string(),
            messages_fetched: messages.len(),
            messages_saved: saved,
            execution_time: humantime::format_duration(elapsed).to_string(),
            timestamp: started_at,
        };

        info!(
            "Collection completed for channel {}: fetched {}, saved {} in {}",
            channel_id, summary.messages_fetched, summary.messages_saved, summary.execution_time
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn window_bounds() {
        assert!(Window::hours(0).is_err());
        assert!(Window::hours(25).is_err());
        assert_eq!(Window::hours(1).unwrap(), Window::Hours(1));
        assert_eq!(Window::hours(24).unwrap(), Window::Hours(24));
        assert!(Window::days(0).is_err());
        assert_eq!(Window::days(5).unwrap(), Window::Days(5));
    }

    #[test]
    fn window_display_and_lookback() {
        assert_eq!(Window::Hours(6).to_string(), "6h");
        assert_eq!(Window::Days(5).to_string(), "5d");
        assert_eq!(Window::Hours(24).lookback(), Duration::hours(24));
        assert_eq!(Window::Days(2).lookback(), Duration::days(2));
    }

    fn recent_message(id: &str) -> serde_json::Value {
        // Well inside any 1h+ window relative to the test run.
        let timestamp = (Utc::now() - Duration::minutes(5)).to_rfc3339();
        json!({
            "id": id,
            "timestamp": timestamp,
            "author": {"id": "9", "username": "trader", "discriminator": "0"},
            "content": "hello",
            "type": 0,
            "pinned": false,
        })
    }

    fn test_collector(server: &mockito::Server) -> Collector {
        let config = Config {
            discord_token: "test-token".to_string(),
            supabase_url: server.url(),
            supabase_key: "service-key".to_string(),
            supabase_table: "discord_messages".to_string(),
            default_channel_id: None,
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            collection_hours: 1,
            collection_days: 1,
            fetch_page_limit: 100,
            upsert_batch_size: 50,
        };
        let discord = DiscordClient::new(&config).with_base_url(server.url());
        let store = SupabaseStore::new(&config);
        Collector::from_parts(discord, store)
    }

    #[tokio::test]
    async fn collects_formats_and_saves() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/channels/42/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([recent_message("202"), recent_message("201")]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/channels/42")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "42", "name": "main-stock-chat", "guild_id": "7"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/guilds/7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "7", "name": "momentum messengers"}).to_string())
            .create_async()
            .await;
        let upsert = server
            .mock("POST", "/rest/v1/discord_messages")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "id".into()))
            .with_status(201)
            .expect(1)
            .create_async()
            .await;

        let collector = test_collector(&server);
        let summary = collector
            .collect("42", Window::hours(1).unwrap())
            .await
            .unwrap();

        assert_eq!(summary.status, "success");
        assert_eq!(summary.channel_name, "main-stock-chat");
        assert_eq!(summary.server_name, "momentum messengers");
        assert_eq!(summary.messages_fetched, 2);
        assert_eq!(summary.messages_saved, 2);
        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn rerun_converges_through_upsert() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/channels/42/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([recent_message("201")]).to_string())
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/channels/42")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "42", "name": "main-stock-chat"}).to_string())
            .expect(2)
            .create_async()
            .await;
        // Both runs write the same conflict key; the store replaces the row.
        let upsert = server
            .mock("POST", "/rest/v1/discord_messages")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "id".into()))
            .with_status(201)
            .expect(2)
            .create_async()
            .await;

        let collector = test_collector(&server);
        let first = collector
            .collect("42", Window::hours(1).unwrap())
            .await
            .unwrap();
        let second = collector
            .collect("42", Window::hours(2).unwrap())
            .await
            .unwrap();

        assert_eq!(first.messages_saved, 1);
        assert_eq!(second.messages_saved, 1);
        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn metadata_failure_still_collects() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/channels/42/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([recent_message("201")]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/channels/42")
            .with_status(403)
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/discord_messages")
            .match_query(Matcher::Any)
            .with_status(201)
            .create_async()
            .await;

        let collector = test_collector(&server);
        let summary = collector
            .collect("42", Window::hours(1).unwrap())
            .await
            .unwrap();

        assert_eq!(summary.channel_name, "");
        assert_eq!(summary.server_name, "");
        assert_eq!(summary.messages_saved, 1);
    }
}
