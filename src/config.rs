use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

/// Discord's hard cap on the page size of the message-listing endpoint.
pub const DISCORD_PAGE_LIMIT_MAX: usize = 100;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub supabase_url: String,
    pub supabase_key: String,
    pub supabase_table: String,
    pub default_channel_id: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub collection_hours: u32,
    pub collection_days: u32,
    pub fetch_page_limit: usize,
    pub upsert_batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            supabase_url: env::var("SUPABASE_URL")
                .map_err(|_| anyhow::anyhow!("SUPABASE_URL must be set"))?,
            supabase_key: env::var("SUPABASE_KEY")
                .map_err(|_| anyhow::anyhow!("SUPABASE_KEY must be set"))?,
            supabase_table: env::var("SUPABASE_TABLE")
                .unwrap_or_else(|_| "discord_messages".to_string()),
            default_channel_id: env::var("DEFAULT_CHANNEL_ID").ok(),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            collection_hours: env::var("COLLECTION_HOURS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            collection_days: env::var("COLLECTION_DAYS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            fetch_page_limit: env::var("FETCH_PAGE_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse::<usize>()
                .unwrap_or(DISCORD_PAGE_LIMIT_MAX)
                .clamp(1, DISCORD_PAGE_LIMIT_MAX),
            upsert_batch_size: env::var("UPSERT_BATCH_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse::<usize>()
                .unwrap_or(50)
                .max(1),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &"[REDACTED]")
            .field("supabase_table", &self.supabase_table)
            .field("default_channel_id", &self.default_channel_id)
            .field("api_host", &self.api_host)
            .field("api_port", &self.api_port)
            .field("collection_hours", &self.collection_hours)
            .field("collection_days", &self.collection_days)
            .field("fetch_page_limit", &self.fetch_page_limit)
            .field("upsert_batch_size", &self.upsert_batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Test missing vars
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("SUPABASE_URL");
        env::remove_var("SUPABASE_KEY");
        let result = Config::build();
        assert!(
            result.is_err(),
            "Should fail when required vars are missing"
        );

        // 2. Test defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        env::set_var("SUPABASE_URL", "https://project.supabase.co");
        env::set_var("SUPABASE_KEY", "secret_key");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.supabase_table, "discord_messages");
        assert_eq!(config.api_port, 8000);
        assert_eq!(config.collection_hours, 1);
        assert_eq!(config.collection_days, 5);
        assert_eq!(config.fetch_page_limit, 100);
        assert_eq!(config.upsert_batch_size, 50);

        // 3. Page limit is clamped to Discord's cap
        env::set_var("FETCH_PAGE_LIMIT", "500");
        let clamped = Config::build().unwrap();
        assert_eq!(clamped.fetch_page_limit, DISCORD_PAGE_LIMIT_MAX);
        env::remove_var("FETCH_PAGE_LIMIT");

        // 4. Test debug redaction
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("secret_key"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("SUPABASE_URL");
        env::remove_var("SUPABASE_KEY");
    }
}
