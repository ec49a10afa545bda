use thiserror::Error;

/// Failures surfaced by a collection run, tagged with the stage they
/// happened in so operators can tell a Discord outage from a store outage.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("invalid collection window: {0}")]
    Window(String),

    #[error("failed to fetch messages from channel {channel_id}: {source}")]
    Fetch {
        channel_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed timestamp on message {message_id}: {source}")]
    Timestamp {
        message_id: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("failed to upsert batch {batch}: {source}")]
    Store {
        batch: usize,
        #[source]
        source: reqwest::Error,
    },
}
