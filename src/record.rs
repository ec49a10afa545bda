use crate::discord::{ChannelInfo, GuildInfo, RawMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One flattened row of the `discord_messages` table. `id` is the upsert
/// conflict key; snowflakes are stored as 64-bit integers because they
/// overflow 32 bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub channel_id: i64,
    pub channel_name: String,
    pub server_id: Option<i64>,
    pub server_name: String,
    pub author_id: i64,
    pub author_name: String,
    pub author_discriminator: String,
    pub author_avatar: String,
    pub content: String,
    pub timestamp: String,
    pub message_type: i64,
    pub is_pinned: bool,
    pub reference_message_id: Option<i64>,
    pub attachments: String,
    pub embeds: String,
    pub reactions: String,
    pub mentions: String,
}

/// Flatten one raw message plus its (possibly missing) channel and guild
/// context into a store-ready row. Pure; metadata that failed to resolve
/// leaves empty-string/null placeholders behind.
pub fn format_message(
    msg: &RawMessage,
    channel: Option<&ChannelInfo>,
    guild: Option<&GuildInfo>,
) -> MessageRecord {
    let author = &msg.author;
    let author_avatar = match &author.avatar {
        Some(hash) if !author.id.is_empty() => format!(
            "https://cdn.discordapp.com/avatars/{}/{}.png",
            author.id, hash
        ),
        _ => String::new(),
    };

    MessageRecord {
        id: parse_snowflake(&msg.id),
        channel_id: channel.map(|c| parse_snowflake(&c.id)).unwrap_or(0),
        channel_name: channel.map(|c| c.name.clone()).unwrap_or_default(),
        server_id: guild.map(|g| parse_snowflake(&g.id)),
        server_name: guild.map(|g| g.name.clone()).unwrap_or_default(),
        author_id: parse_snowflake(&author.id),
        author_name: author.username.clone(),
        author_discriminator: author.discriminator.clone(),
        author_avatar,
        content: msg.content.clone(),
        timestamp: msg.timestamp.clone(),
        message_type: msg.kind,
        is_pinned: msg.pinned,
        reference_message_id: msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id.as_deref())
            .map(parse_snowflake),
        attachments: encode_json(&msg.attachments),
        embeds: encode_json(&msg.embeds),
        reactions: encode_json(&msg.reactions),
        mentions: encode_json(&msg.mentions),
    }
}

pub fn format_messages(
    messages: &[RawMessage],
    channel: Option<&ChannelInfo>,
    guild: Option<&GuildInfo>,
) -> Vec<MessageRecord> {
    messages
        .iter()
        .map(|msg| format_message(msg, channel, guild))
        .collect()
}

// Missing or garbled ids degrade to 0 rather than aborting the pipeline.
fn parse_snowflake(raw: &str) -> i64 {
    raw.parse().unwrap_or(0)
}

// An empty list must encode to "[]", never null.
fn encode_json(values: &[Value]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}
