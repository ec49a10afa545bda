pub mod collector;
pub mod config;
pub mod discord;
pub mod error;
pub mod record;
pub mod server;
pub mod supabase;
pub mod tasks;

pub use collector::{CollectionSummary, Collector, Window};
pub use error::CollectError;
