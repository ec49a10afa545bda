use crate::config::Config;
use crate::error::CollectError;
use crate::record::MessageRecord;
use tracing::{debug, info, warn};

/// Thin client for the PostgREST endpoint of a Supabase project. Writes go
/// through upsert-on-conflict so replaying an overlapping window replaces
/// rows instead of duplicating them.
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
    batch_size: usize,
}

impl SupabaseStore {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_key.clone(),
            table: config.supabase_table.clone(),
            batch_size: config.upsert_batch_size,
        }
    }

    /// Upserts `records` in fixed-size batches, keyed on `id`. Returns the
    /// number of rows written. A failed batch aborts the rest; batches
    /// already written stay committed.
    pub async fn upsert(&self, records: &[MessageRecord]) -> Result<usize, CollectError> {
        if records.is_empty() {
            warn!("No messages to save");
            return Ok(0);
        }

        info!("Saving {} messages to table {}", records.len(), self.table);
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);

        let mut saved = 0;
        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            self.http
                .post(&url)
                .query(&[("on_conflict", "id")])
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(batch)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|source| CollectError::Store {
                    batch: index + 1,
                    source,
                })?;

            saved += batch.len();
            debug!("Saved batch {}: {} messages", index + 1, batch.len());
        }

        info!("Successfully saved {} messages", saved);
        Ok(saved)
    }
}
