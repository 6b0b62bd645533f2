use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::warn;

/// Provenance of one downloaded image, as written to `results.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub url: String,
    #[serde(rename = "source")]
    pub source_page: String,
    pub local_path: PathBuf,
    #[serde(rename = "site")]
    pub provider_id: String,
}

/// Item name to result record, filled in by the download workers.
#[derive(Debug, Default)]
pub struct ResultsTable {
    records: Mutex<BTreeMap<String, ResultRecord>>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful download. The first record for a name wins; later
    /// inserts are rejected and reported as `false`.
    pub async fn insert(&self, item_name: &str, record: ResultRecord) -> bool {
        let mut records = self.records.lock().await;
        if records.contains_key(item_name) {
            warn!("Ignoring second result for {}", item_name);
            return false;
        }
        records.insert(item_name.to_string(), record);
        true
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Copy of every record, ordered by item name.
    pub async fn snapshot(&self) -> BTreeMap<String, ResultRecord> {
        self.records.lock().await.clone()
    }
}
