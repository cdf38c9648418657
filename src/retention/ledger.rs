use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::Result;

/// Files that expire together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryRecord {
    pub batch_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub paths: Vec<PathBuf>,
}

impl ExpiryRecord {
    /// Build a record. `expires_at` is truncated to milliseconds, the
    /// precision both the key and the stored value keep.
    pub fn new(batch_id: impl Into<String>, expires_at: DateTime<Utc>, paths: Vec<PathBuf>) -> Self {
        let expires_at =
            DateTime::from_timestamp_millis(expires_at.timestamp_millis()).unwrap_or(expires_at);

        Self {
            batch_id: batch_id.into(),
            expires_at,
            paths,
        }
    }
}

/// Key layout: `exp:{expires_at_ms:020}:{batch_id}`.
/// Zero padding keeps lexicographic order equal to expiry order.
pub fn encode_expiry_key(expires_at: DateTime<Utc>, batch_id: &str) -> Vec<u8> {
    let millis = expires_at.timestamp_millis().max(0);
    format!("exp:{:020}:{}", millis, batch_id).into_bytes()
}

/// Decode `exp:{ms}:{batch_id}` -> (ms, batch_id)
pub fn decode_expiry_key(key: &[u8]) -> Option<(i64, String)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (millis, batch_id) = key_str.strip_prefix("exp:")?.split_once(':')?;
    Some((millis.parse().ok()?, batch_id.to_string()))
}

/// Durable record of scheduled deletions, so a restart does not orphan files
#[derive(Clone)]
pub struct ExpiryLedger {
    keyspace: Keyspace,
    expiries: PartitionHandle,
}

impl ExpiryLedger {
    /// Open or create the ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening expiry ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let expiries = keyspace.open_partition("expiries", PartitionCreateOptions::default())?;

        Ok(Self { keyspace, expiries })
    }

    pub fn record(&self, record: &ExpiryRecord) -> Result<()> {
        let key = encode_expiry_key(record.expires_at, &record.batch_id);
        self.expiries.insert(key, serde_json::to_vec(record)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(batch_id = %record.batch_id, expires_at = %record.expires_at, "Recorded expiry");
        Ok(())
    }

    pub fn remove(&self, record: &ExpiryRecord) -> Result<()> {
        self.expiries
            .remove(encode_expiry_key(record.expires_at, &record.batch_id))?;
        debug!(batch_id = %record.batch_id, "Removed expiry");
        Ok(())
    }

    /// Every recorded batch, earliest expiry first
    pub fn all(&self) -> Result<Vec<ExpiryRecord>> {
        self.scan(None)
    }

    /// Batches whose expiry is at or before `now`, earliest first
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<ExpiryRecord>> {
        self.scan(Some(now.timestamp_millis()))
    }

    /// Number of recorded batches
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.expiries.iter() {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn scan(&self, cutoff_millis: Option<i64>) -> Result<Vec<ExpiryRecord>> {
        let mut records = Vec::new();

        for item in self.expiries.iter() {
            let (key, value) = item?;

            let Some((millis, _)) = decode_expiry_key(&key) else {
                warn!(key = %String::from_utf8_lossy(&key), "Skipping malformed expiry key");
                continue;
            };

            if cutoff_millis.is_some_and(|cutoff| millis > cutoff) {
                break;
            }

            match serde_json::from_slice(&value) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %err, "Skipping unreadable expiry record");
                }
            }
        }

        Ok(records)
    }
}
