//! Fetch Cache
//!
//! Immutable, content-keyed store of raw provider responses. One SQLite row
//! per request fingerprint; the first stored payload for a key wins and later
//! stores are no-ops. A bounded DashMap memo serves repeat lookups of small
//! payloads within a process.

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::FetchRequest;
use crate::constants::fetch::{MEMO_MAX_ENTRIES, MEMO_MAX_PAYLOAD_BYTES};
use crate::storage::{Database, PoolConfig, SharedDatabase};
use crate::types::Result;

/// Cache size summary for `status` and `clean`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub payload_bytes: u64,
    pub by_provider: BTreeMap<String, u64>,
}

pub struct FetchCache {
    db: SharedDatabase,
    memo: DashMap<String, Value>,
}

impl FetchCache {
    pub fn open(path: &Path, concurrency: usize) -> Result<Self> {
        let db = Database::open_with_config(path, PoolConfig::for_concurrency(concurrency))?;
        Ok(Self::with_database(Arc::new(db)))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::with_database(Arc::new(Database::open_in_memory()?)))
    }

    pub fn with_database(db: SharedDatabase) -> Self {
        Self {
            db,
            memo: DashMap::new(),
        }
    }

    /// Payload stored under `key`, if any
    pub fn lookup(&self, key: &str) -> Result<Option<Value>> {
        if let Some(hit) = self.memo.get(key) {
            return Ok(Some(hit.value().clone()));
        }

        let conn = self.db.connection()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM fetch_cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(raw) => {
                let value: Value = serde_json::from_str(&raw)?;
                self.remember(key, raw.len(), &value);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Store a payload. Returns false when the key already existed.
    pub fn store(&self, key: &str, request: &FetchRequest, payload: &Value) -> Result<bool> {
        let raw = serde_json::to_string(payload)?;
        let conn = self.db.connection()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO fetch_cache (key, provider, url, payload, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key,
                request.provider,
                request.url,
                raw,
                Utc::now().to_rfc3339()
            ],
        )?;

        if inserted == 0 {
            debug!(key, "cache entry already present; keeping original payload");
            return Ok(false);
        }

        self.remember(key, raw.len(), payload);
        Ok(true)
    }

    /// Memoize small payloads; a full memo starts over
    fn remember(&self, key: &str, size: usize, value: &Value) {
        if size > MEMO_MAX_PAYLOAD_BYTES {
            return;
        }
        if self.memo.len() >= MEMO_MAX_ENTRIES && !self.memo.contains_key(key) {
            debug!(entries = self.memo.len(), "fetch memo full; clearing");
            self.memo.clear();
        }
        self.memo.insert(key.to_string(), value.clone());
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(
            "SELECT provider, COUNT(*), COALESCE(SUM(LENGTH(payload)), 0)
             FROM fetch_cache GROUP BY provider ORDER BY provider",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut stats = CacheStats::default();
        for row in rows {
            let (provider, count, bytes) = row?;
            stats.entries += count as u64;
            stats.payload_bytes += bytes as u64;
            stats.by_provider.insert(provider, count as u64);
        }
        Ok(stats)
    }

    /// Delete every entry. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self
            .db
            .transaction(|conn| Ok(conn.execute("DELETE FROM fetch_cache", [])?))?;
        self.memo.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn request() -> FetchRequest {
        FetchRequest::new("sec", "https://data.sec.gov/submissions/CIK0000000001.json")
    }

    #[test]
    fn test_lookup_miss() {
        let cache = FetchCache::open_in_memory().unwrap();
        assert!(cache.lookup("missing").unwrap().is_none());
    }

    #[test]
    fn test_store_then_lookup() {
        let cache = FetchCache::open_in_memory().unwrap();
        let req = request();
        let key = req.fingerprint();

        assert!(cache.store(&key, &req, &json!({"name": "XYZ Corp"})).unwrap());
        assert_eq!(cache.lookup(&key).unwrap(), Some(json!({"name": "XYZ Corp"})));
    }

    #[test]
    fn test_duplicate_store_keeps_first_payload() {
        let cache = FetchCache::open_in_memory().unwrap();
        let req = request();
        let key = req.fingerprint();

        assert!(cache.store(&key, &req, &json!({"v": 1})).unwrap());
        assert!(!cache.store(&key, &req, &json!({"v": 2})).unwrap());
        assert_eq!(cache.lookup(&key).unwrap(), Some(json!({"v": 1})));
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fetch_cache.db");
        let req = request();
        let key = req.fingerprint();

        {
            let cache = FetchCache::open(&path, 2).unwrap();
            cache.store(&key, &req, &json!([1, 2, 3])).unwrap();
        }

        let reopened = FetchCache::open(&path, 2).unwrap();
        assert_eq!(reopened.lookup(&key).unwrap(), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_large_payload_not_memoized() {
        let cache = FetchCache::open_in_memory().unwrap();
        let req = request();
        let key = req.fingerprint();
        let facts = json!({"facts": "x".repeat(MEMO_MAX_PAYLOAD_BYTES + 1)});

        cache.store(&key, &req, &facts).unwrap();
        assert!(cache.memo.is_empty());
        assert_eq!(cache.lookup(&key).unwrap(), Some(facts));
        assert!(cache.memo.is_empty());
    }

    #[test]
    fn test_memo_stays_bounded() {
        let cache = FetchCache::open_in_memory().unwrap();
        let mut keys = Vec::new();
        for day in 0..(MEMO_MAX_ENTRIES + 10) {
            let req = FetchRequest::new("market", "https://example.com/quote")
                .param("symbol", "XYZ")
                .bucket(format!("day-{}", day));
            let key = req.fingerprint();
            cache.store(&key, &req, &json!({"price": day})).unwrap();
            assert!(cache.memo.len() <= MEMO_MAX_ENTRIES);
            keys.push(key);
        }

        // evicted entries still come back from SQLite
        assert_eq!(cache.lookup(&keys[0]).unwrap(), Some(json!({"price": 0})));
    }

    #[test]
    fn test_stats_and_clear() {
        let cache = FetchCache::open_in_memory().unwrap();
        let sec = request();
        let market = FetchRequest::new("market", "https://example.com/quote").param("symbol", "XYZ");
        cache.store(&sec.fingerprint(), &sec, &json!({"a": 1})).unwrap();
        cache.store(&market.fingerprint(), &market, &json!({"b": 2})).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.by_provider.get("sec"), Some(&1));
        assert!(stats.payload_bytes > 0);

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.lookup(&sec.fingerprint()).unwrap().is_none());
        assert_eq!(cache.stats().unwrap().entries, 0);
    }
}
