//! Name resolution for session addresses.
//!
//! One A record per active session, `{user_id}.{root_domain}`. Creation
//! refuses to overwrite, deletion requires the exact stored value and
//! TTL, and lookups compare names in canonical form so the zone-style
//! trailing dot and the bare form refer to the same record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("record '{0}' not found")]
    RecordNotFound(String),

    #[error("record '{0}' already exists")]
    RecordExists(String),

    #[error("record '{name}' does not match value '{value}' ttl {ttl}")]
    RecordMismatch { name: String, value: String, ttl: u32 },

    #[error("zone refused the change: {0}")]
    ChangeRefused(String),
}

/// Stored A record: address value plus TTL. Deletion must present both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub value: String,
    pub ttl: u32,
}

/// The session's public name: `{user_id}.{root_domain}`.
pub fn session_host(user_id: &str, root_domain: &str) -> String {
    format!("{user_id}.{root_domain}")
}

#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create the A record `name` → `value`. Fails if the name already
    /// holds a record.
    async fn create_record(&self, name: &str, value: &str, ttl: u32) -> Result<(), DnsError>;

    /// Current record for `name`, if any.
    async fn lookup(&self, name: &str) -> Result<Option<DnsRecord>, DnsError>;

    /// Delete `name`, but only when `value` and `ttl` match the stored
    /// record exactly.
    async fn delete_record(&self, name: &str, value: &str, ttl: u32) -> Result<(), DnsError>;
}

/// In-memory zone with scriptable create failures.
#[derive(Default)]
pub struct SimDns {
    records: Mutex<HashMap<String, DnsRecord>>,
    fail_creates: AtomicUsize,
}

impl SimDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` record creations.
    pub fn fail_creates(&self, n: usize) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn canonical(name: &str) -> String {
        name.trim_end_matches('.').to_ascii_lowercase()
    }
}

#[async_trait]
impl DnsProvider for SimDns {
    async fn create_record(&self, name: &str, value: &str, ttl: u32) -> Result<(), DnsError> {
        let failing = self.fail_creates.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_creates.store(failing - 1, Ordering::SeqCst);
            return Err(DnsError::ChangeRefused("scripted create failure".to_string()));
        }

        let key = Self::canonical(name);
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&key) {
            return Err(DnsError::RecordExists(name.to_string()));
        }
        records.insert(
            key,
            DnsRecord {
                value: value.to_string(),
                ttl,
            },
        );
        Ok(())
    }

    async fn lookup(&self, name: &str) -> Result<Option<DnsRecord>, DnsError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&Self::canonical(name))
            .cloned())
    }

    async fn delete_record(&self, name: &str, value: &str, ttl: u32) -> Result<(), DnsError> {
        let key = Self::canonical(name);
        let mut records = self.records.lock().unwrap();
        let stored = records
            .get(&key)
            .ok_or_else(|| DnsError::RecordNotFound(name.to_string()))?;
        if stored.value != value || stored.ttl != ttl {
            return Err(DnsError::RecordMismatch {
                name: name.to_string(),
                value: value.to_string(),
                ttl,
            });
        }
        records.remove(&key);
        Ok(())
    }
}
