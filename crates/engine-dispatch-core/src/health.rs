//! Engine health cache.
//!
//! [`EngineHealthCache`] remembers whether each engine passed its smoke test.
//! Entries are keyed by the engine's executable path only, so two engine
//! specs sharing an executable but not their leading arguments share one
//! entry.
//!
//! Health is assumed stable for the life of the cache: an entry is written
//! once and never evicted or re-checked. When two checks of the same engine
//! race, the first recorded result wins and both callers see it.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// Last known health of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The smoke test produced the expected output.
    Working,
    /// The smoke test failed to run or produced the wrong output.
    Broken,
}

impl HealthStatus {
    /// Returns `true` for [`HealthStatus::Working`].
    pub fn is_working(self) -> bool {
        self == Self::Working
    }
}

impl From<bool> for HealthStatus {
    fn from(working: bool) -> Self {
        if working { Self::Working } else { Self::Broken }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => f.write_str("working"),
            Self::Broken => f.write_str("broken"),
        }
    }
}

/// Map from engine executable path to last known health.
///
/// Cloning yields another handle to the same cache.
#[derive(Debug, Clone, Default)]
pub struct EngineHealthCache {
    entries: Arc<DashMap<String, HealthStatus>>,
}

impl EngineHealthCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached status for `executable`, if it has been checked.
    pub fn get(&self, executable: &str) -> Option<HealthStatus> {
        self.entries.get(executable).map(|entry| *entry)
    }

    /// Record `status` unless `executable` already has an entry.
    ///
    /// Returns the status that is in the cache afterwards.
    pub fn record(&self, executable: &str, status: HealthStatus) -> HealthStatus {
        *self
            .entries
            .entry(executable.to_string())
            .or_insert(status)
    }

    /// Number of engines checked so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no engine has been checked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted by executable path.
    pub fn snapshot(&self) -> Vec<(String, HealthStatus)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache() {
        let cache = EngineHealthCache::new();

        assert!(cache.is_empty());
        assert_eq!(cache.get("node"), None);
    }

    #[test]
    fn test_record_and_get() {
        let cache = EngineHealthCache::new();

        assert_eq!(cache.record("node", HealthStatus::Working), HealthStatus::Working);
        assert_eq!(cache.get("node"), Some(HealthStatus::Working));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_first_write_wins() {
        let cache = EngineHealthCache::new();

        cache.record("d8", HealthStatus::Broken);
        let status = cache.record("d8", HealthStatus::Working);

        assert_eq!(status, HealthStatus::Broken);
        assert_eq!(cache.get("d8"), Some(HealthStatus::Broken));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = EngineHealthCache::new();
        let handle = cache.clone();

        handle.record("jsc", HealthStatus::Working);

        assert_eq!(cache.get("jsc"), Some(HealthStatus::Working));
    }

    #[test]
    fn test_snapshot_sorted() {
        let cache = EngineHealthCache::new();
        cache.record("wasmtime", HealthStatus::Working);
        cache.record("d8", HealthStatus::Broken);

        assert_eq!(
            cache.snapshot(),
            vec![
                ("d8".to_string(), HealthStatus::Broken),
                ("wasmtime".to_string(), HealthStatus::Working),
            ]
        );
    }

    #[test]
    fn test_status_conversions() {
        assert_eq!(HealthStatus::from(true), HealthStatus::Working);
        assert_eq!(HealthStatus::from(false), HealthStatus::Broken);
        assert!(HealthStatus::Working.is_working());
        assert_eq!(HealthStatus::Broken.to_string(), "broken");
    }
}
