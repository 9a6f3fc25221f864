use crate::assignment::AssignmentStrategy;
use crate::core::{DeskError, Result};
use crate::storage::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Retry behaviour for transactions that lose a write-write race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: usize,
    /// Base duration in milliseconds for backoff calculation
    pub base_backoff_ms: u64,
    /// Upper bound for a single backoff
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before attempt `attempt + 1`.
    pub fn backoff_ms(&self, attempt: usize) -> u64 {
        let base = self.base_backoff_ms.max(1);
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        backoff
    }
}

/// Desk configuration
///
/// Built in code with the builder methods or loaded from a JSON file; every
/// field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Where snapshot and journal live; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,

    pub durability: DurabilityMode,

    /// Journal entries between automatic snapshots
    pub checkpoint_every: usize,

    pub retry: RetryPolicy,

    pub strategy: AssignmentStrategy,

    /// How many most-recent past consultants `FamiliarFirst` considers
    pub familiar_window: usize,

    /// Priority of requests generated from paid orders
    pub paid_priority: i32,

    /// Priority of requests submitted without one
    pub default_priority: i32,

    /// Capacity given to consultants registered without one
    pub default_max_concurrent_clients: u32,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            durability: DurabilityMode::Async,
            checkpoint_every: 1000,
            retry: RetryPolicy::default(),
            strategy: AssignmentStrategy::LeastLoaded,
            familiar_window: 5,
            paid_priority: 5,
            default_priority: 0,
            default_max_concurrent_clients: 5,
        }
    }
}

impl DeskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist snapshot and journal under `dir`
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    pub fn checkpoint_every(mut self, entries: usize) -> Self {
        self.checkpoint_every = entries;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn familiar_window(mut self, window: usize) -> Self {
        self.familiar_window = window;
        self
    }

    pub fn paid_priority(mut self, priority: i32) -> Self {
        self.paid_priority = priority;
        self
    }

    pub fn default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn default_max_concurrent_clients(mut self, capacity: u32) -> Self {
        self.default_max_concurrent_clients = capacity;
        self
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DeskError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            DeskError::Config(format!("Failed to parse '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(DeskError::Config("retry.max_attempts must be > 0".to_string()));
        }

        if self.retry.max_backoff_ms < self.retry.base_backoff_ms {
            return Err(DeskError::Config(
                "retry.max_backoff_ms cannot be below retry.base_backoff_ms".to_string(),
            ));
        }

        if self.data_dir.is_some() && self.durability == DurabilityMode::None {
            return Err(DeskError::Config(
                "durability 'none' keeps nothing on disk; drop data_dir or pick sync/async"
                    .to_string(),
            ));
        }

        if self.checkpoint_every == 0 {
            return Err(DeskError::Config("checkpoint_every must be > 0".to_string()));
        }

        if self.default_max_concurrent_clients == 0 {
            return Err(DeskError::Config(
                "default_max_concurrent_clients must be > 0".to_string(),
            ));
        }

        if self.strategy == AssignmentStrategy::FamiliarFirst && self.familiar_window == 0 {
            return Err(DeskError::Config(
                "familiar_window must be > 0 with the familiar_first strategy".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeskConfig::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.paid_priority, 5);
        assert_eq!(config.default_max_concurrent_clients, 5);
        assert_eq!(config.strategy, AssignmentStrategy::LeastLoaded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DeskConfig::new()
            .data_dir("/var/lib/caseload")
            .durability(DurabilityMode::Sync)
            .strategy(AssignmentStrategy::FamiliarFirst)
            .familiar_window(3)
            .max_attempts(8);

        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/caseload")));
        assert_eq!(config.durability, DurabilityMode::Sync);
        assert_eq!(config.familiar_window, 3);
        assert_eq!(config.retry.max_attempts, 8);
    }

    #[test]
    fn test_validate() {
        assert!(DeskConfig::new().max_attempts(0).validate().is_err());
        assert!(
            DeskConfig::new()
                .default_max_concurrent_clients(0)
                .validate()
                .is_err()
        );
        assert!(
            DeskConfig::new()
                .strategy(AssignmentStrategy::FamiliarFirst)
                .familiar_window(0)
                .validate()
                .is_err()
        );
        assert!(DeskConfig::new().checkpoint_every(0).validate().is_err());
    }

    #[test]
    fn test_data_dir_needs_a_journal() {
        let config = DeskConfig::new()
            .data_dir("/var/lib/caseload")
            .durability(DurabilityMode::None);
        assert!(matches!(config.validate(), Err(DeskError::Config(_))));

        // in-memory desks may say so explicitly
        assert!(
            DeskConfig::new()
                .durability(DurabilityMode::None)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let retry = RetryPolicy {
            max_attempts: 6,
            base_backoff_ms: 5,
            max_backoff_ms: 30,
        };
        assert_eq!(retry.backoff_ms(1), 5);
        assert_eq!(retry.backoff_ms(2), 10);
        assert_eq!(retry.backoff_ms(3), 20);
        assert_eq!(retry.backoff_ms(4), 30);
        assert_eq!(retry.backoff_ms(5), 30);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caseload.json");
        std::fs::write(
            &path,
            r#"{ "strategy": "familiar_first", "retry": { "max_attempts": 3 } }"#,
        )
        .unwrap();

        let config = DeskConfig::from_json_file(&path).unwrap();
        assert_eq!(config.strategy, AssignmentStrategy::FamiliarFirst);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_backoff_ms, 2);
        assert_eq!(config.familiar_window, 5);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caseload.json");
        std::fs::write(&path, r#"{ "checkpoint_every": 0 }"#).unwrap();
        assert!(matches!(
            DeskConfig::from_json_file(&path),
            Err(DeskError::Config(_))
        ));
    }
}
