use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::level::LogLevel;

pub const DEFAULT_MAX_LOG_SIZE: i64 = 500_000;
pub const DEFAULT_MIN_FREE_SPACE: i64 = 100_000;
pub const DEFAULT_TAIL_RETENTION: i64 = 20_000;

/// Parameters of `configure`, as given by the caller or read from TOML.
///
/// Sizes are signed so out-of-range input can be clamped instead of rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: LogLevel,
    pub file_name: String,
    pub max_log_size: i64,
    pub min_free_space: i64,
    pub tail_retention: i64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::ALL,
            file_name: String::new(),
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            min_free_space: DEFAULT_MIN_FREE_SPACE,
            tail_retention: DEFAULT_TAIL_RETENTION,
        }
    }
}

impl LoggerConfig {
    pub fn new(level: LogLevel, file_name: impl Into<String>) -> Self {
        Self {
            level,
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_log_size(mut self, bytes: i64) -> Self {
        self.max_log_size = bytes;
        self
    }

    pub fn with_min_free_space(mut self, bytes: i64) -> Self {
        self.min_free_space = bytes;
        self
    }

    pub fn with_tail_retention(mut self, bytes: i64) -> Self {
        self.tail_retention = bytes;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parse logger config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read logger config: {}", path.display()))?;
        Self::from_toml_str(&s)
    }

    /// Clamp sizes into what the writer accepts.
    pub fn writer_settings(&self) -> WriterSettings {
        let max_log_size = self.max_log_size.max(0) as u64;
        let min_free_space = self.min_free_space.max(0) as u64;
        let mut tail_retention = self.tail_retention.max(0) as u64;
        if tail_retention >= max_log_size {
            tail_retention = max_log_size / 10;
        }
        WriterSettings {
            file_name: self.file_name.clone(),
            max_log_size,
            min_free_space,
            tail_retention,
        }
    }
}

/// Normalised limits owned by the writer. `tail_retention < max_log_size`
/// unless both are zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriterSettings {
    pub file_name: String,
    pub max_log_size: u64,
    pub min_free_space: u64,
    pub tail_retention: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configure_signature() {
        let cfg = LoggerConfig::new(LogLevel::OFF, "app.log");
        let s = cfg.writer_settings();
        assert_eq!(s.max_log_size, 500_000);
        assert_eq!(s.min_free_space, 100_000);
        assert_eq!(s.tail_retention, 20_000);
        assert_eq!(s.file_name, "app.log");
    }

    #[test]
    fn tail_retention_not_below_max_is_shrunk_to_a_tenth() {
        let s = LoggerConfig::new(LogLevel::OFF, "a.log")
            .with_max_log_size(1000)
            .with_tail_retention(1000)
            .writer_settings();
        assert_eq!(s.tail_retention, 100);

        let s = LoggerConfig::new(LogLevel::OFF, "a.log")
            .with_max_log_size(1000)
            .with_tail_retention(999)
            .writer_settings();
        assert_eq!(s.tail_retention, 999);
    }

    #[test]
    fn negative_sizes_clamp_to_zero() {
        let s = LoggerConfig::new(LogLevel::OFF, "a.log")
            .with_max_log_size(-5)
            .with_min_free_space(-1)
            .writer_settings();
        assert_eq!(s.max_log_size, 0);
        assert_eq!(s.min_free_space, 0);
        assert_eq!(s.tail_retention, 0);
    }

    #[test]
    fn toml_accepts_level_names_and_ordinals() {
        let cfg = LoggerConfig::from_toml_str(
            r#"
level = "error"
file_name = "app.log"
max_log_size = 2048
"#,
        )
        .unwrap();
        assert_eq!(cfg.level, LogLevel::ERROR);
        assert_eq!(cfg.max_log_size, 2048);
        assert_eq!(cfg.tail_retention, DEFAULT_TAIL_RETENTION);

        let cfg = LoggerConfig::from_toml_str("level = 2500\nfile_name = \"b.log\"").unwrap();
        assert_eq!(cfg.level, LogLevel(2500));

        assert!(LoggerConfig::from_toml_str("level = \"loud\"").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.toml");
        std::fs::write(&path, "level = \"off\"\nfile_name = \"x.log\"\n").unwrap();
        let cfg = LoggerConfig::load(&path).unwrap();
        assert_eq!(cfg, LoggerConfig::new(LogLevel::OFF, "x.log"));
        assert!(LoggerConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
