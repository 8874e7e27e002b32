use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Severity ordinal used both for calls and for the configured threshold.
///
/// A call is suppressed when its ordinal is greater than or equal to the
/// configured threshold, so `OFF` as a threshold lets every call through and
/// `ALL` suppresses everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct LogLevel(pub u32);

impl LogLevel {
    pub const ALL: LogLevel = LogLevel(0);
    pub const INFO: LogLevel = LogLevel(1000);
    pub const ERROR: LogLevel = LogLevel(4000);
    pub const OFF: LogLevel = LogLevel(10000);

    pub fn ordinal(self) -> u32 {
        self.0
    }

    /// True when a call at `self` passes the given threshold.
    pub fn passes(self, threshold: LogLevel) -> bool {
        self.0 < threshold.0
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::ALL),
            "info" => Some(Self::INFO),
            "error" => Some(Self::ERROR),
            "off" => Some(Self::OFF),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ALL => f.write_str("all"),
            Self::INFO => f.write_str("info"),
            Self::ERROR => f.write_str("error"),
            Self::OFF => f.write_str("off"),
            LogLevel(n) => write!(f, "{}", n),
        }
    }
}

// Config files may spell the level either as a name or as a raw ordinal.
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Ordinal(u32),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Ordinal(n) => Ok(LogLevel(n)),
            Raw::Name(s) => LogLevel::from_name(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown log level: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LogLevel;

    #[test]
    fn suppression_is_ordinal_at_or_above_threshold() {
        assert!(LogLevel::INFO.passes(LogLevel::ERROR));
        assert!(!LogLevel::ERROR.passes(LogLevel::ERROR));
        assert!(LogLevel::ERROR.passes(LogLevel::OFF));
        assert!(!LogLevel::INFO.passes(LogLevel::ALL));
        assert!(!LogLevel::ERROR.passes(LogLevel::INFO));
    }

    #[test]
    fn display_names_known_ordinals() {
        assert_eq!(LogLevel::ERROR.to_string(), "error");
        assert_eq!(LogLevel(2500).to_string(), "2500");
    }
}
