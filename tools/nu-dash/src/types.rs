use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Info => "✔",
            Self::Error => "✘",
            Self::Critical => "‼",
        }
    }
}

/// Outcome of one task run. Replaced wholesale by the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub level: Level,
    pub message: String,
    #[serde(default)]
    pub details: String,
}

impl ExecutionResult {
    pub fn info(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn error(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn critical(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            level: Level::Critical,
            message: message.into(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelCounts {
    pub info: usize,
    pub error: usize,
    pub critical: usize,
}

impl LevelCounts {
    pub fn tally(results: &[ExecutionResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.level {
                Level::Info => counts.info += 1,
                Level::Error => counts.error += 1,
                Level::Critical => counts.critical += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reloading,
    ActionRunning,
    Exiting,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Reloading => "reloading",
            Self::ActionRunning => "action",
            Self::Exiting => "exiting",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecutionResult, Level, LevelCounts};

    #[test]
    fn structured_result_parses_lowercase_levels_and_optional_details() {
        let parsed: ExecutionResult =
            serde_json::from_str(r#"{"level":"error","message":"disk full"}"#).expect("parse");
        assert_eq!(parsed, ExecutionResult::error("disk full", ""));

        let err = serde_json::from_str::<ExecutionResult>(r#"{"level":"warn","message":"x"}"#)
            .expect_err("unknown level");
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn tally_counts_each_level() {
        let counts = LevelCounts::tally(&[
            ExecutionResult::info("a", ""),
            ExecutionResult::critical("b", ""),
            ExecutionResult::critical("c", ""),
        ]);
        assert_eq!(counts.info, 1);
        assert_eq!(counts.error, 0);
        assert_eq!(counts.critical, 2);
        assert_eq!(Level::Critical.as_str(), "critical");
    }
}
