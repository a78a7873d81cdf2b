use crate::RunConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;

/// Lifecycle state of a run. `Running` is the only live state; the other
/// three are terminal and a run reaches exactly one of them, exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown run status: {0}")]
pub struct ParseRunStatusError(String);

impl FromStr for RunStatus {
    type Err = ParseRunStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "stopped" => Ok(RunStatus::Stopped),
            "failed" => Ok(RunStatus::Failed),
            other => Err(ParseRunStatusError(other.to_string())),
        }
    }
}

/// Across-all-requests summary computed once, at finalize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunAggregates {
    /// Mean response time in milliseconds.
    pub avg_response_time: f64,
    pub requests_per_second: f64,
    /// Failure percentage, 0-100.
    pub error_rate: f64,
    pub total_requests: u64,
    pub total_failures: u64,
}

/// One load-test execution record, from the start command through finalize.
///
/// Serializes flat (config and aggregate fields inlined) so history rows
/// come out the same shape the dashboard has always consumed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    #[serde(flatten)]
    pub config: RunConfig,
    pub status: RunStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub aggregates: Option<RunAggregates>,
}
