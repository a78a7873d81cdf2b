use crate::MIN_SPAWN_RATE;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Parameters for a single load-test run.
///
/// This is the wire format of the start command (camelCase on the wire, to
/// match the dashboard frontend) as well as the immutable configuration
/// stored alongside the run record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub name: String,
    pub target_url: String,
    pub users: u32,
    pub spawn_rate: f64,
    /// Planned duration in seconds. `0` means unbounded.
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("targetUrl is not a valid URL: {0}")]
    InvalidTargetUrl(#[from] url::ParseError),

    #[error("users must be at least 1")]
    TooFewUsers,

    #[error("spawnRate must be at least {MIN_SPAWN_RATE}")]
    SpawnRateTooLow,
}

impl RunConfig {
    /// Per-field validation of a start command. Runs before any side effect.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Url::parse(&self.target_url)?;
        if self.users < 1 {
            return Err(ValidationError::TooFewUsers);
        }
        if self.spawn_rate < MIN_SPAWN_RATE {
            return Err(ValidationError::SpawnRateTooLow);
        }
        Ok(())
    }
}
