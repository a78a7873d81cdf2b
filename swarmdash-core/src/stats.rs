use crate::{RunAggregates, AGGREGATED_STATS_NAME, TERMINAL_ENGINE_STATES};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw statistics payload from the load engine's `/stats/requests` endpoint.
///
/// Only the fields the coordinator inspects are typed; everything else is
/// kept in `extra` so the payload reaches subscribers verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default)]
    pub stats: Vec<EndpointStats>,
    /// Engine-reported swarm state, e.g. `running` or `stopped`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-endpoint entry within a [`StatsSnapshot`]. The entry named
/// [`AGGREGATED_STATS_NAME`] carries the across-all-endpoints totals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub name: String,
    #[serde(default)]
    pub avg_response_time: f64,
    #[serde(default)]
    pub total_rps: f64,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub num_failures: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatsSnapshot {
    /// Whether the engine reports the swarm ended without being told to.
    pub fn engine_finished(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|state| TERMINAL_ENGINE_STATES.contains(&state))
    }

    pub fn aggregated(&self) -> Option<&EndpointStats> {
        self.stats
            .iter()
            .find(|entry| entry.name == AGGREGATED_STATS_NAME)
    }

    /// Final aggregates for persistence, if the snapshot carries the
    /// aggregate entry.
    pub fn aggregates(&self) -> Option<RunAggregates> {
        self.aggregated().map(|entry| RunAggregates {
            avg_response_time: entry.avg_response_time,
            requests_per_second: entry.total_rps,
            error_rate: entry.error_rate(),
            total_requests: entry.total_requests,
            total_failures: entry.num_failures,
        })
    }
}

impl EndpointStats {
    /// Failure percentage across all requests. Zero when nothing ran, so a
    /// run that never got a request finalizes without a division fault.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.num_failures as f64 / self.total_requests as f64 * 100.0
        }
    }
}
