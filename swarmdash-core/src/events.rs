use crate::{RunStatus, StatsSnapshot};
use serde::{Deserialize, Serialize};

/// Envelope pushed to every live dashboard subscriber.
///
/// Within one run the bus observes these in causal order: `test_started`,
/// any number of `stats_update`, then exactly one terminal event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "test_started")]
    TestStarted {
        #[serde(rename = "testId")]
        test_id: i64,
        name: String,
    },

    #[serde(rename = "stats_update")]
    StatsUpdate { stats: StatsSnapshot },

    #[serde(rename = "test_completed")]
    TestCompleted {
        #[serde(rename = "testId")]
        test_id: i64,
    },

    #[serde(rename = "test_stopped")]
    TestStopped {
        #[serde(rename = "testId")]
        test_id: i64,
    },
}

impl Event {
    /// The terminal envelope for a run leaving the `running` state.
    /// Explicit stops and deadline expiries report `test_stopped`; only a
    /// swarm the engine ended on its own reports `test_completed`.
    pub fn terminal(test_id: i64, status: RunStatus) -> Event {
        match status {
            RunStatus::Completed => Event::TestCompleted { test_id },
            _ => Event::TestStopped { test_id },
        }
    }
}
