use std::time::Duration;

/// How often the coordinator pulls fresh statistics from the load engine
/// while a run is active.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Name of the across-all-endpoints entry in the engine's stats payload.
pub const AGGREGATED_STATS_NAME: &str = "Aggregated";

/// Engine state values which mean the swarm ended without us asking.
pub const TERMINAL_ENGINE_STATES: [&str; 2] = ["stopped", "spawning_complete"];

/// Lower bound on the spawn rate accepted by a start command.
pub const MIN_SPAWN_RATE: f64 = 0.1;
