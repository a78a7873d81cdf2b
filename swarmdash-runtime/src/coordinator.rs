//! Test lifecycle coordinator.
//!
//! Owns the single-active-run invariant and every transition of a run:
//! start, explicit stop, deadline expiry, remote-terminal detection, and
//! the finalize-and-persist sequence. One coordinator instance holds all
//! mutable lifecycle state, so independent instances (one per test) never
//! interfere.
use crate::bus::EventBus;
use crate::error::CoordinatorError;
use crate::store::RunStore;
use crate::upstream::LoadEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use swarmdash_core::{Event, RunConfig, RunStatus, StatsSnapshot, DEFAULT_POLL_INTERVAL};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Drives load-test runs against a [`LoadEngine`], persisting them to a
/// [`RunStore`] and fanning state changes out on an [`EventBus`].
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

struct Shared {
    store: RunStore,
    engine: Arc<dyn LoadEngine>,
    bus: EventBus,
    poll_interval: Duration,
    /// Serializes start/stop command bodies; held across their upstream
    /// calls so overlapping commands never interleave side effects.
    commands: tokio::sync::Mutex<()>,
    /// The single active run. Short critical sections only, never held
    /// across an await.
    active: Mutex<Option<ActiveRun>>,
}

struct ActiveRun {
    run_id: i64,
    poller: JoinHandle<()>,
    deadline: Option<JoinHandle<()>>,
}

impl ActiveRun {
    fn abort(&self) {
        self.poller.abort();
        if let Some(deadline) = &self.deadline {
            deadline.abort();
        }
    }
}

impl Coordinator {
    pub fn new(store: RunStore, engine: Arc<dyn LoadEngine>, bus: EventBus) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                engine,
                bus,
                poll_interval: DEFAULT_POLL_INTERVAL,
                commands: tokio::sync::Mutex::new(()),
                active: Mutex::new(None),
            }),
        }
    }

    /// Override the stats poll period. Only meaningful before the first
    /// start; tests use this to tighten the loop.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.poll_interval = interval;
        }
        self
    }

    /// Start a new run. Rejects when a run is already active, when the
    /// config fails validation, or when the engine refuses the swarm
    /// command; nothing is persisted in any failure case.
    #[instrument(skip(self, config), fields(name = %config.name))]
    pub async fn start(&self, config: RunConfig) -> Result<i64, CoordinatorError> {
        let _commands = self.shared.commands.lock().await;

        if lock_active(&self.shared).is_some() {
            return Err(CoordinatorError::TestAlreadyRunning);
        }
        config.validate()?;

        self.shared
            .engine
            .begin_load(&config.target_url, config.users, config.spawn_rate)
            .await?;

        let start_time = OffsetDateTime::now_utc();
        let run_id = self.shared.store.create(&config, start_time).await?;

        let deadline_hit = Arc::new(AtomicBool::new(false));
        let poller = tokio::spawn(poll_loop(
            Arc::downgrade(&self.shared),
            run_id,
            deadline_hit.clone(),
        ));
        let deadline = (config.duration > 0).then(|| {
            tokio::spawn(deadline_task(
                Arc::downgrade(&self.shared),
                run_id,
                Duration::from_secs(config.duration),
                deadline_hit,
            ))
        });

        {
            let mut active = lock_active(&self.shared);
            // A stale loop must never survive into a new run.
            if let Some(stale) = active.take() {
                warn!(stale = stale.run_id, "aborting leftover run tasks");
                stale.abort();
            }
            *active = Some(ActiveRun {
                run_id,
                poller,
                deadline,
            });
            self.shared.bus.publish(&Event::TestStarted {
                test_id: run_id,
                name: config.name.clone(),
            });
        }

        info!(run_id, users = config.users, "test started");
        Ok(run_id)
    }

    /// Stop the active run. The engine stop command is fire-and-forget:
    /// even if the engine is unreachable we stop tracking the run.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<i64, CoordinatorError> {
        let _commands = self.shared.commands.lock().await;

        let run_id = lock_active(&self.shared)
            .as_ref()
            .map(|active| active.run_id)
            .ok_or(CoordinatorError::NoActiveTest)?;

        if let Err(err) = self.shared.engine.stop_load().await {
            warn!(run_id, "stop command to load engine failed: {err}");
        }

        finalize(&self.shared, run_id, RunStatus::Stopped, None).await;
        info!(run_id, "test stopped");
        Ok(run_id)
    }

    /// Identifier of the run currently in flight, if any.
    pub fn active_run_id(&self) -> Option<i64> {
        lock_active(&self.shared).as_ref().map(|active| active.run_id)
    }
}

/// Recurring fetch-and-publish cycle, alive only while its run is active.
///
/// A failed fetch skips the tick and never tears the loop down; the loop
/// ends when it finalizes its run or observes it is no longer active.
async fn poll_loop(shared: Weak<Shared>, run_id: i64, deadline_hit: Arc<AtomicBool>) {
    let Some(strong) = shared.upgrade() else {
        return;
    };
    let mut ticker = tokio::time::interval(strong.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    drop(strong);
    // interval fires immediately; the first stats poll waits a full period.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };

        let snapshot = match shared.engine.fetch_stats().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(run_id, "stats fetch failed, skipping tick: {err}");
                continue;
            }
        };

        // Publish under the active-slot lock: once finalize detaches the
        // run, no further stats_update can slip in after the terminal
        // event.
        {
            let active = lock_active(&shared);
            match active.as_ref() {
                Some(run) if run.run_id == run_id => {}
                _ => return,
            }
            shared.bus.publish(&Event::StatsUpdate {
                stats: snapshot.clone(),
            });
        }

        if deadline_hit.load(Ordering::Acquire) {
            finalize(&shared, run_id, RunStatus::Stopped, Some(snapshot)).await;
            return;
        }
        if snapshot.engine_finished() {
            info!(run_id, state = ?snapshot.state, "engine reports swarm ended");
            finalize(&shared, run_id, RunStatus::Completed, Some(snapshot)).await;
            return;
        }
    }
}

/// One-shot timer armed when a run has a bounded duration. It only flags
/// the deadline and asks the engine to wind down; the poller finalizes on
/// its next tick with the freshest snapshot.
async fn deadline_task(
    shared: Weak<Shared>,
    run_id: i64,
    duration: Duration,
    deadline_hit: Arc<AtomicBool>,
) {
    tokio::time::sleep(duration).await;
    deadline_hit.store(true, Ordering::Release);

    let Some(shared) = shared.upgrade() else {
        return;
    };
    info!(run_id, "planned duration elapsed, stopping load engine");
    if let Err(err) = shared.engine.stop_load().await {
        warn!(run_id, "stop command after deadline failed: {err}");
    }
}

/// Move a run out of `running`, exactly once.
///
/// Racing callers (explicit stop vs. deadline vs. remote-terminal) are
/// resolved twice over: the first caller detaches the active slot, and the
/// store update only applies while the row still says `running`. Exactly
/// one terminal event is published, and only for the applied finalize.
async fn finalize(
    shared: &Arc<Shared>,
    run_id: i64,
    status: RunStatus,
    snapshot: Option<StatsSnapshot>,
) {
    let detached = {
        let mut active = lock_active(shared);
        match active.as_ref() {
            Some(run) if run.run_id == run_id => active.take(),
            _ => None,
        }
    };
    let Some(run) = detached else {
        debug!(run_id, "finalize skipped, run no longer active");
        return;
    };

    let snapshot = match snapshot {
        Some(snapshot) => Some(snapshot),
        None => match shared.engine.fetch_stats().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                // Non-fatal: the run still finalizes, with empty aggregates.
                warn!(run_id, "final stats fetch failed: {err}");
                None
            }
        },
    };
    let aggregates = snapshot.as_ref().and_then(StatsSnapshot::aggregates);

    let end_time = OffsetDateTime::now_utc();
    let applied = match shared
        .store
        .finalize(run_id, status, end_time, aggregates)
        .await
    {
        Ok(applied) => applied,
        Err(err) => {
            // History will be incomplete; the live stream still proceeds.
            error!(run_id, "failed to persist final state: {err}");
            true
        }
    };

    if applied {
        let _ordering = lock_active(shared);
        shared.bus.publish(&Event::terminal(run_id, status));
        info!(run_id, %status, "run finalized");
    } else {
        debug!(run_id, "finalize lost the race, no event published");
    }

    // Cancel timers last: this may be running on the poller task itself,
    // and an abort lands at the next yield point, after the awaits above.
    run.abort();
}

fn lock_active(shared: &Shared) -> MutexGuard<'_, Option<ActiveRun>> {
    shared.active.lock().unwrap_or_else(PoisonError::into_inner)
}
