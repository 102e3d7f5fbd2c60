use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Semaphore, oneshot},
    task::JoinSet,
    time::{Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{api::OperationError, config::Config, refresh::Refresher};

/// Shorter periods (including zero) are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cadence of the background refreshes. `None` disables a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub state_interval: Option<Duration>,
    pub history_interval: Option<Duration>,
}

impl RefreshSchedule {
    pub fn from_config(config: &Config, with_history: bool) -> Self {
        Self {
            state_interval: Some(config.state_interval()),
            history_interval: with_history.then(|| config.history_interval()),
        }
    }

    pub fn history_only(config: &Config) -> Self {
        Self {
            state_interval: None,
            history_interval: Some(config.history_interval()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    pub ticks: u64,
    pub skipped: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub state: LaneStats,
    pub history: LaneStats,
}

#[derive(Debug, Default)]
struct LaneCounters {
    ticks: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
    streak: AtomicU32,
}

impl LaneCounters {
    fn stats(&self) -> LaneStats {
        LaneStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, lane: &'static str, result: Result<(), OperationError>) {
        match result {
            Ok(()) => {
                let streak = self.streak.swap(0, Ordering::Relaxed);
                if streak > 0 {
                    info!(lane, failed_ticks = streak, "poll recovered");
                }
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                let streak = self.streak.fetch_add(1, Ordering::Relaxed) + 1;
                if streak == 1 {
                    warn!(lane, %err, "poll failed");
                } else {
                    debug!(lane, streak, %err, "poll still failing");
                }
            }
        }
    }
}

/// One refresh cadence with its own in-flight gate.
struct Lane {
    name: &'static str,
    interval: Interval,
    gate: Arc<Semaphore>,
    counters: Arc<LaneCounters>,
}

impl Lane {
    fn new(name: &'static str, period: Duration, counters: Arc<LaneCounters>) -> Self {
        let period = if period < MIN_POLL_INTERVAL {
            warn!(
                lane = name,
                ?period,
                min = ?MIN_POLL_INTERVAL,
                "poll interval too short, clamped"
            );
            MIN_POLL_INTERVAL
        } else {
            period
        };
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            name,
            interval,
            gate: Arc::new(Semaphore::new(1)),
            counters,
        }
    }

    /// Starts a refresh unless the previous one on this lane is still
    /// running.
    fn fire<Fut>(&self, inflight: &mut JoinSet<()>, refresh: Fut)
    where
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);
        let Ok(permit) = self.gate.clone().try_acquire_owned() else {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(lane = self.name, "previous refresh still in flight, tick skipped");
            return;
        };
        let counters = self.counters.clone();
        let name = self.name;
        inflight.spawn(async move {
            let result = refresh.await;
            drop(permit);
            counters.record(name, result);
        });
    }
}

async fn next_tick(lane: &mut Option<Lane>) {
    match lane {
        Some(lane) => {
            lane.interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

pub struct PollerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
    state: Arc<LaneCounters>,
    history: Arc<LaneCounters>,
}

impl PollerHandle {
    pub fn stats(&self) -> PollerStats {
        PollerStats {
            state: self.state.stats(),
            history: self.history.stats(),
        }
    }

    /// Stops both lanes and aborts any refresh still in flight.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(%err, "poller task ended abnormally");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Spawns the background refresh loop. The first tick of every enabled lane
/// fires immediately.
pub fn spawn_poller(refresher: Refresher, schedule: RefreshSchedule) -> PollerHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let state_counters = Arc::new(LaneCounters::default());
    let history_counters = Arc::new(LaneCounters::default());

    let mut state_lane = schedule
        .state_interval
        .map(|period| Lane::new("state", period, state_counters.clone()));
    let mut history_lane = schedule
        .history_interval
        .map(|period| Lane::new("history", period, history_counters.clone()));

    let task = tokio::spawn(async move {
        info!(
            state_interval = ?schedule.state_interval,
            history_interval = ?schedule.history_interval,
            "poller started"
        );
        let mut inflight = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = next_tick(&mut state_lane) => {
                    if let Some(lane) = &state_lane {
                        let refresher = refresher.clone();
                        lane.fire(&mut inflight, async move {
                            let result = refresher.refresh_state().await;
                            refresher.refresh_transaction().await;
                            result
                        });
                    }
                }
                _ = next_tick(&mut history_lane) => {
                    if let Some(lane) = &history_lane {
                        let refresher = refresher.clone();
                        lane.fire(&mut inflight, async move {
                            refresher.refresh_history().await
                        });
                    }
                }
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(err) = joined
                        && err.is_panic()
                    {
                        warn!(%err, "refresh task panicked");
                    }
                }
            }
        }
        inflight.shutdown().await;
        info!("poller stopped");
    });

    PollerHandle {
        shutdown: Some(shutdown_tx),
        task: Some(task),
        state: state_counters,
        history: history_counters,
    }
}
