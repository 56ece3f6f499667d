use std::{sync::Arc, time::Duration};

use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::{
    atlas::MeasurementService,
    error::{Error, Result},
    types::{
        measurement::{MeasurementRequest, StatusCode},
        trace::PathTrace,
        MeasurementId,
    },
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// How a round of polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
    /// The deadline passed while the measurement was still running. Polling can be resumed.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Submitted,
    Polling { ticks: u32 },
    Done(Outcome),
}

enum Signal {
    Tick(Observation),
    Deadline,
}

/// What a single tick learned about the measurement. `None` means the query failed.
#[derive(Debug, Default)]
struct Observation {
    status: Option<StatusCode>,
    results: Option<usize>,
}

impl State {
    fn on_tick(self, observation: &Observation, expected_probes: usize) -> State {
        let ticks = match self {
            State::Done(_) => return self,
            State::Submitted => 1,
            State::Polling { ticks } => ticks + 1,
        };
        // All probes reported: no need to wait for the status to catch up
        if expected_probes > 0 && observation.results.is_some_and(|n| n >= expected_probes) {
            return State::Done(Outcome::Completed);
        }
        match observation.status {
            Some(code) if code.is_success() => State::Done(Outcome::Completed),
            Some(code) => match code.failure_reason() {
                Some(reason) => State::Done(Outcome::Failed(reason.to_owned())),
                None => State::Polling { ticks },
            },
            None => State::Polling { ticks },
        }
    }

    fn on_deadline(self) -> State {
        match self {
            State::Done(_) => self,
            State::Submitted | State::Polling { .. } => State::Done(Outcome::TimedOut),
        }
    }
}

pub struct Orchestrator<S> {
    service: Arc<S>,
    config: PollConfig,
}

impl<S: MeasurementService> Orchestrator<S> {
    pub fn new(service: Arc<S>, config: PollConfig) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(Error::validation("poll interval must be positive"));
        }
        Ok(Self { service, config })
    }

    #[instrument(skip_all)]
    pub async fn submit(&self, request: &MeasurementRequest) -> Result<MeasurementId> {
        if request.requested_probes() == 0 {
            return Err(Error::validation("measurement has no probes"));
        }
        let id = self.service.submit(request).await?;
        info!("Measurement {id} submitted");
        Ok(id)
    }

    /// Polls the measurement until it reaches a terminal state or the configured timeout
    /// elapses. Errors while querying the measurement are logged and retried on the next tick.
    /// A query still in flight at the deadline is abandoned.
    #[instrument(skip(self))]
    pub async fn await_completion(&self, id: MeasurementId, expected_probes: usize) -> Outcome {
        let PollConfig { interval, timeout } = self.config;
        let mut timer = interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        let mut state = State::Submitted;
        loop {
            let signal = tokio::select! {
                biased;
                _ = &mut deadline => Signal::Deadline,
                observation = async {
                    timer.tick().await;
                    self.observe(id).await
                } => Signal::Tick(observation),
            };
            state = match signal {
                Signal::Deadline => state.on_deadline(),
                Signal::Tick(observation) => {
                    debug!("Measurement {id}: {observation:?}");
                    state.on_tick(&observation, expected_probes)
                }
            };
            match state {
                State::Done(outcome) => {
                    info!("Measurement {id} finished polling: {outcome:?}");
                    return outcome;
                }
                State::Polling { ticks } => debug!("Measurement {id} still running after {ticks} checks"),
                State::Submitted => {}
            }
        }
    }

    pub async fn fetch_results(&self, id: MeasurementId) -> Result<Vec<PathTrace>> {
        self.service.results(id).await
    }

    async fn observe(&self, id: MeasurementId) -> Observation {
        let status = match self.service.status(id).await {
            Ok(status) => Some(status.code()),
            Err(e) => {
                warn!("Couldn't get status of measurement {id}: {e}");
                None
            }
        };
        let results = match self.service.result_count(id).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Couldn't get results of measurement {id}: {e}");
                None
            }
        };
        Observation { status, results }
    }
}
