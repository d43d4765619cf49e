//! Single-flight coordination of the "commit a settled weight" action.
//!
//! The decode loop reports every frame through [`RecordingCoordinator::on_frame`].
//! Once a stable streak crosses the trigger threshold one recording thread is
//! launched; it waits for the reading to settle, lights the indicator, hands
//! the weight to the [`Recorder`] and exits. Triggers that arrive while a
//! thread is in flight are absorbed.

use crate::frame::Frame;
use crate::stability::WeightState;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("recorder I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("recorder rejected reading: {0}")]
    Rejected(String),
}

/// Persists a settled reading.
pub trait Recorder: Send + Sync {
    fn record(&self, weight_kg: f64) -> Result<(), RecordError>;
}

/// Status LED. Implementations report their own I/O failures.
pub trait Indicator: Send + Sync {
    fn set(&self, on: bool);
}

/// Keeps the indicator lit for its lifetime; dropping turns it off.
pub struct IndicatorGuard<'a> {
    indicator: &'a dyn Indicator,
}

impl<'a> IndicatorGuard<'a> {
    pub fn on(indicator: &'a dyn Indicator) -> Self {
        indicator.set(true);
        Self { indicator }
    }
}

impl Drop for IndicatorGuard<'_> {
    fn drop(&mut self) {
        self.indicator.set(false);
    }
}

/// Non-blocking "at most one" latch.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                flight: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held by the in-flight task; releases the latch when dropped, including
/// during unwinding.
#[derive(Debug)]
pub struct FlightPermit {
    flight: Arc<SingleFlight>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}

const JOIN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingConfig {
    /// The arming counter must exceed this to launch a task.
    pub trigger_threshold: i64,
    /// Arming counter value after a launch.
    pub rearm_sentinel: i64,
    pub poll_interval: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 10,
            rearm_sentinel: -10,
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingCounters {
    started: AtomicU64,
    absorbed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordingStats {
    pub started: u64,
    pub absorbed: u64,
    pub completed: u64,
    pub failed: u64,
}

impl RecordingCounters {
    pub fn snapshot(&self) -> RecordingStats {
        RecordingStats {
            started: self.started.load(Ordering::Relaxed),
            absorbed: self.absorbed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Below threshold; nothing attempted.
    Idle,
    Launched,
    /// A task was already in flight.
    Absorbed,
}

pub struct RecordingCoordinator {
    state: Arc<WeightState>,
    recorder: Arc<dyn Recorder>,
    indicator: Arc<dyn Indicator>,
    config: RecordingConfig,
    flight: Arc<SingleFlight>,
    counters: Arc<RecordingCounters>,
    stop: Arc<AtomicBool>,
    arm_count: i64,
    heartbeat: bool,
    task: Option<JoinHandle<()>>,
}

impl RecordingCoordinator {
    pub fn new(
        state: Arc<WeightState>,
        recorder: Arc<dyn Recorder>,
        indicator: Arc<dyn Indicator>,
        config: RecordingConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            state,
            recorder,
            indicator,
            config,
            flight: SingleFlight::new(),
            counters: Arc::new(RecordingCounters::default()),
            stop,
            arm_count: 0,
            heartbeat: false,
            task: None,
        }
    }

    pub fn counters(&self) -> Arc<RecordingCounters> {
        Arc::clone(&self.counters)
    }

    pub fn is_recording(&self) -> bool {
        self.flight.is_busy()
    }

    pub fn flight(&self) -> Arc<SingleFlight> {
        Arc::clone(&self.flight)
    }

    pub fn arm_count(&self) -> i64 {
        self.arm_count
    }

    /// Called once per decoded frame, after the weight state was updated.
    pub fn on_frame(&mut self, frame: &Frame) -> Trigger {
        self.heartbeat = !self.heartbeat;
        self.indicator.set(self.heartbeat);

        if frame.is_stable() {
            self.arm_count += 1;
        } else {
            self.arm_count = 0;
        }
        if self.arm_count <= self.config.trigger_threshold {
            return Trigger::Idle;
        }

        let Some(permit) = self.flight.try_acquire() else {
            self.counters.absorbed.fetch_add(1, Ordering::Relaxed);
            log::debug!("recording already in flight, trigger absorbed");
            return Trigger::Absorbed;
        };

        let task = RecordingTask {
            state: Arc::clone(&self.state),
            recorder: Arc::clone(&self.recorder),
            indicator: Arc::clone(&self.indicator),
            counters: Arc::clone(&self.counters),
            stop: Arc::clone(&self.stop),
            poll_interval: self.config.poll_interval,
        };
        let spawned = thread::Builder::new()
            .name("recorder".into())
            .spawn(move || task.run(permit));

        match spawned {
            Ok(handle) => {
                self.counters.started.fetch_add(1, Ordering::Relaxed);
                self.arm_count = self.config.rearm_sentinel;
                // A previous handle, if any, belongs to a finished task.
                self.task = Some(handle);
                log::info!(
                    "weight stable for {} frames, waiting for it to settle",
                    self.state.stable_count()
                );
                Trigger::Launched
            }
            Err(e) => {
                log::error!("failed to spawn recording task: {e}");
                Trigger::Idle
            }
        }
    }

    /// Longest a launched task needs to observe a settled weight once frames
    /// have stopped arriving.
    pub fn settle_grace(&self) -> Duration {
        self.state.config().quiet_window + self.config.poll_interval * 2
    }

    /// Waits up to `grace` for the in-flight task. A task still waiting after
    /// that is told to stop, since no further frame can settle its reading.
    pub fn join_within(&mut self, grace: Duration) {
        if let Some(handle) = &self.task {
            let deadline = Instant::now() + grace;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(self.config.poll_interval.min(JOIN_POLL));
            }
            if !handle.is_finished() {
                log::warn!("weight never settled after input ended, nothing recorded");
                self.stop.store(true, Ordering::Relaxed);
            }
        }
        self.join();
    }

    /// Waits for the in-flight task, if any.
    pub fn join(&mut self) {
        if let Some(handle) = self.task.take() {
            if handle.join().is_err() {
                log::error!("recording task panicked");
            }
        }
    }
}

struct RecordingTask {
    state: Arc<WeightState>,
    recorder: Arc<dyn Recorder>,
    indicator: Arc<dyn Indicator>,
    counters: Arc<RecordingCounters>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl RecordingTask {
    fn run(self, _permit: FlightPermit) {
        let weight = loop {
            if self.stop.load(Ordering::Relaxed) {
                log::debug!("shutdown before weight settled, nothing recorded");
                return;
            }
            if let Some(weight) = self.state.settled_weight() {
                break weight;
            }
            thread::sleep(self.poll_interval);
        };

        let result = {
            let _lit = IndicatorGuard::on(&*self.indicator);
            self.recorder.record(weight)
        };

        match result {
            Ok(()) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                log::info!("recorded {weight:.1} kg");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("failed to record {weight:.1} kg: {e}");
            }
        }
    }
}
