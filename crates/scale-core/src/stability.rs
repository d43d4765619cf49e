use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityConfig {
    /// Consecutive stable frames required before a reading may be recorded.
    pub stable_frames: u32,
    /// Time without a fresh stable frame before the reading counts as final.
    pub quiet_window: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            stable_frames: 10,
            quiet_window: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Default)]
struct Readings {
    stable_count: u32,
    last_stable_time: Option<Instant>,
    stable_weight: f64,
    last_update_time: Option<Instant>,
    weight: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeightSnapshot {
    pub stable_count: u32,
    pub stable_weight: f64,
    pub weight: f64,
    pub since_stable_ms: Option<u64>,
    pub since_update_ms: Option<u64>,
}

/// Debounced view of the scale display, shared between the decode loop
/// (writer) and the recording task (reader).
#[derive(Debug)]
pub struct WeightState {
    config: StabilityConfig,
    readings: Mutex<Readings>,
}

impl WeightState {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            readings: Mutex::new(Readings::default()),
        }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    pub fn update(&self, is_stable: bool, weight: f64) {
        self.update_at(is_stable, weight, Instant::now());
    }

    pub fn update_at(&self, is_stable: bool, weight: f64, now: Instant) {
        let mut r = self.lock();
        if is_stable {
            r.stable_count = r.stable_count.saturating_add(1);
            r.last_stable_time = Some(now);
            r.stable_weight = weight;
        } else {
            r.stable_count = 0;
        }
        r.last_update_time = Some(now);
        r.weight = weight;
    }

    pub fn can_record(&self) -> bool {
        self.can_record_at(Instant::now())
    }

    pub fn can_record_at(&self, now: Instant) -> bool {
        self.settled_weight_at(now).is_some()
    }

    /// The stable weight, if it may be recorded at `now`. Reads the
    /// predicate and the weight under one lock.
    pub fn settled_weight_at(&self, now: Instant) -> Option<f64> {
        let r = self.lock();
        let quiet = r
            .last_stable_time
            .is_some_and(|t| now.saturating_duration_since(t) > self.config.quiet_window);
        (r.stable_count >= self.config.stable_frames && r.stable_weight > 0.0 && quiet)
            .then_some(r.stable_weight)
    }

    pub fn settled_weight(&self) -> Option<f64> {
        self.settled_weight_at(Instant::now())
    }

    pub fn stable_count(&self) -> u32 {
        self.lock().stable_count
    }

    pub fn stable_weight(&self) -> f64 {
        self.lock().stable_weight
    }

    pub fn snapshot(&self) -> WeightSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> WeightSnapshot {
        let r = self.lock();
        let age_ms = |t: Option<Instant>| {
            t.map(|t| now.saturating_duration_since(t).as_millis() as u64)
        };
        WeightSnapshot {
            stable_count: r.stable_count,
            stable_weight: r.stable_weight,
            weight: r.weight,
            since_stable_ms: age_ms(r.last_stable_time),
            since_update_ms: age_ms(r.last_update_time),
        }
    }

    // Every update leaves the fields consistent, so a panic elsewhere while
    // holding the lock does not invalidate them.
    fn lock(&self) -> MutexGuard<'_, Readings> {
        self.readings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WeightState {
    fn default() -> Self {
        Self::new(StabilityConfig::default())
    }
}
