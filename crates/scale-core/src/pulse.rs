use serde::Serialize;
use thiserror::Error;

/// One mark (pulse) or space (gap) measured by the IR receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PulseSample {
    pub is_pulse: bool,
    pub duration_us: u32,
}

impl PulseSample {
    pub const fn pulse(duration_us: u32) -> Self {
        Self {
            is_pulse: true,
            duration_us,
        }
    }

    pub const fn gap(duration_us: u32) -> Self {
        Self {
            is_pulse: false,
            duration_us,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("pulse source I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A finite source (capture replay, simulation) has no more samples.
    #[error("pulse source closed")]
    Closed,
}

/// Blocking stream of timing samples. One sample per call.
pub trait PulseSource: Send {
    fn read(&mut self) -> Result<PulseSample, SourceError>;
}

impl<S: PulseSource + ?Sized> PulseSource for Box<S> {
    fn read(&mut self) -> Result<PulseSample, SourceError> {
        (**self).read()
    }
}

/// In-memory source, mostly for tests and replays already loaded into memory.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: std::collections::VecDeque<PulseSample>,
}

impl SampleBuffer {
    pub fn new(samples: impl IntoIterator<Item = PulseSample>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = PulseSample>) {
        self.samples.extend(samples);
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl PulseSource for SampleBuffer {
    fn read(&mut self) -> Result<PulseSample, SourceError> {
        self.samples.pop_front().ok_or(SourceError::Closed)
    }
}
