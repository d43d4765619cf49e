use crate::decoder::DecoderTiming;
use crate::frame::{AssemblerEvent, Frame, FrameAssembler, FrameError};
use crate::pulse::{PulseSource, SourceError};
use crate::recording::{RecordingCoordinator, Trigger};
use crate::stability::WeightState;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("decode loop aborted: {0}")]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    pub frames_decoded: u64,
    pub stable_frames: u64,
    pub decode_failures: u64,
    pub header_mismatches: u64,
    pub checksum_failures: u64,
}

/// Live counters, readable from other threads while the loop runs.
#[derive(Debug, Default)]
pub struct DecodeCounters {
    frames_decoded: AtomicU64,
    stable_frames: AtomicU64,
    decode_failures: AtomicU64,
    header_mismatches: AtomicU64,
    checksum_failures: AtomicU64,
}

impl DecodeCounters {
    pub fn snapshot(&self) -> DecodeStats {
        DecodeStats {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            stable_frames: self.stable_frames.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            header_mismatches: self.header_mismatches.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
        }
    }
}

/// Blocking loop: pulses in, frames through the stability tracker and the
/// recording coordinator. Paced entirely by the source.
pub struct DecodeLoop<S: PulseSource> {
    source: S,
    assembler: FrameAssembler,
    state: Arc<WeightState>,
    coordinator: RecordingCoordinator,
    counters: Arc<DecodeCounters>,
}

impl<S: PulseSource> DecodeLoop<S> {
    pub fn new(
        source: S,
        timing: DecoderTiming,
        state: Arc<WeightState>,
        coordinator: RecordingCoordinator,
    ) -> Self {
        Self {
            source,
            assembler: FrameAssembler::new(timing),
            state,
            coordinator,
            counters: Arc::new(DecodeCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<DecodeCounters> {
        Arc::clone(&self.counters)
    }

    pub fn coordinator(&self) -> &RecordingCoordinator {
        &self.coordinator
    }

    /// Runs until `stop` is raised or the source closes, then gives an
    /// in-flight recording the time it needs to settle. Device failures end
    /// the loop with an error.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<DecodeStats, LoopError> {
        let outcome = self.decode_until(stop);
        let grace = self.coordinator.settle_grace();
        self.coordinator.join_within(grace);
        outcome.map(|()| self.counters.snapshot())
    }

    fn decode_until(&mut self, stop: &AtomicBool) -> Result<(), LoopError> {
        while !stop.load(Ordering::Relaxed) {
            match self.assembler.poll(&mut self.source) {
                Ok(AssemblerEvent::Pending) => {}
                Ok(AssemblerEvent::Frame(frame)) => self.handle_frame(&frame),
                Ok(AssemblerEvent::Rejected(e)) => self.handle_rejection(e),
                Err(SourceError::Closed) => {
                    log::info!("pulse source closed");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: &Frame) {
        self.counters.frames_decoded.fetch_add(1, Ordering::Relaxed);
        if frame.is_stable() {
            self.counters.stable_frames.fetch_add(1, Ordering::Relaxed);
        }
        log::debug!(
            "frame {:02x?} status={:#04x} weight={:.1}",
            frame.bytes(),
            frame.status(),
            frame.weight()
        );

        self.state.update(frame.is_stable(), frame.weight());
        if self.coordinator.on_frame(frame) == Trigger::Launched {
            log::debug!("recording task launched at {:.1} kg", frame.weight());
        }
    }

    fn handle_rejection(&mut self, error: FrameError) {
        match error {
            FrameError::Timing { .. } => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                log::debug!("partial frame discarded: {error}");
            }
            FrameError::HeaderMismatch { .. } => {
                self.counters.header_mismatches.fetch_add(1, Ordering::Relaxed);
                log::trace!("{error}");
            }
            FrameError::Checksum { .. } => {
                self.counters.checksum_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("{error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::{PulseSample, SampleBuffer};
    use crate::recording::{Indicator, RecordError, Recorder, RecordingConfig};
    use crate::sim::encode_frame;

    struct NoopRecorder;

    impl Recorder for NoopRecorder {
        fn record(&self, _weight_kg: f64) -> Result<(), RecordError> {
            Ok(())
        }
    }

    struct NoopLed;

    impl Indicator for NoopLed {
        fn set(&self, _on: bool) {}
    }

    fn decode_loop(samples: Vec<PulseSample>) -> DecodeLoop<SampleBuffer> {
        let state = Arc::new(WeightState::default());
        let stop = Arc::new(AtomicBool::new(false));
        let coordinator = RecordingCoordinator::new(
            Arc::clone(&state),
            Arc::new(NoopRecorder),
            Arc::new(NoopLed),
            RecordingConfig::default(),
            stop,
        );
        DecodeLoop::new(
            SampleBuffer::new(samples),
            DecoderTiming::default(),
            state,
            coordinator,
        )
    }

    #[test]
    fn counts_frames_until_source_closes() {
        let mut samples = Vec::new();
        for raw in [700, 710, 720] {
            samples.extend(encode_frame(&Frame::encode(0x0C, raw)));
        }
        let mut l = decode_loop(samples);
        let stats = l.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(stats.frames_decoded, 3);
        assert_eq!(stats.stable_frames, 0);
        assert_eq!(stats.checksum_failures, 0);
        assert_eq!(l.state.snapshot().weight, 72.0);
    }

    #[test]
    fn corrupted_checksum_counted_and_skipped() {
        let good = Frame::encode(0x8C, 655);
        let mut bytes = *good.bytes();
        bytes[3] ^= 0x10;
        let mut samples = crate::sim::encode_bytes(&bytes);
        samples.extend(encode_frame(&good));

        let mut l = decode_loop(samples);
        let stats = l.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(stats.checksum_failures, 1);
        assert_eq!(stats.frames_decoded, 1);
        assert_eq!(l.state.snapshot().stable_weight, 65.5);
    }

    #[test]
    fn broken_pulse_discards_partial_frame() {
        let frame = Frame::encode(0x8C, 400);
        let mut samples = encode_frame(&frame);
        // Stretch a pulse inside the second byte.
        samples[1 + 2 * 9].duration_us = 2_000;
        samples.extend(encode_frame(&frame));

        let mut l = decode_loop(samples);
        let stats = l.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(stats.frames_decoded, 1);
        assert!(stats.decode_failures >= 1);
    }

    #[test]
    fn stop_flag_ends_loop() {
        let mut l = decode_loop(encode_frame(&Frame::encode(0x8C, 400)));
        let stats = l.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(stats, DecodeStats::default());
    }

    #[test]
    fn unsettled_zero_weight_does_not_block_shutdown() {
        use crate::stability::StabilityConfig;
        use std::time::{Duration, Instant};

        let mut samples = Vec::new();
        for _ in 0..12 {
            samples.extend(encode_frame(&Frame::encode(0x8C, 0)));
        }
        let state = Arc::new(WeightState::new(StabilityConfig {
            stable_frames: 10,
            quiet_window: Duration::from_millis(50),
        }));
        let shared_stop = Arc::new(AtomicBool::new(false));
        let coordinator = RecordingCoordinator::new(
            Arc::clone(&state),
            Arc::new(NoopRecorder),
            Arc::new(NoopLed),
            RecordingConfig {
                poll_interval: Duration::from_millis(10),
                ..RecordingConfig::default()
            },
            Arc::clone(&shared_stop),
        );
        let mut l = DecodeLoop::new(
            SampleBuffer::new(samples),
            DecoderTiming::default(),
            state,
            coordinator,
        );

        let started = Instant::now();
        let handle = std::thread::spawn(move || {
            let stats = l.run(&AtomicBool::new(false));
            (stats.map(|s| s.stable_frames), l.coordinator().counters().snapshot())
        });
        while !handle.is_finished() && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished(), "run still waiting on the recording task");

        let (stable_frames, recording) = handle.join().unwrap();
        assert_eq!(stable_frames.unwrap(), 12);
        assert_eq!(recording.started, 1);
        assert_eq!(recording.completed, 0);
        assert!(shared_stop.load(Ordering::Relaxed));
    }

    struct FailingSource;

    impl PulseSource for FailingSource {
        fn read(&mut self) -> Result<PulseSample, SourceError> {
            Err(SourceError::Io(std::io::Error::other("device unplugged")))
        }
    }

    #[test]
    fn device_failure_is_fatal() {
        let state = Arc::new(WeightState::default());
        let coordinator = RecordingCoordinator::new(
            Arc::clone(&state),
            Arc::new(NoopRecorder),
            Arc::new(NoopLed),
            RecordingConfig::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let mut l = DecodeLoop::new(FailingSource, DecoderTiming::default(), state, coordinator);
        assert!(matches!(
            l.run(&AtomicBool::new(false)),
            Err(LoopError::Source(SourceError::Io(_)))
        ));
    }
}
