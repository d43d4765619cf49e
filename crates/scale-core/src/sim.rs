use crate::frame::{Frame, STATUS_STABLE};
use crate::pulse::{PulseSample, PulseSource, SourceError};
use std::collections::VecDeque;
use std::time::Duration;

pub const MARK_US: u32 = 500;
pub const ONE_SPACE_US: u32 = 500;
pub const ZERO_SPACE_US: u32 = 1_000;
pub const SYNC_SPACE_US: u32 = 75_000;

/// Status byte the scale sends while the reading is still moving.
pub const STATUS_MEASURING: u8 = STATUS_STABLE & !0x80;

/// Wire encoding of raw bytes: leading sync space, then eight bits per byte.
/// The final bit's space is left out; on the real link it is swallowed by
/// the next frame's sync space.
pub fn encode_bytes(bytes: &[u8]) -> Vec<PulseSample> {
    let mut samples = Vec::with_capacity(1 + bytes.len() * 16);
    samples.push(PulseSample::gap(SYNC_SPACE_US));
    for &byte in bytes {
        for i in (0..8).rev() {
            samples.push(PulseSample::pulse(MARK_US));
            let space = if (byte >> i) & 1 == 1 {
                ONE_SPACE_US
            } else {
                ZERO_SPACE_US
            };
            samples.push(PulseSample::gap(space));
        }
    }
    samples.pop();
    samples
}

pub fn encode_frame(frame: &Frame) -> Vec<PulseSample> {
    encode_bytes(frame.bytes())
}

/// Scripted scale transmitting a sequence of frames, optionally paced in
/// real time. Closes after the last frame.
#[derive(Debug, Clone)]
pub struct SimulatedScale {
    frames: VecDeque<Frame>,
    pending: VecDeque<PulseSample>,
    frame_interval: Duration,
    started: bool,
}

impl SimulatedScale {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            pending: VecDeque::new(),
            frame_interval: Duration::ZERO,
            started: false,
        }
    }

    /// A person stepping on: the display climbs towards `target_kg`, then
    /// holds it for `stable_frames` frames.
    pub fn weighing(target_kg: f64, stable_frames: usize) -> Self {
        let raw = (target_kg * 10.0).round().clamp(0.0, f64::from(u16::MAX)) as u16;
        let ramp = [0.25, 0.5, 0.75, 0.9, 0.98]
            .into_iter()
            .map(|f| Frame::encode(STATUS_MEASURING, (f64::from(raw) * f) as u16));
        let hold = std::iter::repeat(Frame::encode(STATUS_STABLE, raw)).take(stable_frames);
        Self::new(ramp.chain(hold))
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn frames_left(&self) -> usize {
        self.frames.len()
    }
}

impl PulseSource for SimulatedScale {
    fn read(&mut self) -> Result<PulseSample, SourceError> {
        if self.pending.is_empty() {
            let frame = self.frames.pop_front().ok_or(SourceError::Closed)?;
            if self.started && !self.frame_interval.is_zero() {
                std::thread::sleep(self.frame_interval);
            }
            self.started = true;
            self.pending.extend(encode_frame(&frame));
        }
        self.pending.pop_front().ok_or(SourceError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AssemblerEvent, FrameAssembler};

    fn drain(mut scale: SimulatedScale) -> Vec<Frame> {
        let mut assembler = FrameAssembler::default();
        let mut frames = Vec::new();
        loop {
            match assembler.poll(&mut scale) {
                Ok(AssemblerEvent::Frame(f)) => frames.push(f),
                Ok(_) => {}
                Err(SourceError::Closed) => return frames,
                Err(e) => panic!("unexpected source error: {e}"),
            }
        }
    }

    #[test]
    fn encoding_shape() {
        let samples = encode_frame(&Frame::encode(STATUS_STABLE, 400));
        assert_eq!(samples.len(), 1 + 5 * 16 - 1);
        assert_eq!(samples[0], PulseSample::gap(SYNC_SPACE_US));
        assert_eq!(samples.last(), Some(&PulseSample::pulse(MARK_US)));
    }

    #[test]
    fn weighing_script_decodes() {
        let frames = drain(SimulatedScale::weighing(72.5, 12));
        assert_eq!(frames.len(), 17);
        assert!(frames[..5].iter().all(|f| !f.is_stable()));
        assert!(frames[5..].iter().all(|f| f.is_stable() && f.weight() == 72.5));
    }
}
