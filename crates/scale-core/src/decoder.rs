//! Pulse-width bit decoding for the scale's IR link.
//!
//! Every bit is a ~500 µs mark followed by a space whose length carries the
//! value: ~500 µs for a one, ~1000 µs for a zero. Frames are separated by a
//! ~75 ms silence that may precede the first bit of a byte.

use crate::pulse::{PulseSource, SourceError};
use thiserror::Error;

pub const BIT_MARGIN_US: u32 = 200;
pub const SYNC_MARGIN_US: u32 = 15_000;

/// Inclusive `center ± margin` duration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingWindow {
    pub center_us: u32,
    pub margin_us: u32,
}

impl TimingWindow {
    pub const fn new(center_us: u32, margin_us: u32) -> Self {
        Self {
            center_us,
            margin_us,
        }
    }

    pub const fn contains(&self, duration_us: u32) -> bool {
        duration_us >= self.center_us.saturating_sub(self.margin_us)
            && duration_us <= self.center_us.saturating_add(self.margin_us)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderTiming {
    pub pulse: TimingWindow,
    pub one_gap: TimingWindow,
    pub zero_gap: TimingWindow,
    pub sync_gap: TimingWindow,
}

impl Default for DecoderTiming {
    fn default() -> Self {
        Self {
            pulse: TimingWindow::new(500, BIT_MARGIN_US),
            one_gap: TimingWindow::new(500, BIT_MARGIN_US),
            zero_gap: TimingWindow::new(1_000, BIT_MARGIN_US),
            sync_gap: TimingWindow::new(75_000, SYNC_MARGIN_US),
        }
    }
}

/// Why a byte could not be decoded. Never fatal: the caller drops the
/// partial frame and keeps scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BitError {
    #[error("bit {bit}: expected a pulse, got a {duration_us}us gap")]
    UnexpectedGap { bit: u8, duration_us: u32 },

    #[error("bit {bit}: pulse of {duration_us}us outside timing window")]
    PulseOutOfWindow { bit: u8, duration_us: u32 },

    #[error("bit {bit}: expected a gap, got a {duration_us}us pulse")]
    UnexpectedPulse { bit: u8, duration_us: u32 },

    #[error("bit {bit}: gap of {duration_us}us matches neither one nor zero")]
    GapOutOfWindow { bit: u8, duration_us: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct BitDecoder {
    timing: DecoderTiming,
    last_error: Option<BitError>,
}

impl BitDecoder {
    pub fn new(timing: DecoderTiming) -> Self {
        Self {
            timing,
            last_error: None,
        }
    }

    pub fn timing(&self) -> &DecoderTiming {
        &self.timing
    }

    /// Reason for the most recent `Ok(None)` from [`decode_byte`](Self::decode_byte).
    pub fn last_error(&self) -> Option<BitError> {
        self.last_error
    }

    /// Decodes `num_bits` bits MSB-first; bit `i` lands at position
    /// `num_bits - 1 - i`.
    ///
    /// Returns `Ok(None)` on any timing violation. Only device failures are
    /// returned as errors.
    pub fn decode_byte<S: PulseSource + ?Sized>(
        &mut self,
        source: &mut S,
        num_bits: u8,
    ) -> Result<Option<u8>, SourceError> {
        debug_assert!((1..=8).contains(&num_bits));
        self.last_error = None;

        let mut byte = 0u8;
        let mut i = 0u8;
        while i < num_bits {
            let mark = source.read()?;
            if !mark.is_pulse {
                // Inter-frame silence ahead of the first bit.
                if i == 0 && self.timing.sync_gap.contains(mark.duration_us) {
                    continue;
                }
                return Ok(self.fail(BitError::UnexpectedGap {
                    bit: i,
                    duration_us: mark.duration_us,
                }));
            }
            if !self.timing.pulse.contains(mark.duration_us) {
                return Ok(self.fail(BitError::PulseOutOfWindow {
                    bit: i,
                    duration_us: mark.duration_us,
                }));
            }

            let space = source.read()?;
            if space.is_pulse {
                return Ok(self.fail(BitError::UnexpectedPulse {
                    bit: i,
                    duration_us: space.duration_us,
                }));
            }
            let value: u8 = if self.timing.one_gap.contains(space.duration_us) {
                1
            } else if self.timing.zero_gap.contains(space.duration_us) {
                0
            } else {
                return Ok(self.fail(BitError::GapOutOfWindow {
                    bit: i,
                    duration_us: space.duration_us,
                }));
            };

            byte |= value << (num_bits - 1 - i);
            i += 1;
        }

        Ok(Some(byte))
    }

    fn fail(&mut self, error: BitError) -> Option<u8> {
        log::trace!("bit decode failed: {error}");
        self.last_error = Some(error);
        None
    }
}


#[cfg(test)]
mod proptest_decoder {
    use super::*;
    use crate::pulse::{PulseSample, SampleBuffer};
    use proptest::prelude::*;

    fn bad_pulse() -> impl Strategy<Value = u32> {
        prop_oneof![0u32..300, 701u32..1_000_000]
    }

    fn bad_gap() -> impl Strategy<Value = u32> {
        prop_oneof![0u32..300, 701u32..800, 1_201u32..1_000_000]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        #[test]
        fn pulse_outside_window_rejected(pulse in bad_pulse(), gap in 300u32..=1_200, num_bits in 1u8..=8) {
            let mut source = SampleBuffer::new(vec![PulseSample::pulse(pulse), PulseSample::gap(gap)]);
            let mut decoder = BitDecoder::default();
            prop_assert_eq!(decoder.decode_byte(&mut source, num_bits).unwrap(), None);
        }

        #[test]
        fn gap_outside_windows_rejected(pulse in 300u32..=700, gap in bad_gap(), num_bits in 1u8..=8) {
            let mut source = SampleBuffer::new(vec![PulseSample::pulse(pulse), PulseSample::gap(gap)]);
            let mut decoder = BitDecoder::default();
            prop_assert_eq!(decoder.decode_byte(&mut source, num_bits).unwrap(), None);
        }

        #[test]
        fn leading_gap_outside_sync_rejected(gap in prop_oneof![0u32..60_000, 90_001u32..10_000_000]) {
            let mut source = SampleBuffer::new(vec![PulseSample::gap(gap)]);
            let mut decoder = BitDecoder::default();
            prop_assert_eq!(decoder.decode_byte(&mut source, 8).unwrap(), None);
        }

        #[test]
        fn in_window_pairs_decode(value in any::<u8>(), pulse in 300u32..=700, one in 300u32..=700, zero in 800u32..=1_200) {
            let samples: Vec<_> = (0..8)
                .flat_map(|i| {
                    let gap = if (value >> (7 - i)) & 1 == 1 { one } else { zero };
                    [PulseSample::pulse(pulse), PulseSample::gap(gap)]
                })
                .collect();
            let mut source = SampleBuffer::new(samples);
            let mut decoder = BitDecoder::default();
            prop_assert_eq!(decoder.decode_byte(&mut source, 8).unwrap(), Some(value));
        }
    }
}
