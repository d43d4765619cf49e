//! The scale's 5-byte measurement frame and the state machine that
//! assembles it from decoded bytes.
//!
//! Wire layout: `[0xAB, status, weight_hi, weight_lo, checksum]`. Weight is
//! fixed point in tenths of a kilogram. The checksum is the byte sum modulo
//! 255 with bit 0 cleared; only its upper seven bits are decodable on the
//! wire because the final bit's space merges into the inter-frame silence.

use crate::decoder::{BitDecoder, BitError, DecoderTiming};
use crate::pulse::{PulseSource, SourceError};
use serde::Serialize;
use thiserror::Error;

pub const FRAME_LEN: usize = 5;
pub const FRAME_HEADER: u8 = 0xAB;
pub const STATUS_STABLE: u8 = 0x8C;
pub const PAYLOAD_BITS: u8 = 8;
pub const CHECKSUM_BITS: u8 = 7;

/// Sum of `payload` modulo 255 with the low bit cleared.
pub fn checksum(payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .fold(0u32, |acc, &b| (acc + u32::from(b)) % 0xFF);
    (sum as u8) & !1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("byte {position} undecodable: {error}")]
    Timing { position: usize, error: BitError },

    #[error("header mismatch: found {found:#04x}")]
    HeaderMismatch { found: u8 },

    #[error("checksum failed: expected {expected:#04x}, found {found:#04x}")]
    Checksum { expected: u8, found: u8 },
}

/// A header- and checksum-validated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Result<Self, FrameError> {
        if bytes[0] != FRAME_HEADER {
            return Err(FrameError::HeaderMismatch { found: bytes[0] });
        }
        let expected = checksum(&bytes[..FRAME_LEN - 1]);
        if expected != bytes[FRAME_LEN - 1] {
            return Err(FrameError::Checksum {
                expected,
                found: bytes[FRAME_LEN - 1],
            });
        }
        Ok(Self { bytes })
    }

    /// Builds a frame the way the scale would transmit it.
    pub fn encode(status: u8, raw_weight: u16) -> Self {
        let [hi, lo] = raw_weight.to_be_bytes();
        let payload = [FRAME_HEADER, status, hi, lo];
        Self {
            bytes: [FRAME_HEADER, status, hi, lo, checksum(&payload)],
        }
    }

    pub fn bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    pub fn status(&self) -> u8 {
        self.bytes[1]
    }

    /// Weight in tenths of a kilogram.
    pub fn raw_weight(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn weight(&self) -> f64 {
        f64::from(self.raw_weight()) / 10.0
    }

    pub fn is_stable(&self) -> bool {
        self.status() == STATUS_STABLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// More bytes are needed, or nothing was in progress.
    Pending,
    Frame(Frame),
    Rejected(FrameError),
}

/// `Empty -> Accumulating(1..=4) -> Complete(5) -> Empty`.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    decoder: BitDecoder,
    buf: [u8; FRAME_LEN],
    len: usize,
}

impl FrameAssembler {
    pub fn new(timing: DecoderTiming) -> Self {
        Self {
            decoder: BitDecoder::new(timing),
            buf: [0; FRAME_LEN],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }

    pub fn bits_for_next_byte(&self) -> u8 {
        if self.len < FRAME_LEN - 1 {
            PAYLOAD_BITS
        } else {
            CHECKSUM_BITS
        }
    }

    /// Feeds one full-width byte. A completed frame always returns the
    /// assembler to `Empty`, valid or not.
    pub fn push(&mut self, byte: u8) -> AssemblerEvent {
        if self.len == 0 && byte != FRAME_HEADER {
            return AssemblerEvent::Rejected(FrameError::HeaderMismatch { found: byte });
        }

        self.buf[self.len] = byte;
        self.len += 1;
        if self.len < FRAME_LEN {
            return AssemblerEvent::Pending;
        }

        let bytes = self.buf;
        self.reset();
        match Frame::from_bytes(bytes) {
            Ok(frame) => AssemblerEvent::Frame(frame),
            Err(e) => AssemblerEvent::Rejected(e),
        }
    }

    /// Decodes the next byte from `source` and advances the state machine.
    ///
    /// A timing failure with nothing accumulated is line noise or the tail
    /// of the previous frame and reports `Pending`.
    pub fn poll<S: PulseSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<AssemblerEvent, SourceError> {
        let num_bits = self.bits_for_next_byte();
        match self.decoder.decode_byte(source, num_bits)? {
            // Short bytes carry the top bits of the value.
            Some(byte) => Ok(self.push(byte << (PAYLOAD_BITS - num_bits))),
            None => {
                let position = self.len;
                self.reset();
                match self.decoder.last_error() {
                    Some(error) if position > 0 => {
                        Ok(AssemblerEvent::Rejected(FrameError::Timing { position, error }))
                    }
                    _ => Ok(AssemblerEvent::Pending),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORTY_KG: [u8; FRAME_LEN] = [0xAB, 0x8C, 0x01, 0x90, 0xC8];

    #[test]
    fn checksum_clears_low_bit() {
        // 0xAB + 0x8C + 0x01 + 0x90 = 456; 456 mod 255 = 201 = 0xC9
        assert_eq!(checksum(&FORTY_KG[..4]), 0xC8);
    }

    #[test]
    fn checksum_wraps_at_255() {
        assert_eq!(checksum(&[0xFF, 0x01]), 0x00);
        assert_eq!(checksum(&[0xFE, 0x03]), 0x02);
    }

    #[test]
    fn frame_fields() {
        let frame = Frame::from_bytes(FORTY_KG).unwrap();
        assert_eq!(frame.raw_weight(), 400);
        assert_eq!(frame.weight(), 40.0);
        assert!(frame.is_stable());
        assert_eq!(Frame::encode(STATUS_STABLE, 400), frame);
    }

    #[test]
    fn unstable_status() {
        let frame = Frame::encode(0x0C, 725);
        assert!(!frame.is_stable());
        assert_eq!(frame.weight(), 72.5);
    }

    #[test]
    fn assembles_valid_frame() {
        let mut assembler = FrameAssembler::default();
        for &b in &FORTY_KG[..4] {
            assert_eq!(assembler.push(b), AssemblerEvent::Pending);
        }
        assert_eq!(assembler.bits_for_next_byte(), CHECKSUM_BITS);
        match assembler.push(FORTY_KG[4]) {
            AssemblerEvent::Frame(frame) => assert_eq!(frame.weight(), 40.0),
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(assembler.is_empty());
    }

    #[test]
    fn wrong_header_resets_immediately() {
        let mut assembler = FrameAssembler::default();
        assert_eq!(
            assembler.push(0x8C),
            AssemblerEvent::Rejected(FrameError::HeaderMismatch { found: 0x8C })
        );
        assert!(assembler.is_empty());
        assert_eq!(assembler.bits_for_next_byte(), PAYLOAD_BITS);
    }

    #[test]
    fn bad_checksum_discarded() {
        let mut assembler = FrameAssembler::default();
        for &b in &FORTY_KG[..4] {
            assembler.push(b);
        }
        assert_eq!(
            assembler.push(0xCA),
            AssemblerEvent::Rejected(FrameError::Checksum {
                expected: 0xC8,
                found: 0xCA
            })
        );
        assert!(assembler.is_empty());
    }
}
