//! LIRC character device in `mode2` receive mode.
//!
//! The kernel delivers one native-endian `u32` per mark or space: bit 24
//! flags a pulse, the low 24 bits carry the duration in microseconds.

use scale_core::{PulseSample, PulseSource, SourceError};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::info;

pub const DEFAULT_DEVICE: &str = "/dev/lirc0";
pub const PULSE_BIT: u32 = 0x0100_0000;
pub const PULSE_MASK: u32 = 0x00FF_FFFF;

pub fn decode_word(word: u32) -> PulseSample {
    PulseSample {
        is_pulse: word & PULSE_BIT != 0,
        duration_us: word & PULSE_MASK,
    }
}

pub struct LircDevice<R: Read> {
    reader: R,
}

impl LircDevice<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(device = %path.display(), "Opened LIRC device");
        Ok(Self::new(BufReader::with_capacity(4 * 64, file)))
    }
}

impl<R: Read> LircDevice<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read + Send> PulseSource for LircDevice<R> {
    fn read(&mut self) -> Result<PulseSample, SourceError> {
        let mut word = [0u8; 4];
        match self.reader.read_exact(&mut word) {
            Ok(()) => Ok(decode_word(u32::from_ne_bytes(word))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SourceError::Closed),
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}
