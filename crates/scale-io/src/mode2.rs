//! Replay of text captures in the format printed by the `mode2` utility:
//!
//! ```text
//! space 75012
//! pulse 512
//! space 1024
//! ```
//!
//! Blank lines and `#` comments are ignored.

use scale_core::{PulseSample, PulseSource, SourceError};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Mode2Error {
    #[error("line {line}: expected `pulse <us>` or `space <us>`, got {text:?}")]
    Malformed { line: usize, text: String },
}

pub fn parse_line(text: &str) -> Option<PulseSample> {
    let mut parts = text.split_whitespace();
    let kind = parts.next()?;
    let duration_us = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    match kind {
        "pulse" => Some(PulseSample::pulse(duration_us)),
        "space" => Some(PulseSample::gap(duration_us)),
        _ => None,
    }
}

pub struct Mode2Replay<R: BufRead> {
    lines: io::Lines<R>,
    line_no: usize,
}

impl Mode2Replay<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Mode2Replay<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead + Send> PulseSource for Mode2Replay<R> {
    fn read(&mut self) -> Result<PulseSample, SourceError> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                None => return Err(SourceError::Closed),
            };
            self.line_no += 1;

            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            return parse_line(text).ok_or_else(|| {
                let malformed = Mode2Error::Malformed {
                    line: self.line_no,
                    text: text.to_string(),
                };
                SourceError::Io(io::Error::new(io::ErrorKind::InvalidData, malformed))
            });
        }
    }
}
