//! Status LED on a sysfs GPIO line. Exporting the pin and setting its
//! direction is left to the system (udev rule or init script).

use scale_core::Indicator;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LedError {
    #[error("GPIO value file {path} not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct SysfsLed {
    value_path: PathBuf,
    // Serializes writers and remembers the last level for logging.
    level: Mutex<Option<bool>>,
}

impl SysfsLed {
    /// Opens the LED and drives it low.
    pub fn new(value_path: impl AsRef<Path>) -> Result<Self, LedError> {
        let led = Self {
            value_path: value_path.as_ref().to_path_buf(),
            level: Mutex::new(None),
        };
        led.write(false).map_err(|source| LedError::NotWritable {
            path: led.value_path.clone(),
            source,
        })?;
        *led.level.lock().unwrap_or_else(|e| e.into_inner()) = Some(false);
        Ok(led)
    }

    pub fn path(&self) -> &Path {
        &self.value_path
    }

    /// Last level written successfully; `None` after a failed write.
    pub fn is_lit(&self) -> Option<bool> {
        *self.level.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, on: bool) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.value_path)?;
        file.write_all(if on { b"1" } else { b"0" })
    }
}

impl Indicator for SysfsLed {
    fn set(&self, on: bool) {
        let mut level = self.level.lock().unwrap_or_else(|e| e.into_inner());
        match self.write(on) {
            Ok(()) => *level = Some(on),
            Err(e) => {
                warn!(path = %self.value_path.display(), error = %e, on, "Failed to drive LED");
                *level = None;
            }
        }
    }
}

impl Drop for SysfsLed {
    fn drop(&mut self) {
        if let Err(e) = self.write(false) {
            warn!(path = %self.value_path.display(), error = %e, "Failed to turn LED off");
        }
    }
}

/// For runs without an LED.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn set(&self, _on: bool) {}
}
