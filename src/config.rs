/*!
 # Configuration

 Runtime settings, read from an optional TOML file. Every field has a
 default so an empty (or missing) file gives a working setup.

 ```toml
 calendar_path = "/flash/microseasons.json"
 state_dir = "/flash"
 printer_device = "/dev/serial0"
 print_threshold_hour = 9
 utc_offset_minutes = 540
 dst = "none"
 ```
*/

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::clock::DstRule;
use crate::printer::Charset;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Calendar JSON file
    pub calendar_path: PathBuf,
    /// Directory holding the persisted print state
    pub state_dir: PathBuf,
    /// Serial device the printer is attached to, `-` for stdout
    pub printer_device: String,
    /// No automatic print before this local hour (0-23)
    pub print_threshold_hour: u8,
    /// Local standard time offset east of UTC
    pub utc_offset_minutes: i32,
    pub dst: DstRule,
    /// Scheduler cadence, aligned to the top of the hour
    pub poll_interval_secs: u64,
    /// Presses closer together than this are ignored
    pub debounce_ms: u64,
    /// After this long without a press the manual cycle restarts
    pub idle_reset_secs: u64,
    pub charset: Charset,
    /// Render jobs that may wait for the printer
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calendar_path: PathBuf::from("microseasons.json"),
            state_dir: PathBuf::from("."),
            printer_device: "/dev/serial0".to_string(),
            print_threshold_hour: 9,
            utc_offset_minutes: 0,
            dst: DstRule::None,
            poll_interval_secs: 3600,
            debounce_ms: 500,
            idle_reset_secs: 10,
            charset: Charset::Japanese,
            queue_capacity: 8,
        }
    }
}

impl Config {
    /// Parses and validates TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.print_threshold_hour > 23 {
            return Err(Error::ValueOutOfRange(
                self.print_threshold_hour as u32,
                0,
                23,
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn idle_reset(&self) -> Duration {
        Duration::from_secs(self.idle_reset_secs)
    }
}
