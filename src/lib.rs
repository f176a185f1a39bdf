/*!
 # Microseason Receipt Printer Library

 A Rust library that prints the current Japanese microseason (one of the 72 kō)
 to an ESC/POS thermal receipt printer once a day, with a button that steps
 through the calendar by hand.

 ## Features

 * Date-range matching, including ranges that wrap across New Year
 * Persisted "already printed" state so each entry prints at most once a day
 * Hourly auto-print scheduler gated by a threshold hour
 * Debounced manual override that cycles through every entry
 * Receipt layout with word wrapping, sizing and justification
 * A single render worker that owns the printer so output never interleaves

 ## Example

 ```no_run
 use std::sync::Arc;
 use microseason_printer::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     tracing_subscriber::fmt::init();

     let config = Config::default();
     let calendars = Arc::new(CalendarStore::open(&config.calendar_path));
     let state = Arc::new(PrintStateStore::new(FileStore::new(&config.state_dir)));

     let printer = Printer::new(WriterTransport::new(std::io::stdout()));
     let (render, worker) = RenderWorker::spawn(printer, config.queue_capacity);

     let clock = SystemClock::new(config.utc_offset_minutes, config.dst)?;
     let mut scheduler = Scheduler::new(clock, calendars, state, render, &config);
     let outcome = scheduler.tick().await;
     println!("{outcome:?}");

     drop(scheduler);
     worker.await.ok();
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the microseason printer library
#[derive(Error, Debug)]
pub enum Error {
    /// The local clock could not be read or was never synchronised
    #[error("Clock unavailable: {0}")]
    ClockUnavailable(String),

    /// Calendar file could not be read or parsed
    #[error("Calendar load failure: {0}")]
    CalendarLoad(String),

    /// Print state could not be read
    #[error("State store read failure: {0}")]
    StateStoreRead(String),

    /// Print state could not be written
    #[error("State store write failure: {0}")]
    StateStoreWrite(String),

    /// Printer transport rejected a write
    #[error("Printer transport failure: {0}")]
    Transport(String),

    /// The render worker has shut down and no longer accepts jobs
    #[error("Render worker is closed")]
    RenderWorkerClosed,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value out of range
    #[error("Value {0} out of range ({1}..{2})")]
    ValueOutOfRange(u32, u32, u32),

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error from the calendar file
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML error from the configuration file
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod button;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod matcher;
pub mod printer;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod worker;

// Re-export key types
pub use button::{ButtonEvent, ManualOverride, PressOutcome};
pub use calendar::{CalendarEntry, CalendarSet, CalendarStore, MonthDay};
pub use clock::{Clock, DstRule, LocalTimestamp, StaticClock, SystemClock};
pub use config::Config;
pub use printer::{
    Charset, Justify, Printer, PrinterCommand, PrinterTransport, RecordingTransport, Size,
    TransportWrite, WriterTransport,
};
pub use render::{render, Banner, WordWrap};
pub use scheduler::{Scheduler, SchedulerState, TickOutcome};
pub use state::{FileStore, KeyValueStore, MemoryStore, PrintState, PrintStateStore};
pub use worker::{RenderHandle, RenderJob, RenderWorker};
