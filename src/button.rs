/*!
 # Manual override

 Each button press prints one microseason, stepping forward through the
 calendar by number regardless of today's date. The first press after a
 quiet spell starts again from the last automatically printed entry.

 Raw presses arrive as [`ButtonEvent`]s on a channel; a single consumer runs
 the state machine and queues receipts on the render worker, so nothing slow
 happens where the press is detected.
*/

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::calendar::CalendarStore;
use crate::config::Config;
use crate::matcher::{max_id, resolve_by_id};
use crate::render::{render, Banner};
use crate::state::PrintStateStore;
use crate::worker::RenderHandle;

/// A rising edge on the button input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub at: Instant,
}

impl ButtonEvent {
    pub fn now() -> Self {
        Self { at: Instant::now() }
    }
}

/// Position in the manual cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualCycleState {
    /// Entry the next accepted press prints
    pub current_entry_id: u32,
    /// When the last press was accepted
    pub last_event_time: Instant,
}

/// What a press did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Too soon after the previous press
    Debounced,
    Printed(u32),
    /// No entry with this id; the cycle moved on anyway
    Missing(u32),
    /// The printer failed
    PrintFailed(u32),
}

/// Button-driven state machine
pub struct ManualOverride {
    calendars: Arc<CalendarStore>,
    state: Arc<PrintStateStore>,
    render: RenderHandle,
    debounce: Duration,
    idle_reset: Duration,
    cycle: Option<ManualCycleState>,
}

impl ManualOverride {
    pub fn new(
        calendars: Arc<CalendarStore>,
        state: Arc<PrintStateStore>,
        render: RenderHandle,
        config: &Config,
    ) -> Self {
        Self {
            calendars,
            state,
            render,
            debounce: config.debounce(),
            idle_reset: config.idle_reset(),
            cycle: None,
        }
    }

    pub fn cycle(&self) -> Option<ManualCycleState> {
        self.cycle
    }

    /// Applies debounce and idle reset, returning the entry to print
    fn accept(&mut self, at: Instant, max_id: u32) -> Option<u32> {
        let reseed = match self.cycle {
            None => true,
            Some(cycle) => {
                let elapsed = at.saturating_duration_since(cycle.last_event_time);
                if elapsed < self.debounce {
                    trace!("Ignoring press {:?} after the previous one", elapsed);
                    return None;
                }
                elapsed > self.idle_reset
            }
        };

        let current = match self.cycle {
            Some(cycle) if !reseed => cycle.current_entry_id,
            _ => {
                let last = self.state.load().last_auto_entry_id;
                debug!("Manual cycle reseeded from last auto print {}", last);
                if last == 0 {
                    1
                } else {
                    last
                }
            }
        };

        let next = if current >= max_id { 1 } else { current + 1 };
        self.cycle = Some(ManualCycleState {
            current_entry_id: next,
            last_event_time: at,
        });
        Some(current)
    }

    /// Handles one press
    #[instrument(skip(self))]
    pub async fn handle(&mut self, event: ButtonEvent) -> PressOutcome {
        let calendar = self.calendars.snapshot();
        let Some(id) = self.accept(event.at, max_id(&calendar.micro)) else {
            return PressOutcome::Debounced;
        };

        let Some(entry) = resolve_by_id(id, &calendar.micro) else {
            warn!("Button press: no microseason numbered {}", id);
            return PressOutcome::Missing(id);
        };

        info!("Button press: printing microseason {}", id);
        match self
            .render
            .render(&format!("manual #{id}"), render(entry, Banner::Micro))
            .await
        {
            Ok(()) => PressOutcome::Printed(id),
            Err(e) => {
                warn!("Button press: microseason {} not printed: {}", id, e);
                PressOutcome::PrintFailed(id)
            }
        }
    }

    /// Consumes presses until the channel closes or `shutdown` flips to true
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ButtonEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Manual override listening for button presses");
        while !*shutdown.borrow() {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let outcome = self.handle(event).await;
                        debug!("Press handled: {:?}", outcome);
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Manual override stopped");
    }
}

/// Turns every line read from `reader` into a button press, on its own thread.
///
/// Stands in for the GPIO edge interrupt: it only timestamps and enqueues.
/// A blocking read cannot be cancelled, so shutdown never waits on this
/// thread; it ends by itself once the reader is exhausted or the receiver has
/// gone away. The join handle yields the number of presses sent.
pub fn spawn_press_reader<R>(
    reader: R,
    tx: mpsc::Sender<ButtonEvent>,
) -> thread::JoinHandle<usize>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        let mut sent = 0;
        for line in reader.lines() {
            if let Err(e) = line {
                warn!("Button input failed: {}", e);
                break;
            }
            if tx.blocking_send(ButtonEvent::now()).is_err() {
                break;
            }
            sent += 1;
        }
        debug!("Button input closed after {} presses", sent);
        sent
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarSet;
    use crate::printer::{Printer, RecordingTransport};
    use crate::state::{MemoryStore, LAST_AUTO_KEY};
    use crate::worker::RenderWorker;

    fn controller(last_auto: Option<u32>) -> ManualOverride {
        let store = match last_auto {
            Some(id) => MemoryStore::with_value(LAST_AUTO_KEY, id.to_string().as_bytes()),
            None => MemoryStore::new(),
        };
        let (render, _worker) = RenderWorker::spawn(Printer::new(RecordingTransport::new()), 1);
        ManualOverride::new(
            Arc::new(CalendarStore::from_set(CalendarSet::default())),
            Arc::new(PrintStateStore::new(store)),
            render,
            &Config::default(),
        )
    }

    #[tokio::test]
    async fn test_first_press_falls_back_to_one() {
        let mut manual = controller(None);
        let t0 = Instant::now();
        assert_eq!(manual.accept(t0, 72), Some(1));
        assert_eq!(manual.cycle().unwrap().current_entry_id, 2);
    }

    #[tokio::test]
    async fn test_accept_steps_and_wraps() {
        let mut manual = controller(Some(71));
        let t0 = Instant::now();
        assert_eq!(manual.accept(t0, 72), Some(71));
        assert_eq!(manual.accept(t0 + Duration::from_secs(1), 72), Some(72));
        assert_eq!(manual.accept(t0 + Duration::from_secs(2), 72), Some(1));
        assert_eq!(manual.accept(t0 + Duration::from_secs(3), 72), Some(2));
    }

    #[tokio::test]
    async fn test_accept_debounce_boundary() {
        let mut manual = controller(Some(10));
        let t0 = Instant::now();
        assert_eq!(manual.accept(t0, 72), Some(10));
        assert_eq!(manual.accept(t0 + Duration::from_millis(499), 72), None);
        assert_eq!(manual.accept(t0 + Duration::from_millis(500), 72), Some(11));
    }

    #[tokio::test]
    async fn test_press_with_empty_calendar() {
        let mut manual = controller(None);
        assert_eq!(manual.handle(ButtonEvent::now()).await, PressOutcome::Missing(1));
    }

    #[test]
    fn test_press_reader_counts_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = std::io::Cursor::new(b"\npress\n\n".to_vec());
        assert_eq!(spawn_press_reader(input, tx).join().unwrap(), 3);
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    /// Reader that blocks until its sender is dropped, then reports EOF
    struct HeldOpen(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for HeldOpen {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_shutdown_does_not_wait_for_open_input() {
        let store = MemoryStore::new();
        let (render, _worker) = RenderWorker::spawn(Printer::new(RecordingTransport::new()), 1);
        let set = CalendarSet {
            micro: vec![crate::calendar::CalendarEntry {
                id: 1,
                display_name: "Parsley flourishes".into(),
                native_label: "芹乃栄".into(),
                phonetic_label: "Seri sunawachi sakau".into(),
                range_start: crate::calendar::MonthDay::new(1, 5),
                range_end: crate::calendar::MonthDay::new(1, 9),
            }],
            ..CalendarSet::default()
        };
        let manual = ManualOverride::new(
            Arc::new(CalendarStore::from_set(set)),
            Arc::new(PrintStateStore::new(store)),
            render.clone(),
            &Config::default(),
        );

        let (hold, held) = std::sync::mpsc::channel();
        let input = std::io::BufReader::new(std::io::Read::chain(
            std::io::Cursor::new(b"press\n".to_vec()),
            HeldOpen(held),
        ));
        let (tx, rx) = mpsc::channel(4);
        let reader = spawn_press_reader(input, tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(manual.run(rx, shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while render.rendered() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!reader.is_finished());

        drop(hold);
        assert_eq!(reader.join().unwrap(), 1);
    }
}
