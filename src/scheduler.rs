/*!
 # Auto-print scheduler

 Wakes on a fixed cadence (hourly, at the top of the hour), works out today's
 microseason and prints it once. The id of the last automatic print is
 persisted before the receipt is queued, so a crash can cost a print but
 never duplicate one.
*/

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, instrument, warn};

use crate::calendar::CalendarStore;
use crate::clock::{next_tick_delay, Clock};
use crate::config::Config;
use crate::matcher::resolve;
use crate::render::{render, Banner};
use crate::state::PrintStateStore;
use crate::worker::RenderHandle;

/// Where the scheduler is within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Resolving,
    Printing,
}

/// Result of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clock could not be read; retried next tick
    ClockUnavailable,
    /// Too early in the day
    BeforeThreshold { hour: u8 },
    /// No entry covers today, or the calendar is empty
    NoMatchingEntry,
    /// Today's entry was already printed
    AlreadyPrinted(u32),
    /// State could not be persisted, so nothing was printed; retried next tick
    StoreFailed(u32),
    /// Receipt printed
    Printed(u32),
    /// State persisted but the printer failed; not retried
    PrintFailed(u32),
}

/// Scheduling context, owned by the scheduler task
pub struct Scheduler<C> {
    clock: C,
    calendars: Arc<CalendarStore>,
    state: Arc<PrintStateStore>,
    render: RenderHandle,
    threshold_hour: u8,
    poll_interval: Duration,
    current: SchedulerState,
    ticks: u64,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        clock: C,
        calendars: Arc<CalendarStore>,
        state: Arc<PrintStateStore>,
        render: RenderHandle,
        config: &Config,
    ) -> Self {
        Self {
            clock,
            calendars,
            state,
            render,
            threshold_hour: config.print_threshold_hour,
            poll_interval: config.poll_interval(),
            current: SchedulerState::Idle,
            ticks: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.current
    }

    /// Number of ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.current != next {
            debug!("Scheduler {:?} -> {:?}", self.current, next);
            self.current = next;
        }
    }

    /// Runs one poll: resolve today's entry and print it if it is new
    #[instrument(skip(self), fields(tick = self.ticks + 1))]
    pub async fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;
        let outcome = self.poll().await;
        self.transition(SchedulerState::Idle);
        outcome
    }

    async fn poll(&mut self) -> TickOutcome {
        let now = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                warn!("Skipping tick: {}", e);
                return TickOutcome::ClockUnavailable;
            }
        };
        debug!(
            "Local time {}-{:02}-{:02} {:02}:{:02}:{:02}, weekday {}",
            now.year, now.month, now.day, now.hour, now.minute, now.second, now.weekday
        );

        if now.hour < self.threshold_hour {
            debug!(
                "Hour {} is before print threshold {}",
                now.hour, self.threshold_hour
            );
            return TickOutcome::BeforeThreshold { hour: now.hour };
        }

        self.transition(SchedulerState::Resolving);
        let calendar = self.calendars.reload();
        let date = now.date();
        let Some(entry) = resolve(date, &calendar.micro) else {
            info!("No microseason found for {}", date);
            return TickOutcome::NoMatchingEntry;
        };
        let id = entry.id;

        let printed = self.state.load();
        if printed.last_auto_entry_id == id {
            info!("Microseason {} already printed for {}", id, date);
            return TickOutcome::AlreadyPrinted(id);
        }

        // Persist first: a crash after this point loses the print instead of
        // repeating it
        if let Err(e) = self.state.store(id) {
            warn!("Not printing microseason {}: {}", id, e);
            return TickOutcome::StoreFailed(id);
        }

        self.transition(SchedulerState::Printing);
        let mut commands = Vec::new();
        if let Some(band) = resolve(date, &calendar.macro_bands) {
            commands.extend(render(band, Banner::Macro));
        }
        if let Some(band) = resolve(date, &calendar.mini) {
            commands.extend(render(band, Banner::Mini));
        }
        commands.extend(render(entry, Banner::Micro));

        info!("Printing microseason {}: {}", id, entry.display_name);
        match self.render.render(&format!("auto #{id}"), commands).await {
            Ok(()) => TickOutcome::Printed(id),
            Err(e) => {
                warn!("Microseason {} was not printed: {}", id, e);
                TickOutcome::PrintFailed(id)
            }
        }
    }

    /// Ticks on the configured cadence until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Scheduler started, printing after {:02}:00 every {}s",
            self.threshold_hour,
            self.poll_interval.as_secs()
        );
        while !*shutdown.borrow() {
            let outcome = self.tick().await;
            debug!("Tick {} finished: {:?}", self.ticks, outcome);

            let delay = match self.clock.now() {
                Ok(now) => next_tick_delay(&now, self.poll_interval),
                Err(_) => self.poll_interval,
            };
            tokio::select! {
                _ = time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Scheduler stopped after {} ticks", self.ticks);
    }
}
