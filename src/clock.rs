/*!
 # Clock adapter

 Converts absolute time into the local calendar timestamp the scheduler works
 with, using a fixed UTC offset plus an optional coarse daylight-saving rule.
*/

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveDateTime,
    Timelike, Utc, Weekday,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::calendar::MonthDay;
use crate::{Error, Result};

/// Earliest year a synchronised clock can report
const MIN_SYNCED_YEAR: i32 = 2020;

/// Local calendar time, derived fresh for every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimestamp {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Day of week, 0 = Monday
    pub weekday: u8,
}

impl LocalTimestamp {
    pub fn from_naive(dt: NaiveDateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
            weekday: dt.weekday().num_days_from_monday() as u8,
        }
    }

    /// Builds a timestamp at the start of the given minute.
    ///
    /// The weekday is computed from the date; an impossible date gets 0.
    pub fn at(year: i32, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        let weekday = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
            .map(|d| d.weekday().num_days_from_monday() as u8)
            .unwrap_or(0);
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second: 0,
            weekday,
        }
    }

    /// The (month, day) used for calendar matching
    pub fn date(&self) -> MonthDay {
        MonthDay::new(self.month, self.day)
    }
}

/// Source of local time
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<LocalTimestamp>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Result<LocalTimestamp> {
        (**self).now()
    }
}

/// Coarse daylight-saving rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstRule {
    /// Offset never changes
    #[default]
    None,
    /// Second Sunday of March to first Sunday of November, 02:00 local
    UnitedStates,
    /// Last Sunday of March to last Sunday of October, 01:00 UTC
    EuropeanUnion,
}

impl DstRule {
    /// Whether daylight time is in effect.
    ///
    /// `utc` is the absolute time and `standard` the same instant in local
    /// standard time (fixed offset only).
    pub fn in_effect(&self, utc: NaiveDateTime, standard: NaiveDateTime) -> bool {
        match self {
            DstRule::None => false,
            DstRule::UnitedStates => {
                let year = standard.year();
                let start = nth_weekday(year, 3, Weekday::Sun, 2).and_hms_opt(2, 0, 0);
                // 02:00 daylight is 01:00 standard
                let end = nth_weekday(year, 11, Weekday::Sun, 1).and_hms_opt(1, 0, 0);
                match (start, end) {
                    (Some(start), Some(end)) => start <= standard && standard < end,
                    _ => false,
                }
            }
            DstRule::EuropeanUnion => {
                let year = utc.year();
                let start = last_weekday(year, 3, Weekday::Sun).and_hms_opt(1, 0, 0);
                let end = last_weekday(year, 10, Weekday::Sun).and_hms_opt(1, 0, 0);
                match (start, end) {
                    (Some(start), Some(end)) => start <= utc && utc < end,
                    _ => false,
                }
            }
        }
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> NaiveDate {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n).unwrap_or(NaiveDate::MIN)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    (4..=5)
        .rev()
        .find_map(|n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n))
        .unwrap_or(NaiveDate::MIN)
}

/// Wall clock backed by the system time
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
    dst: DstRule,
}

impl SystemClock {
    /// Creates a clock `utc_offset_minutes` east of UTC
    pub fn new(utc_offset_minutes: i32, dst: DstRule) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!("UTC offset {utc_offset_minutes} minutes is out of range"))
        })?;
        Ok(Self { offset, dst })
    }

    /// Local timestamp for a given absolute time
    pub fn local_at(&self, utc: DateTime<Utc>) -> Result<LocalTimestamp> {
        if utc.year() < MIN_SYNCED_YEAR {
            return Err(Error::ClockUnavailable(format!(
                "system time {} predates {}; clock not synchronised",
                utc, MIN_SYNCED_YEAR
            )));
        }

        let standard = utc.with_timezone(&self.offset).naive_local();
        let local = if self.dst.in_effect(utc.naive_utc(), standard) {
            trace!("Daylight saving in effect ({:?})", self.dst);
            standard + ChronoDuration::hours(1)
        } else {
            standard
        };
        Ok(LocalTimestamp::from_naive(local))
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<LocalTimestamp> {
        self.local_at(Utc::now())
    }
}

/// Clock that reports whatever it was last set to
#[derive(Debug, Default)]
pub struct StaticClock {
    current: Mutex<Option<LocalTimestamp>>,
}

impl StaticClock {
    pub fn new(ts: LocalTimestamp) -> Self {
        Self {
            current: Mutex::new(Some(ts)),
        }
    }

    /// A clock that fails every read until `set` is called
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set(&self, ts: LocalTimestamp) {
        *self.current.lock() = Some(ts);
    }

    pub fn clear(&self) {
        *self.current.lock() = None;
    }
}

impl Clock for StaticClock {
    fn now(&self) -> Result<LocalTimestamp> {
        let current = *self.current.lock();
        current.ok_or_else(|| Error::ClockUnavailable("static clock not set".into()))
    }
}

/// Time from `ts` until the next cadence boundary.
///
/// Cadences up to an hour align to boundaries within the hour (an hourly
/// cadence lands on the top of the hour); longer cadences count from the top
/// of the current hour.
pub fn next_tick_delay(ts: &LocalTimestamp, cadence: Duration) -> Duration {
    let cadence = cadence.as_secs().max(1);
    let into_hour = ts.minute as u64 * 60 + ts.second as u64;
    let into_period = if cadence <= 3600 {
        into_hour % cadence
    } else {
        into_hour
    };
    let delay = Duration::from_secs(cadence - into_period);
    debug!(
        "Next tick in {}m {}s",
        delay.as_secs() / 60,
        delay.as_secs() % 60
    );
    delay
}
