/*!
 # Calendar data

 Calendar entries and the store that holds them. The primary collection is the
 72 microseasons; the optional `mini` and `macro` bands carry coarser seasons
 (the 24 solar terms, the four seasons) printed alongside.

 Calendar files are JSON:

 ```json
 {
   "seasons": [
     { "number": 1, "en": "Parsley flourishes", "kanji": "芹乃栄",
       "romaji": "Seri sunawachi sakau", "start": "01-05", "end": "01-09" }
   ],
   "mini": [],
   "macro": []
 }
 ```
*/

use parking_lot::RwLock;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{Error, Result};

/// Three-letter month names used on receipts
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A calendar (month, day) pair, ordered month first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthDay {
    pub month: u8,
    pub day: u8,
}

impl MonthDay {
    pub const fn new(month: u8, day: u8) -> Self {
        Self { month, day }
    }

    /// Whether month is in 1-12 and day in 1-31
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month) && (1..=31).contains(&self.day)
    }

    /// Parses the `MM-DD` form used by calendar files.
    ///
    /// Only checks that both fields are numeric; bounds are checked by the
    /// matcher so an out-of-range entry is skipped rather than dropped.
    pub fn parse(s: &str) -> Option<Self> {
        let (month, day) = s.trim().split_once('-')?;
        Some(Self {
            month: month.trim().parse().ok()?,
            day: day.trim().parse().ok()?,
        })
    }

    /// Three-letter month name, or `"???"` for an invalid month
    pub fn month_abbrev(&self) -> &'static str {
        match self.month {
            1..=12 => MONTH_ABBREVIATIONS[self.month as usize - 1],
            _ => "???",
        }
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// One named date range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    /// Entry number, unique within its collection (1..N)
    pub id: u32,
    /// English name
    pub display_name: String,
    /// Name in its native script (kanji)
    pub native_label: String,
    /// Romanised reading
    pub phonetic_label: String,
    /// First day of the range
    pub range_start: MonthDay,
    /// Last day of the range, inclusive
    pub range_end: MonthDay,
}

impl CalendarEntry {
    /// Date range as printed on receipts, e.g. `Jan 5 - Jan 10`
    pub fn range_label(&self) -> String {
        format!(
            "{} {} - {} {}",
            self.range_start.month_abbrev(),
            self.range_start.day,
            self.range_end.month_abbrev(),
            self.range_end.day
        )
    }
}

/// Entry as it appears in the JSON file
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(alias = "number")]
    id: u32,
    #[serde(alias = "en")]
    display_name: String,
    #[serde(alias = "kanji", default)]
    native_label: String,
    #[serde(alias = "romaji", default)]
    phonetic_label: String,
    start: String,
    end: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawCalendar {
    #[serde(default)]
    seasons: Vec<RawEntry>,
    #[serde(default)]
    mini: Vec<RawEntry>,
    #[serde(default, rename = "macro")]
    macro_bands: Vec<RawEntry>,
}

/// All collections loaded from one calendar file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarSet {
    /// Primary microseason collection
    pub micro: Vec<CalendarEntry>,
    /// Optional finer-grained band (solar terms)
    pub mini: Vec<CalendarEntry>,
    /// Optional coarse band (seasons)
    pub macro_bands: Vec<CalendarEntry>,
}

impl CalendarSet {
    /// Parses a calendar from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawCalendar = serde_json::from_str(text)?;
        Ok(Self {
            micro: convert_entries("seasons", raw.seasons),
            mini: convert_entries("mini", raw.mini),
            macro_bands: convert_entries("macro", raw.macro_bands),
        })
    }

    /// Reads and parses a calendar file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::CalendarLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn is_empty(&self) -> bool {
        self.micro.is_empty()
    }
}

fn convert_entries(collection: &str, raw: Vec<RawEntry>) -> Vec<CalendarEntry> {
    raw.into_iter()
        .filter_map(|r| {
            let (Some(range_start), Some(range_end)) =
                (MonthDay::parse(&r.start), MonthDay::parse(&r.end))
            else {
                warn!(
                    "Skipping {} entry {}: range {:?}..{:?} is not numeric",
                    collection, r.id, r.start, r.end
                );
                return None;
            };
            Some(CalendarEntry {
                id: r.id,
                display_name: r.display_name,
                native_label: r.native_label,
                phonetic_label: r.phonetic_label,
                range_start,
                range_end,
            })
        })
        .collect()
}

/// Holds the loaded calendar and reloads it from disk on request.
///
/// A failed load leaves the store empty rather than returning an error, so the
/// scheduler sees "nothing to print" and tries again next tick.
#[derive(Debug)]
pub struct CalendarStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<CalendarSet>>,
}

impl CalendarStore {
    /// Opens a calendar file, falling back to an empty calendar on failure
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            path: Some(path.into()),
            current: RwLock::new(Arc::new(CalendarSet::default())),
        };
        store.reload();
        store
    }

    /// Wraps an in-memory calendar; `reload` is then a no-op
    pub fn from_set(set: CalendarSet) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Re-reads the backing file, replacing the current calendar
    #[instrument(skip(self))]
    pub fn reload(&self) -> Arc<CalendarSet> {
        let Some(path) = &self.path else {
            return self.snapshot();
        };

        let set = match CalendarSet::from_file(path) {
            Ok(set) => {
                debug!(
                    "Loaded {} microseasons, {} mini, {} macro from {}",
                    set.micro.len(),
                    set.mini.len(),
                    set.macro_bands.len(),
                    path.display()
                );
                set
            }
            Err(e) => {
                warn!("Failed to load calendar, treating as empty: {}", e);
                CalendarSet::default()
            }
        };

        let set = Arc::new(set);
        *self.current.write() = Arc::clone(&set);
        set
    }

    /// The calendar as last loaded
    pub fn snapshot(&self) -> Arc<CalendarSet> {
        Arc::clone(&*self.current.read())
    }

    /// Logs every primary entry, one per line
    pub fn log_entries(&self) {
        let set = self.snapshot();
        info!("{} microseasons loaded", set.micro.len());
        for line in list_lines(&set.micro) {
            info!("{}", line);
        }
    }
}

/// One listing line per entry: `NN: name (phonetic) -> MM-DD to MM-DD`
pub fn list_lines(entries: &[CalendarEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| {
            format!(
                "{:02}: {} ({}) -> {} to {}",
                e.id,
                e.display_name,
                strip_accents(&e.phonetic_label),
                e.range_start,
                e.range_end
            )
        })
        .collect()
}

/// Replaces accented Latin vowels (macrons included) with their plain form
pub fn strip_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => 'a',
            'è' | 'é' | 'ê' | 'ë' | 'ē' => 'e',
            'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' => 'o',
            'ù' | 'ú' | 'û' | 'ü' | 'ū' => 'u',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "seasons": [
            { "number": 1, "en": "Parsley flourishes", "kanji": "芹乃栄",
              "romaji": "Seri sunawachi sakau", "start": "01-05", "end": "01-09" },
            { "number": 2, "en": "Bad", "kanji": "", "romaji": "",
              "start": "xx-01", "end": "01-14" },
            { "number": 72, "en": "Snow", "kanji": "雪", "romaji": "Yuki",
              "start": "12-31", "end": "01-04" }
        ],
        "macro": [
            { "id": 1, "display_name": "Winter", "native_label": "冬",
              "phonetic_label": "Fuyu", "start": "11-07", "end": "02-03" }
        ]
    }"#;

    #[test]
    fn test_parse_month_day() {
        assert_eq!(MonthDay::parse("01-05"), Some(MonthDay::new(1, 5)));
        assert_eq!(MonthDay::parse("13-40"), Some(MonthDay::new(13, 40)));
        assert_eq!(MonthDay::parse("ab-01"), None);
        assert_eq!(MonthDay::parse("0105"), None);
        assert!(!MonthDay::new(13, 40).is_valid());
    }

    #[test]
    fn test_from_json_skips_non_numeric_ranges() {
        let set = CalendarSet::from_json(SAMPLE).unwrap();
        assert_eq!(set.micro.len(), 2);
        assert_eq!(set.micro[0].native_label, "芹乃栄");
        assert_eq!(set.micro[1].id, 72);
        assert!(set.mini.is_empty());
        assert_eq!(set.macro_bands[0].display_name, "Winter");
    }

    #[test]
    fn test_range_label() {
        let set = CalendarSet::from_json(SAMPLE).unwrap();
        assert_eq!(set.micro[0].range_label(), "Jan 5 - Jan 9");
        assert_eq!(set.micro[1].range_label(), "Dec 31 - Jan 4");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let store = CalendarStore::open("/nonexistent/microseasons.json");
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("microseasons.json");
        std::fs::write(&path, "not json").unwrap();

        let store = CalendarStore::open(&path);
        assert!(store.snapshot().is_empty());

        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(store.reload().micro.len(), 2);
        assert_eq!(store.snapshot().micro.len(), 2);
    }

    #[test]
    fn test_list_lines_strip_accents() {
        let entry = CalendarEntry {
            id: 3,
            display_name: "Lesser cold".into(),
            native_label: "小寒".into(),
            phonetic_label: "Shōkan".into(),
            range_start: MonthDay::new(1, 5),
            range_end: MonthDay::new(1, 19),
        };
        assert_eq!(
            list_lines(&[entry]),
            vec!["03: Lesser cold (Shokan) -> 01-05 to 01-19".to_string()]
        );
    }
}
