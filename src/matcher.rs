/*!
 # Date-range matching

 Resolves a (month, day) against an ordered collection of calendar entries.
 Ranges whose end precedes their start wrap across New Year.
*/

use tracing::trace;

use crate::calendar::{CalendarEntry, MonthDay};

/// Whether `date` falls inside the inclusive range `start..=end`.
///
/// Returns `None` when either bound is not a valid month/day.
pub fn range_contains(start: MonthDay, end: MonthDay, date: MonthDay) -> Option<bool> {
    if !start.is_valid() || !end.is_valid() {
        return None;
    }
    Some(if start <= end {
        start <= date && date <= end
    } else {
        date >= start || date <= end
    })
}

/// Returns the first entry whose range contains `date`
pub fn resolve(date: MonthDay, entries: &[CalendarEntry]) -> Option<&CalendarEntry> {
    entries.iter().find(|entry| {
        match range_contains(entry.range_start, entry.range_end, date) {
            Some(hit) => hit,
            None => {
                trace!(
                    "Skipping entry {} with malformed range {}..{}",
                    entry.id,
                    entry.range_start,
                    entry.range_end
                );
                false
            }
        }
    })
}

/// Returns the entry with the given id
pub fn resolve_by_id(id: u32, entries: &[CalendarEntry]) -> Option<&CalendarEntry> {
    entries.iter().find(|entry| entry.id == id)
}

/// Highest entry id in the collection, 0 when empty
pub fn max_id(entries: &[CalendarEntry]) -> u32 {
    entries.iter().map(|entry| entry.id).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, start: (u8, u8), end: (u8, u8)) -> CalendarEntry {
        CalendarEntry {
            id,
            display_name: format!("entry {id}"),
            native_label: String::new(),
            phonetic_label: String::new(),
            range_start: MonthDay::new(start.0, start.1),
            range_end: MonthDay::new(end.0, end.1),
        }
    }

    fn md(month: u8, day: u8) -> MonthDay {
        MonthDay::new(month, day)
    }

    #[test]
    fn test_non_wrapping_range() {
        let entries = [entry(1, (1, 5), (1, 10))];
        assert_eq!(resolve(md(1, 5), &entries).map(|e| e.id), Some(1));
        assert_eq!(resolve(md(1, 7), &entries).map(|e| e.id), Some(1));
        assert_eq!(resolve(md(1, 10), &entries).map(|e| e.id), Some(1));
        assert!(resolve(md(1, 4), &entries).is_none());
        assert!(resolve(md(1, 11), &entries).is_none());
        assert!(resolve(md(2, 7), &entries).is_none());
    }

    #[test]
    fn test_non_wrapping_across_months() {
        let entries = [entry(1, (3, 28), (4, 3))];
        assert!(resolve(md(3, 31), &entries).is_some());
        assert!(resolve(md(4, 1), &entries).is_some());
        assert!(resolve(md(4, 4), &entries).is_none());
        assert!(resolve(md(3, 27), &entries).is_none());
    }

    #[test]
    fn test_wrapping_range() {
        let entries = [entry(72, (12, 20), (1, 10))];
        assert!(resolve(md(12, 25), &entries).is_some());
        assert!(resolve(md(12, 20), &entries).is_some());
        assert!(resolve(md(1, 5), &entries).is_some());
        assert!(resolve(md(1, 10), &entries).is_some());
        assert!(resolve(md(6, 15), &entries).is_none());
        assert!(resolve(md(12, 19), &entries).is_none());
        assert!(resolve(md(1, 11), &entries).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let entries = [entry(1, (1, 1), (1, 10)), entry(2, (1, 5), (1, 15))];
        assert_eq!(resolve(md(1, 7), &entries).map(|e| e.id), Some(1));
        assert_eq!(resolve(md(1, 12), &entries).map(|e| e.id), Some(2));
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let entries = [entry(1, (13, 1), (13, 9)), entry(2, (1, 1), (1, 10))];
        assert_eq!(resolve(md(1, 3), &entries).map(|e| e.id), Some(2));

        let entries = [entry(1, (1, 0), (1, 40)), entry(2, (0, 1), (1, 10))];
        assert!(resolve(md(1, 3), &entries).is_none());
    }

    #[test]
    fn test_empty_collection() {
        assert!(resolve(md(1, 1), &[]).is_none());
        assert!(resolve_by_id(1, &[]).is_none());
        assert_eq!(max_id(&[]), 0);
    }

    #[test]
    fn test_resolve_by_id() {
        let entries = [entry(5, (1, 1), (1, 2)), entry(9, (1, 3), (1, 4))];
        assert_eq!(resolve_by_id(9, &entries).map(|e| e.id), Some(9));
        assert!(resolve_by_id(6, &entries).is_none());
        assert_eq!(max_id(&entries), 9);
    }
}
