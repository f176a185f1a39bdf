/*!
 # Receipt layout

 Turns a calendar entry into the ordered list of printer primitives that make
 up one receipt. Rendering is pure; the render worker executes the result.
*/

use std::str::SplitWhitespace;

use crate::calendar::CalendarEntry;
use crate::printer::{Justify, PrinterCommand, Size};

/// Columns available at normal size
pub const LINE_WIDTH: usize = 32;
/// Columns available at double width
pub const WIDE_LINE_WIDTH: usize = 16;

/// Decorative rule framing each receipt, one style per calendar band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    None,
    Micro,
    Mini,
    Macro,
}

impl Banner {
    /// Full-width rule including the line terminator
    pub fn line(&self) -> Option<String> {
        let pattern = match self {
            Banner::None => return None,
            Banner::Micro => "=",
            Banner::Mini => "_",
            Banner::Macro => "/\\",
        };
        let mut line: String = pattern.chars().cycle().take(LINE_WIDTH).collect();
        line.push('\n');
        Some(line)
    }
}

/// Greedy word wrapper yielding one line at a time.
///
/// Each yielded line ends with `\n`. A word longer than the width gets a line
/// of its own rather than being split.
#[derive(Debug, Clone)]
pub struct WordWrap<'a> {
    words: SplitWhitespace<'a>,
    width: usize,
    pending: Option<&'a str>,
}

impl<'a> WordWrap<'a> {
    pub fn new(text: &'a str, width: usize) -> Self {
        Self {
            words: text.split_whitespace(),
            width,
            pending: None,
        }
    }
}

impl Iterator for WordWrap<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let first = self.pending.take().or_else(|| self.words.next())?;
        let mut line = first.to_string();
        let mut len = first.chars().count();

        for word in self.words.by_ref() {
            let word_len = word.chars().count();
            if len + 1 + word_len <= self.width {
                line.push(' ');
                line.push_str(word);
                len += 1 + word_len;
            } else {
                self.pending = Some(word);
                break;
            }
        }

        line.push('\n');
        Some(line)
    }
}

/// Renders one entry as a complete receipt
pub fn render(entry: &CalendarEntry, banner: Banner) -> Vec<PrinterCommand> {
    let mut commands = vec![PrinterCommand::Justify(Justify::Center)];
    let rule = banner.line();

    if let Some(rule) = &rule {
        commands.push(PrinterCommand::Text(rule.clone()));
    }

    commands.push(PrinterCommand::SetSize(Size::DoubleHeightWidth));
    commands.push(PrinterCommand::Bold(true));
    commands.extend(
        WordWrap::new(&entry.display_name, WIDE_LINE_WIDTH).map(PrinterCommand::Text),
    );
    commands.push(PrinterCommand::Bold(false));
    commands.push(PrinterCommand::Feed(1));

    commands.push(PrinterCommand::SetSize(Size::Triple));
    commands.push(PrinterCommand::Text(format!("{}\n", entry.native_label)));
    commands.push(PrinterCommand::SetSize(Size::Normal));
    commands.push(PrinterCommand::Feed(1));

    commands.extend(WordWrap::new(&entry.phonetic_label, LINE_WIDTH).map(PrinterCommand::Text));
    commands.push(PrinterCommand::FeedRows(6));

    commands.push(PrinterCommand::Bold(true));
    commands.push(PrinterCommand::Text(format!("{}\n", entry.range_label())));
    commands.push(PrinterCommand::Bold(false));

    if let Some(rule) = rule {
        commands.push(PrinterCommand::Text(rule));
    }
    commands.push(PrinterCommand::Text("\n".into()));
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::MonthDay;

    fn parsley() -> CalendarEntry {
        CalendarEntry {
            id: 1,
            display_name: "Parsley flourishes".into(),
            native_label: "芹乃栄".into(),
            phonetic_label: "Seri sunawachi sakau".into(),
            range_start: MonthDay::new(1, 5),
            range_end: MonthDay::new(1, 10),
        }
    }

    fn wrap(text: &str, width: usize) -> Vec<String> {
        WordWrap::new(text, width).collect()
    }

    #[test]
    fn test_wrap_splits_at_width() {
        assert_eq!(wrap("Parsley flourishes", 16), ["Parsley\n", "flourishes\n"]);
        assert_eq!(wrap("Parsley flourishes", 32), ["Parsley flourishes\n"]);
    }

    #[test]
    fn test_wrap_exact_fit() {
        // 7 + 1 + 8 = 16
        assert_eq!(wrap("Rotting fireflys", 16), ["Rotting fireflys\n"]);
        assert_eq!(wrap("Fish rise up and ice begins to melt", 16), [
            "Fish rise up and\n",
            "ice begins to\n",
            "melt\n"
        ]);
    }

    #[test]
    fn test_wrap_long_word_and_whitespace() {
        assert_eq!(wrap("  a   supercalifragilistic b ", 8), [
            "a\n",
            "supercalifragilistic\n",
            "b\n"
        ]);
        assert!(wrap("", 16).is_empty());
        assert!(wrap("   ", 16).is_empty());
    }

    #[test]
    fn test_wrap_counts_characters() {
        // 7 characters, 19 bytes
        assert_eq!(wrap("芹乃栄 芹乃栄", 6), ["芹乃栄\n", "芹乃栄\n"]);
        assert_eq!(wrap("Shōkan fuyu", 11), ["Shōkan fuyu\n"]);
    }

    #[test]
    fn test_wrap_is_lazy() {
        let mut lines = WordWrap::new("one two three four", 3);
        assert_eq!(lines.next().as_deref(), Some("one\n"));
        assert_eq!(lines.next().as_deref(), Some("two\n"));
    }

    #[test]
    fn test_banner_lines() {
        assert_eq!(Banner::Micro.line().unwrap(), format!("{}\n", "=".repeat(32)));
        assert_eq!(Banner::Mini.line().unwrap(), format!("{}\n", "_".repeat(32)));
        assert_eq!(Banner::Macro.line().unwrap(), format!("{}\n", "/\\".repeat(16)));
        assert!(Banner::None.line().is_none());
    }

    #[test]
    fn test_render_sequence() {
        let rule = format!("{}\n", "=".repeat(32));
        assert_eq!(
            render(&parsley(), Banner::Micro),
            vec![
                PrinterCommand::Justify(Justify::Center),
                PrinterCommand::Text(rule.clone()),
                PrinterCommand::SetSize(Size::DoubleHeightWidth),
                PrinterCommand::Bold(true),
                PrinterCommand::Text("Parsley\n".into()),
                PrinterCommand::Text("flourishes\n".into()),
                PrinterCommand::Bold(false),
                PrinterCommand::Feed(1),
                PrinterCommand::SetSize(Size::Triple),
                PrinterCommand::Text("芹乃栄\n".into()),
                PrinterCommand::SetSize(Size::Normal),
                PrinterCommand::Feed(1),
                PrinterCommand::Text("Seri sunawachi sakau\n".into()),
                PrinterCommand::FeedRows(6),
                PrinterCommand::Bold(true),
                PrinterCommand::Text("Jan 5 - Jan 10\n".into()),
                PrinterCommand::Bold(false),
                PrinterCommand::Text(rule),
                PrinterCommand::Text("\n".into()),
            ]
        );
    }

    #[test]
    fn test_render_without_banner() {
        let commands = render(&parsley(), Banner::None);
        assert_eq!(commands.len(), 17);
        assert!(!commands
            .iter()
            .any(|c| matches!(c, PrinterCommand::Text(t) if t.starts_with("=="))));
    }
}
