use crate::color::Hsla;
use crate::protocol::{LineKind, LogLine};
use chrono::{DateTime, Local, TimeZone};
use std::cmp::min;
use std::str::FromStr;

/// Probe rendered once to measure the width of one monospace character.
pub const WIDTH_PROBE: &str = "aaaaaaaaaa";
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";
const NBSP: char = '\u{a0}';

pub trait GlyphMeasure {
    /// Width of `text` on one unwrapped line, in the same unit as the
    /// available width passed to the caret functions.
    fn text_width(&self, text: &str) -> f32;
}

/// Where a rendered line's timestamp comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampSource {
    /// Time the line is drawn. Lines replayed from stored pages show redraw time.
    #[default]
    Render,
    /// Time the server recorded the line, falling back to draw time.
    Origin,
}

impl FromStr for TimestampSource {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "render" => Ok(TimestampSource::Render),
            "origin" => Ok(TimestampSource::Origin),
            other => Err(format!("Unknown timestamp source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleOp {
    Append(LogLine),
    /// Full redraw from a rebuilt transcript.
    Replace(Vec<LogLine>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySegment {
    Text(String),
    LineBreak,
}

/// Spaces become non-breaking spaces and newlines explicit breaks, so the
/// renderer never collapses whitespace.
pub fn escape_body(text: &str) -> Vec<BodySegment> {
    let mut segments = Vec::new();
    for (idx, part) in text.split('\n').enumerate() {
        if idx > 0 {
            segments.push(BodySegment::LineBreak);
        }
        if !part.is_empty() {
            segments.push(BodySegment::Text(part.replace(' ', &NBSP.to_string())));
        }
    }
    segments
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLine {
    pub timestamp: String,
    pub kind: LineKind,
    pub color: Option<Hsla>,
    pub body: Vec<BodySegment>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaretGeometry {
    pub column: usize,
    pub row: usize,
    /// Horizontal offset in measure units.
    pub left: f32,
    /// Vertical offset in line-height units.
    pub top_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightSegment {
    pub row: usize,
    pub start_column: usize,
    /// Exclusive.
    pub end_column: usize,
    pub left: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOverlay {
    Caret(CaretGeometry),
    Highlight(Vec<HighlightSegment>),
}

/// Characters that fit on one wrapped row. A non-positive character width
/// disables wrapping.
pub fn max_chars(available_width: f32, char_width: f32) -> usize {
    if !(char_width > 0.0) || !char_width.is_finite() {
        return usize::MAX;
    }
    let fit = (available_width / char_width).floor();
    if !(fit >= 1.0) {
        return 1;
    }
    fit as usize
}

pub fn caret_geometry(index: usize, max_chars: usize, char_width: f32) -> CaretGeometry {
    let max_chars = max_chars.max(1);
    let column = index % max_chars;
    let row = index / max_chars;
    CaretGeometry {
        column,
        row,
        left: column as f32 * char_width,
        top_rows: row,
    }
}

/// One segment per wrapped row covering `[start, end)`.
pub fn highlight_segments(
    start: usize,
    end: usize,
    max_chars: usize,
    char_width: f32,
) -> Vec<HighlightSegment> {
    if end <= start {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    let first_row = start / max_chars;
    let last_row = (end - 1) / max_chars;
    (first_row..=last_row)
        .map(|row| {
            let row_start = row.saturating_mul(max_chars);
            let row_end = row_start.saturating_add(max_chars);
            let start_column = start.max(row_start) - row_start;
            let end_column = end.min(row_end) - row_start;
            HighlightSegment {
                row,
                start_column,
                end_column,
                left: start_column as f32 * char_width,
                width: (end_column - start_column) as f32 * char_width,
            }
        })
        .collect()
}

/// Terminal-like console: an append-only view of rendered lines plus a
/// single-line input buffer with a selection.
#[derive(Debug, Clone)]
pub struct ConsoleInput {
    lines: Vec<RenderedLine>,
    buffer: String,
    anchor: usize,
    cursor: usize,
    focused: bool,
    read_only: bool,
    char_width: Option<f32>,
    timestamps: TimestampSource,
}

impl Default for ConsoleInput {
    fn default() -> Self {
        Self::new(TimestampSource::default())
    }
}

impl ConsoleInput {
    pub fn new(timestamps: TimestampSource) -> Self {
        Self {
            lines: Vec::new(),
            buffer: String::new(),
            anchor: 0,
            cursor: 0,
            focused: false,
            read_only: true,
            char_width: None,
            timestamps,
        }
    }

    /// Measures the reference character width. Lines pushed before this are
    /// not displayed.
    pub fn init(&mut self, measure: &dyn GlyphMeasure) {
        let probe_len = WIDTH_PROBE.chars().count() as f32;
        self.char_width = Some(measure.text_width(WIDTH_PROBE) / probe_len);
    }

    pub fn is_initialized(&self) -> bool {
        self.char_width.is_some()
    }

    pub fn char_width(&self) -> Option<f32> {
        self.char_width
    }

    pub fn lines(&self) -> &[RenderedLine] {
        &self.lines
    }

    pub fn push_line(&mut self, line: &LogLine, now: DateTime<Local>) {
        if !self.is_initialized() {
            return;
        }
        let rendered = self.render(line, now);
        self.lines.push(rendered);
    }

    pub fn replace_lines(&mut self, lines: &[LogLine], now: DateTime<Local>) {
        self.lines.clear();
        for line in lines {
            self.push_line(line, now);
        }
    }

    pub fn apply(&mut self, op: &ConsoleOp, now: DateTime<Local>) {
        match op {
            ConsoleOp::Append(line) => self.push_line(line, now),
            ConsoleOp::Replace(lines) => self.replace_lines(lines, now),
        }
    }

    fn render(&self, line: &LogLine, now: DateTime<Local>) -> RenderedLine {
        let stamp = match self.timestamps {
            TimestampSource::Render => now,
            TimestampSource::Origin => line
                .timestamp
                .and_then(|secs| Local.timestamp_opt(secs, 0).single())
                .unwrap_or(now),
        };
        RenderedLine {
            timestamp: stamp.format(TIMESTAMP_FORMAT).to_string(),
            kind: line.kind,
            color: line.color,
            body: escape_body(&line.text),
        }
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        self.read_only = mode == InputMode::ReadOnly;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    /// The caret is only drawn while the input has focus.
    pub fn caret_visible(&self) -> bool {
        self.focused
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Ordered `(start, end)` character offsets of the selection.
    pub fn selection(&self) -> (usize, usize) {
        (self.anchor.min(self.cursor), self.anchor.max(self.cursor))
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        let len = self.len_chars();
        self.anchor = min(start, len);
        self.cursor = min(end, len);
    }

    pub fn select_all(&mut self) {
        self.anchor = 0;
        self.cursor = self.len_chars();
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut buffer = [0u8; 4];
        self.insert_str(ch.encode_utf8(&mut buffer));
    }

    /// Inserts at the caret, replacing any selection. Line breaks are
    /// flattened to spaces because the buffer is a single line.
    pub fn insert_str(&mut self, text: &str) {
        if self.read_only {
            return;
        }
        let normalized = text.replace("\r\n", " ").replace(['\r', '\n'], " ");
        if normalized.is_empty() {
            return;
        }
        self.delete_selection();
        let byte_index = char_to_byte_index(&self.buffer, self.cursor);
        self.buffer.insert_str(byte_index, &normalized);
        self.cursor += normalized.chars().count();
        self.anchor = self.cursor;
    }

    pub fn backspace(&mut self) {
        if self.read_only || self.delete_selection() || self.cursor == 0 {
            return;
        }
        let byte_index = char_to_byte_index(&self.buffer, self.cursor - 1);
        self.buffer.remove(byte_index);
        self.cursor -= 1;
        self.anchor = self.cursor;
    }

    pub fn delete_forward(&mut self) {
        if self.read_only || self.delete_selection() || self.cursor >= self.len_chars() {
            return;
        }
        let byte_index = char_to_byte_index(&self.buffer, self.cursor);
        self.buffer.remove(byte_index);
    }

    pub fn move_left(&mut self, extend: bool) {
        let (start, _) = self.selection();
        let target = if !extend && self.has_selection() {
            start
        } else {
            self.cursor.saturating_sub(1)
        };
        self.move_to(target, extend);
    }

    pub fn move_right(&mut self, extend: bool) {
        let (_, end) = self.selection();
        let target = if !extend && self.has_selection() {
            end
        } else {
            min(self.cursor + 1, self.len_chars())
        };
        self.move_to(target, extend);
    }

    pub fn move_home(&mut self, extend: bool) {
        self.move_to(0, extend);
    }

    pub fn move_end(&mut self, extend: bool) {
        self.move_to(self.len_chars(), extend);
    }

    /// Renders the buffer as an `in` line, clears it and returns the text for
    /// forwarding. Refused while read-only.
    pub fn submit(&mut self, now: DateTime<Local>, color: Option<Hsla>) -> Option<String> {
        if self.read_only {
            return None;
        }
        let text = std::mem::take(&mut self.buffer);
        self.anchor = 0;
        self.cursor = 0;
        self.push_line(&LogLine::new(text.clone(), LineKind::In, color), now);
        Some(text)
    }

    /// Caret or highlight placement for the current selection, wrapped to
    /// `available_width`. `None` until the console is initialised. Every
    /// character is taken to advance by the probed `char_width`.
    pub fn overlay(&self, available_width: f32) -> Option<SelectionOverlay> {
        let char_width = self.char_width?;
        let per_row = max_chars(available_width, char_width);
        let (start, end) = self.selection();
        if end - start <= 1 {
            return Some(SelectionOverlay::Caret(caret_geometry(
                start, per_row, char_width,
            )));
        }
        Some(SelectionOverlay::Highlight(highlight_segments(
            start, end, per_row, char_width,
        )))
    }

    fn has_selection(&self) -> bool {
        self.anchor != self.cursor
    }

    fn move_to(&mut self, target: usize, extend: bool) {
        self.cursor = min(target, self.len_chars());
        if !extend {
            self.anchor = self.cursor;
        }
    }

    fn delete_selection(&mut self) -> bool {
        if !self.has_selection() {
            return false;
        }
        let (start, end) = self.selection();
        let start_byte = char_to_byte_index(&self.buffer, start);
        let end_byte = char_to_byte_index(&self.buffer, end);
        self.buffer.replace_range(start_byte..end_byte, "");
        self.anchor = start;
        self.cursor = start;
        true
    }

    fn len_chars(&self) -> usize {
        self.buffer.chars().count()
    }
}

fn char_to_byte_index(text: &str, char_index: usize) -> usize {
    if char_index == 0 {
        return 0;
    }
    match text.char_indices().nth(char_index) {
        Some((idx, _)) => idx,
        None => text.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::color_of;

    struct FixedWidth(f32);

    impl GlyphMeasure for FixedWidth {
        fn text_width(&self, text: &str) -> f32 {
            text.chars().count() as f32 * self.0
        }
    }

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 3, 14, hour, minute, second)
            .single()
            .expect("valid local time")
    }

    fn ready_console() -> ConsoleInput {
        let mut console = ConsoleInput::default();
        console.init(&FixedWidth(8.0));
        console.set_mode(InputMode::ReadWrite);
        console
    }

    fn type_text(console: &mut ConsoleInput, text: &str) {
        for ch in text.chars() {
            console.insert_char(ch);
        }
    }

    #[test]
    fn init_measures_char_width_from_probe() {
        let console = ready_console();
        assert_eq!(console.char_width(), Some(8.0));
    }

    #[test]
    fn escape_keeps_spaces_and_breaks() {
        assert_eq!(
            escape_body("a  b\nc"),
            vec![
                BodySegment::Text("a\u{a0}\u{a0}b".to_string()),
                BodySegment::LineBreak,
                BodySegment::Text("c".to_string()),
            ]
        );
        assert_eq!(
            escape_body("\n"),
            vec![BodySegment::LineBreak]
        );
        assert!(escape_body("").is_empty());
    }

    #[test]
    fn submit_echoes_in_line_and_clears_buffer() {
        let mut console = ready_console();
        type_text(&mut console, "help");
        let color = Some(color_of(10));

        let sent = console.submit(at(9, 5, 7), color);

        assert_eq!(sent.as_deref(), Some("help"));
        assert_eq!(console.buffer(), "");
        assert_eq!(console.selection(), (0, 0));
        assert_eq!(
            console.lines(),
            &[RenderedLine {
                timestamp: "09:05:07".to_string(),
                kind: LineKind::In,
                color,
                body: vec![BodySegment::Text("help".to_string())],
            }]
        );
    }

    #[test]
    fn read_only_refuses_edits_and_submit() {
        let mut console = ready_console();
        type_text(&mut console, "ab");
        console.set_mode(InputMode::ReadOnly);
        console.insert_char('c');
        console.backspace();
        assert_eq!(console.buffer(), "ab");
        assert_eq!(console.submit(at(1, 0, 0), None), None);
        assert!(console.lines().is_empty());
    }

    #[test]
    fn lines_before_init_are_dropped() {
        let mut console = ConsoleInput::default();
        console.push_line(&LogLine::meta("early"), at(1, 2, 3));
        assert!(console.lines().is_empty());
    }

    #[test]
    fn render_timestamps_use_draw_time() {
        let mut console = ready_console();
        let mut line = LogLine::new("old", LineKind::Out, None);
        line.timestamp = Some(0);
        console.push_line(&line, at(12, 30, 0));
        assert_eq!(console.lines()[0].timestamp, "12:30:00");
    }

    #[test]
    fn origin_timestamps_prefer_recorded_time() {
        let mut console = ConsoleInput::new(TimestampSource::Origin);
        console.init(&FixedWidth(1.0));
        let recorded = at(8, 15, 45);
        let mut line = LogLine::new("old", LineKind::Out, None);
        line.timestamp = Some(recorded.timestamp());
        console.push_line(&line, at(12, 30, 0));
        console.push_line(&LogLine::meta("fresh"), at(12, 30, 1));

        assert_eq!(console.lines()[0].timestamp, "08:15:45");
        assert_eq!(console.lines()[1].timestamp, "12:30:01");
    }

    #[test]
    fn replace_redraws_everything() {
        let mut console = ready_console();
        console.push_line(&LogLine::meta("stale"), at(1, 0, 0));
        console.apply(
            &ConsoleOp::Replace(vec![
                LogLine::new("a", LineKind::In, None),
                LogLine::new("b", LineKind::Out, None),
            ]),
            at(2, 0, 0),
        );
        let kinds: Vec<LineKind> = console.lines().iter().map(|line| line.kind).collect();
        assert_eq!(kinds, vec![LineKind::In, LineKind::Out]);
    }

    #[test]
    fn caret_wraps_by_max_chars() {
        assert_eq!(max_chars(85.0, 8.0), 10);
        let caret = caret_geometry(23, 10, 8.0);
        assert_eq!(caret.column, 3);
        assert_eq!(caret.row, 2);
        assert_eq!(caret.left, 24.0);
        assert_eq!(caret.top_rows, 2);
    }

    #[test]
    fn degenerate_widths_stay_total() {
        assert_eq!(max_chars(3.0, 8.0), 1);
        assert_eq!(max_chars(0.0, 8.0), 1);
        assert_eq!(max_chars(80.0, 0.0), usize::MAX);
        let caret = caret_geometry(7, usize::MAX, 0.0);
        assert_eq!((caret.column, caret.row), (7, 0));
    }

    #[test]
    fn single_character_selection_still_shows_caret() {
        let mut console = ready_console();
        type_text(&mut console, "abcdefghijkl");
        console.set_selection(11, 12);
        let overlay = console.overlay(80.0).expect("initialised");
        assert_eq!(
            overlay,
            SelectionOverlay::Caret(CaretGeometry {
                column: 1,
                row: 1,
                left: 8.0,
                top_rows: 1,
            })
        );
    }

    #[test]
    fn multi_character_selection_highlights_each_row() {
        let mut console = ready_console();
        type_text(&mut console, &"x".repeat(25));
        console.set_selection(7, 23);
        let Some(SelectionOverlay::Highlight(segments)) = console.overlay(80.0) else {
            panic!("expected highlight");
        };
        let spans: Vec<(usize, usize, usize)> = segments
            .iter()
            .map(|segment| (segment.row, segment.start_column, segment.end_column))
            .collect();
        assert_eq!(spans, vec![(0, 7, 10), (1, 0, 10), (2, 0, 3)]);
        assert_eq!(segments[0].left, 56.0);
        assert_eq!(segments[0].width, 24.0);
    }

    #[test]
    fn editing_replaces_selection_and_handles_unicode() {
        let mut console = ready_console();
        type_text(&mut console, "say héllo");
        console.move_home(false);
        console.move_right(false);
        console.move_right(false);
        console.move_right(false);
        console.move_right(true);
        console.move_end(true);
        assert_eq!(console.selection(), (3, 9));
        console.insert_str(" hi\nthere");
        assert_eq!(console.buffer(), "say hi there");

        console.move_left(false);
        console.backspace();
        assert_eq!(console.buffer(), "say hi thee");
        console.move_home(false);
        console.delete_forward();
        assert_eq!(console.buffer(), "ay hi thee");
    }

    #[test]
    fn collapsing_selection_with_arrows() {
        let mut console = ready_console();
        type_text(&mut console, "abcdef");
        console.set_selection(1, 4);
        console.move_left(false);
        assert_eq!(console.selection(), (1, 1));
        console.select_all();
        console.move_right(false);
        assert_eq!(console.selection(), (6, 6));
    }

    #[test]
    fn focus_controls_caret_visibility() {
        let mut console = ready_console();
        assert!(!console.caret_visible());
        console.focus();
        assert!(console.caret_visible());
        console.blur();
        assert!(!console.caret_visible());
    }
}
