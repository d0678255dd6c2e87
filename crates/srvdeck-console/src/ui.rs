use crate::app::App;
use crate::theme::{channel_color, deck_theme, tint, DeckTheme};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Tabs},
};
use srvdeck_core::console::{BodySegment, GlyphMeasure, RenderedLine, SelectionOverlay};
use srvdeck_core::protocol::LineKind;
use srvdeck_core::session::ChannelSession;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const STATS_WIDTH: u16 = 34;
const MAX_INPUT_ROWS: usize = 4;

/// Measures text in terminal cells.
pub struct CellMeasure;

impl GlyphMeasure for CellMeasure {
    fn text_width(&self, text: &str) -> f32 {
        UnicodeWidthStr::width(text) as f32
    }
}

pub fn render_ui<C: ChannelSession>(frame: &mut ratatui::Frame, app: &App<C>) {
    let theme = deck_theme();
    let size = frame.size();
    let input_width = size.width.saturating_sub(2) as usize;
    let input_rows = layout_input(app.console.buffer(), input_width)
        .rows
        .len()
        .clamp(1, MAX_INPUT_ROWS);
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(input_rows as u16 + 2),
        ])
        .split(size);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(STATS_WIDTH)])
        .split(layout[1]);

    frame.render_widget(render_tabs(app, theme), layout[0]);
    frame.render_widget(render_console(app, theme, body[0]), body[0]);
    frame.render_widget(render_stats(app, theme), body[1]);
    render_input(frame, app, theme, layout[2]);
}

fn panel(title: &str, theme: DeckTheme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.bg))
        .title(Span::styled(
            title.to_string(),
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_tabs<C: ChannelSession>(app: &App<C>, theme: DeckTheme) -> Tabs<'static> {
    let strip = app.controller.tabs();
    let titles: Vec<Line<'static>> = strip
        .tabs()
        .iter()
        .map(|tab| Line::from(tab.label.clone()))
        .collect();
    let mut tabs = Tabs::new(titles)
        .block(panel("Instances (Tab/Shift-Tab)", theme))
        .style(Style::default().fg(theme.muted))
        .highlight_style(
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        );
    if let Some(active) = strip.active() {
        tabs = tabs.select(active.0);
    }
    tabs
}

fn render_console<C: ChannelSession>(app: &App<C>, theme: DeckTheme, area: Rect) -> Paragraph<'static> {
    let visible = area.height.saturating_sub(2) as usize;
    let lines = app.console.lines();
    let end = lines.len().saturating_sub(app.scroll_back);
    let mut rendered: Vec<Line<'static>> = lines[..end]
        .iter()
        .flat_map(|line| console_line(line, theme))
        .collect();
    if rendered.len() > visible {
        rendered.drain(..rendered.len() - visible);
    }
    let title = match app.controller.registry().selected_instance() {
        Some(instance) => format!("Console: {}", instance.name),
        None => "Console".to_string(),
    };
    Paragraph::new(Text::from(rendered))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(panel(&title, theme))
}

/// One rendered line can span several terminal rows when its body carries
/// explicit breaks; continuation rows are indented under the body.
fn console_line(line: &RenderedLine, theme: DeckTheme) -> Vec<Line<'static>> {
    let mut style = Style::default().fg(theme.text);
    if let Some(color) = line.color {
        style = style.bg(tint(color));
    }
    if line.kind == LineKind::Meta {
        style = style.fg(theme.muted).add_modifier(Modifier::ITALIC);
    }
    let marker = match line.kind {
        LineKind::In => "> ",
        LineKind::Out => "  ",
        LineKind::Meta => "# ",
    };
    let prefix = format!("{} {marker}", line.timestamp);
    let indent = " ".repeat(prefix.width());

    let mut rows = Vec::new();
    let mut current = vec![Span::styled(prefix, Style::default().fg(theme.muted))];
    for segment in &line.body {
        match segment {
            BodySegment::Text(text) => current.push(Span::styled(text.clone(), style)),
            BodySegment::LineBreak => {
                rows.push(Line::from(std::mem::take(&mut current)));
                current.push(Span::raw(indent.clone()));
            }
        }
    }
    rows.push(Line::from(current));
    rows
}

fn render_stats<C: ChannelSession>(app: &App<C>, theme: DeckTheme) -> Paragraph<'static> {
    let stats = app.controller.stats();
    let lines: Vec<Line<'static>> = stats
        .rows()
        .into_iter()
        .enumerate()
        .map(|(idx, (key, value))| {
            let value_color = if idx == 0 {
                channel_color(stats.channel, theme)
            } else {
                theme.text
            };
            Line::from(vec![
                Span::styled(format!("{key}: "), Style::default().fg(theme.muted)),
                Span::styled(value, Style::default().fg(value_color)),
            ])
        })
        .collect();
    Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(panel("Stats", theme))
}

/// The input buffer wrapped by terminal cells. A wide glyph that does not fit
/// the rest of a row moves to the next one.
struct InputLayout {
    /// Each row with the char index of its first character.
    rows: Vec<(usize, String)>,
    /// `(row, column)` of every char index, one past the end included.
    positions: Vec<(usize, usize)>,
}

impl InputLayout {
    fn position(&self, index: usize) -> (usize, usize) {
        self.positions
            .get(index)
            .or(self.positions.last())
            .copied()
            .unwrap_or((0, 0))
    }
}

fn layout_input(buffer: &str, width: usize) -> InputLayout {
    let width = width.max(1);
    let mut rows = vec![(0, String::new())];
    let mut positions = Vec::new();
    let mut column = 0;
    for (index, ch) in buffer.chars().enumerate() {
        let cells = ch.width().unwrap_or(0);
        if column > 0 && column + cells > width {
            rows.push((index, String::new()));
            column = 0;
        }
        positions.push((rows.len() - 1, column));
        if let Some((_, text)) = rows.last_mut() {
            text.push(ch);
        }
        column += cells;
    }
    if column >= width {
        rows.push((positions.len(), String::new()));
        column = 0;
    }
    positions.push((rows.len() - 1, column));
    InputLayout { rows, positions }
}

/// Splits one wrapped row into plain and selected spans.
fn input_line(
    first: usize,
    text: &str,
    selected: Option<(usize, usize)>,
    text_style: Style,
    selected_style: Style,
) -> Line<'static> {
    let Some((start, end)) = selected else {
        return Line::from(Span::styled(text.to_string(), text_style));
    };
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut run = String::new();
    let mut run_selected = false;
    for (offset, ch) in text.chars().enumerate() {
        let index = first + offset;
        let is_selected = index >= start && index < end;
        if is_selected != run_selected && !run.is_empty() {
            let style = if run_selected { selected_style } else { text_style };
            spans.push(Span::styled(std::mem::take(&mut run), style));
        }
        run_selected = is_selected;
        run.push(ch);
    }
    if !run.is_empty() {
        let style = if run_selected { selected_style } else { text_style };
        spans.push(Span::styled(run, style));
    }
    Line::from(spans)
}

fn render_input<C: ChannelSession>(
    frame: &mut ratatui::Frame,
    app: &App<C>,
    theme: DeckTheme,
    area: Rect,
) {
    let inner_width = area.width.saturating_sub(2);
    let visible_rows = area.height.saturating_sub(2) as usize;
    let layout = layout_input(app.console.buffer(), inner_width as usize);
    let overlay = app.console.overlay(f32::from(inner_width));
    let (start, end) = app.console.selection();

    let highlighted = matches!(overlay, Some(SelectionOverlay::Highlight(_)));
    let (caret_row, caret_column) = if highlighted {
        layout.position(end.saturating_sub(1))
    } else {
        layout.position(start)
    };
    let offset = (caret_row + 1).saturating_sub(visible_rows.max(1));

    let text_style = Style::default().fg(theme.text);
    let selected_style = text_style.bg(theme.selection);
    let selected = highlighted.then_some((start, end));
    let lines: Vec<Line<'static>> = layout
        .rows
        .iter()
        .map(|(first, text)| input_line(*first, text, selected, text_style, selected_style))
        .collect();

    let read_only = app.console.is_read_only();
    let title = if read_only {
        "Input (read-only, Ctrl-R reconnects)"
    } else {
        "Input (Enter sends, Ctrl-T new server, Ctrl-L refresh, Esc quits)"
    };
    let paragraph = Paragraph::new(Text::from(lines))
        .style(Style::default().fg(if read_only { theme.muted } else { theme.text }).bg(theme.surface))
        .block(panel(title, theme).style(Style::default().bg(theme.surface)))
        .scroll((offset as u16, 0));
    frame.render_widget(paragraph, area);

    if read_only || !app.console.caret_visible() || highlighted || overlay.is_none() {
        return;
    }
    let x = area.x + 1 + caret_column as u16;
    let y = area.y + 1 + (caret_row - offset) as u16;
    if x < area.x + area.width.saturating_sub(1) && y < area.y + area.height.saturating_sub(1) {
        frame.set_cursor(x, y);
    }
}
