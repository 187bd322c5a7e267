use chrono::Utc;
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, SettingsField, Tab};
use crate::model::VideoRecord;
use crate::page::Node;
use crate::scanner::ControlState;
use crate::viewer::{Partition, format_relative};

const ACCENT: Color = Color::Rgb(0, 123, 255);
const SUCCESS: Color = Color::Rgb(40, 167, 69);
const ERROR: Color = Color::Rgb(220, 53, 69);
const MUTED: Color = Color::Rgb(108, 117, 125);

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

fn bordered(title: String, focused: bool) -> Block<'static> {
  Block::bordered()
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(if focused { ACCENT } else { MUTED }))
    .title(title)
}

/// A centered rect of `width` x `height` inside `area`.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect { x: area.x + (area.width - width) / 2, y: area.y + (area.height - height) / 2, width, height }
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let [header_area, main_area, status_area, footer_area] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1), Constraint::Length(1)])
      .areas(frame.area());

  render_header(frame, app, header_area);
  match app.tab {
    Tab::Page => render_page(frame, app, main_area),
    Tab::Playlist => render_playlist(frame, app, main_area),
    Tab::Settings => render_settings(frame, app, main_area),
  }
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);

  if app.confirm.is_some() {
    render_confirm(frame, app, frame.area());
  }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let mut spans = vec![Span::styled(" ▶ ytlater ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))];
  for (i, tab) in Tab::ALL.iter().enumerate() {
    let style = if *tab == app.tab {
      Style::default().fg(Color::White).bg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
      Style::default().fg(MUTED)
    };
    spans.push(Span::raw(" "));
    spans.push(Span::styled(format!(" {} {} ", i + 1, tab.label()), style));
  }
  frame.render_widget(Line::from(spans), area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(MUTED)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn control_style(state: ControlState) -> Style {
  let bg = match state {
    ControlState::NotInPlaylist => ACCENT,
    ControlState::InPlaylist => SUCCESS,
    ControlState::AlreadyWatched | ControlState::Adding => MUTED,
    ControlState::Error { .. } => ERROR,
  };
  Style::default().fg(Color::White).bg(bg).add_modifier(Modifier::BOLD)
}

fn render_page(frame: &mut Frame, app: &mut App, area: Rect) {
  let title = match app.page_path {
    Some(ref path) => format!(" {} ", path.display()),
    None => " no page file ".to_string(),
  };
  let block = bordered(title, true);

  if app.page.anchors().next().is_none() {
    let hint = if app.page_path.is_some() {
      "Waiting for links on the page…"
    } else {
      "Start with `ytlater <page.html>` to collect links from a messaging page."
    };
    let paragraph = Paragraph::new(vec![Line::from(""), Line::from(Span::styled(hint, Style::default().fg(MUTED)))])
      .alignment(Alignment::Center)
      .block(block);
    frame.render_widget(paragraph, area);
    return;
  }

  let width = area.width.saturating_sub(4) as usize;
  let mut items = Vec::new();
  let mut control_idx = 0;
  let mut selected_row = None;
  for node in app.page.nodes() {
    match node {
      Node::Anchor(anchor) => {
        let text = if anchor.text.is_empty() { anchor.href.clone() } else { format!("{}  {}", anchor.text, anchor.href) };
        items.push(ListItem::new(Line::from(Span::raw(truncate_str(&text, width)))));
      }
      Node::Control(control) => {
        if control_idx == app.selected_control {
          selected_row = Some(items.len());
        }
        control_idx += 1;
        items.push(ListItem::new(Line::from(vec![
          Span::raw("   "),
          Span::styled(format!(" {} ", control.label()), control_style(control.state)),
        ])));
      }
    }
  }

  let mut state = ListState::default();
  state.select(selected_row);
  let list = List::new(items).block(block).highlight_symbol("› ").highlight_style(Style::default().fg(ACCENT));
  frame.render_stateful_widget(list, area, &mut state);
}

fn video_item(video: &VideoRecord, width: usize) -> ListItem<'static> {
  let now = Utc::now();
  let mut dates = format!("Added: {}", format_relative(video.added_at, now));
  if let Some(seen_at) = video.seen_at {
    dates.push_str(&format!("  Seen: {}", format_relative(seen_at, now)));
  }
  ListItem::new(vec![
    Line::from(Span::styled(truncate_str(&video.title, width), Style::default().add_modifier(Modifier::BOLD))),
    Line::from(vec![
      Span::styled(truncate_str(&video.channel, width / 2), Style::default().fg(MUTED)),
      Span::raw("  "),
      Span::styled(dates, Style::default().fg(MUTED)),
    ]),
  ])
}

fn render_partition(frame: &mut Frame, app: &App, partition: Partition, area: Rect) {
  let focused = app.viewer.focus == partition;
  let view = app.viewer.page(partition);
  let count = app.viewer.count(partition);
  let block = bordered(format!(" {} {} ", count, partition.label()), focused);

  let [list_area, pager_area] = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(block.inner(area));
  frame.render_widget(block, area);

  if view.items.is_empty() {
    let (headline, hint) = partition.empty_message();
    let paragraph = Paragraph::new(vec![
      Line::from(Span::raw(headline)),
      Line::from(Span::styled(hint, Style::default().fg(MUTED))),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(paragraph, list_area);
    return;
  }

  let width = list_area.width.saturating_sub(3) as usize;
  let items: Vec<ListItem> = view.items.iter().map(|v| video_item(v, width)).collect();
  let mut state = ListState::default();
  if focused {
    state.select(Some(app.viewer.selected));
  }
  let list = List::new(items).highlight_symbol("› ").highlight_style(Style::default().fg(ACCENT));
  frame.render_stateful_widget(list, list_area, &mut state);

  if view.total_pages > 1 {
    let enabled = |on: bool| if on { Style::default().fg(ACCENT) } else { Style::default().fg(MUTED) };
    let pager = Line::from(vec![
      Span::styled("← Previous", enabled(view.has_prev)),
      Span::raw(format!("   Page {} of {}   ", view.page, view.total_pages)),
      Span::styled("Next →", enabled(view.has_next)),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(pager, pager_area);
  }
}

fn render_playlist(frame: &mut Frame, app: &mut App, area: Rect) {
  let [unseen_area, seen_area] =
    Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);
  render_partition(frame, app, Partition::Unseen, unseen_area);
  render_partition(frame, app, Partition::Seen, seen_area);
}

fn render_field(frame: &mut Frame, label: &str, text: &str, cursor: usize, focused: bool, area: Rect) {
  let block = bordered(format!(" {} ", label), focused);
  let inner = block.inner(area);
  frame.render_widget(Paragraph::new(text.to_string()).block(block), area);
  if focused {
    let x = inner.x + display_width(text, cursor).min(inner.width.saturating_sub(1) as usize) as u16;
    frame.set_cursor_position((x, inner.y));
  }
}

fn render_settings(frame: &mut Frame, app: &mut App, area: Rect) {
  let [size_area, file_area, status_area, help_area] =
    Layout::vertical([Constraint::Length(3), Constraint::Length(3), Constraint::Length(2), Constraint::Min(1)])
      .areas(area);

  let size_focused = app.settings_field == SettingsField::PageSize && app.confirm.is_none();
  let file_focused = app.settings_field == SettingsField::FilePath && app.confirm.is_none();
  let size_label = format!("Videos per page (1-50, showing {})", app.viewer.page_size());
  render_field(frame, &size_label, &app.settings.input, app.settings.cursor, size_focused, size_area);
  render_field(frame, "Import / export file", &app.file_input, app.file_cursor, file_focused, file_area);

  if let Some((ref status, _)) = app.settings_status {
    let color = if status.is_error() { ERROR } else { SUCCESS };
    let line = Paragraph::new(Line::from(Span::styled(format!(" {}", status.message()), Style::default().fg(color))))
      .wrap(Wrap { trim: true });
    frame.render_widget(line, status_area);
  }

  let help = vec![
    Line::from(Span::styled(" Enter  save page size / import file", Style::default().fg(MUTED))),
    Line::from(Span::styled(" ^E     export (empty path: download directory)", Style::default().fg(MUTED))),
    Line::from(Span::styled(" ^O     import and merge", Style::default().fg(MUTED))),
    Line::from(Span::styled(" ^X     clear playlist", Style::default().fg(MUTED))),
  ];
  frame.render_widget(Paragraph::new(help), help_area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  if let Some(ref n) = app.notification {
    let (icon, color) = if n.is_error { ("✗", ERROR) } else { ("✓", SUCCESS) };
    frame.render_widget(
      Line::from(Span::styled(format!(" {} {}", icon, n.message), Style::default().fg(color))),
      area,
    );
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let hints = match app.tab {
    Tab::Page => " ↑↓ select  Enter add  ⇧Tab/1-3 tabs  q quit",
    Tab::Playlist => " ↑↓ select  Enter open  s seen/unseen  d remove  ←→ page  Tab pane  q quit",
    Tab::Settings => " Tab field  Enter save  ^E export  ^O import  ^X clear  Esc back",
  };
  frame.render_widget(Line::from(Span::styled(hints, Style::default().fg(MUTED))), area);
}

fn render_confirm(frame: &mut Frame, app: &App, area: Rect) {
  let Some(ref confirm) = app.confirm else { return };
  let popup = centered(area, 60, 8);
  frame.render_widget(Clear, popup);
  let text = vec![
    Line::from(Span::raw(confirm.message.clone())),
    Line::from(""),
    Line::from(vec![
      Span::styled(" Esc Cancel ", Style::default().fg(Color::White).bg(MUTED)),
      Span::raw("  "),
      Span::styled(format!(" Enter {} ", confirm.confirm_label), Style::default().fg(Color::White).bg(ACCENT)),
    ])
    .alignment(Alignment::Right),
  ];
  let paragraph =
    Paragraph::new(text).wrap(Wrap { trim: true }).block(bordered(format!(" {} ", confirm.title), true));
  frame.render_widget(paragraph, popup);
}
