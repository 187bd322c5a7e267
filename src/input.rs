use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, SettingsField, Tab};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Apply an editing key to a single-line text field. Returns false if the key isn't an editing key.
fn edit_field(text: &mut String, cursor: &mut usize, key: event::KeyEvent) -> bool {
  match key.code {
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(text, *cursor);
      text.insert(byte_idx, c);
      *cursor += 1;
    }
    KeyCode::Backspace => {
      if *cursor > 0 {
        *cursor -= 1;
        let byte_idx = char_to_byte_index(text, *cursor);
        text.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if *cursor < text.chars().count() {
        let byte_idx = char_to_byte_index(text, *cursor);
        text.remove(byte_idx);
      }
    }
    KeyCode::Left => *cursor = cursor.saturating_sub(1),
    KeyCode::Right => {
      if *cursor < text.chars().count() {
        *cursor += 1;
      }
    }
    KeyCode::Home => *cursor = 0,
    KeyCode::End => *cursor = text.chars().count(),
    _ => return false,
  }
  true
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  if app.confirm.is_some() {
    handle_confirm_key(app, key);
    return;
  }

  if key.code == KeyCode::BackTab {
    app.next_tab();
    return;
  }

  match app.tab {
    Tab::Page => handle_page_key(app, key),
    Tab::Playlist => handle_playlist_key(app, key),
    Tab::Settings => handle_settings_key(app, key),
  }
}

fn handle_confirm_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => app.resolve_confirm(true),
    KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => app.resolve_confirm(false),
    _ => {}
  }
}

/// Digit shortcuts for tabs, outside of text fields.
fn handle_tab_shortcut(app: &mut App, key: event::KeyEvent) -> bool {
  let tab = match key.code {
    KeyCode::Char('1') => Tab::Page,
    KeyCode::Char('2') => Tab::Playlist,
    KeyCode::Char('3') => Tab::Settings,
    _ => return false,
  };
  app.tab = tab;
  true
}

fn handle_page_key(app: &mut App, key: event::KeyEvent) {
  if handle_tab_shortcut(app, key) {
    return;
  }
  let count = app.page.controls().count();
  match key.code {
    KeyCode::Enter | KeyCode::Char(' ') => app.activate_control(),
    KeyCode::Down | KeyCode::Char('j') => {
      if count > 0 {
        app.selected_control = (app.selected_control + 1) % count;
      }
    }
    KeyCode::Up | KeyCode::Char('k') => {
      if count > 0 {
        app.selected_control = if app.selected_control == 0 { count - 1 } else { app.selected_control - 1 };
      }
    }
    KeyCode::Esc | KeyCode::Char('q') => app.should_quit = true,
    _ => {}
  }
}

fn handle_playlist_key(app: &mut App, key: event::KeyEvent) {
  if handle_tab_shortcut(app, key) {
    return;
  }
  let focus = app.viewer.focus;
  match key.code {
    KeyCode::Enter => app.open_selected(),
    KeyCode::Char('s') => app.toggle_selected(),
    KeyCode::Char('d') | KeyCode::Delete => app.request_remove_selected(),
    KeyCode::Tab => app.viewer.switch_focus(),
    KeyCode::Down | KeyCode::Char('j') => app.viewer.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.viewer.select_prev(),
    KeyCode::Right | KeyCode::Char('l') => {
      app.viewer.next_page(focus);
    }
    KeyCode::Left | KeyCode::Char('h') => {
      app.viewer.prev_page(focus);
    }
    KeyCode::Esc | KeyCode::Char('q') => app.should_quit = true,
    _ => {}
  }
}

fn handle_settings_key(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('e') => app.export_playlist(),
      KeyCode::Char('o') => app.request_import(),
      KeyCode::Char('x') => app.request_clear(),
      KeyCode::Char('r') => app.settings.load(),
      _ => {}
    }
    return;
  }

  match key.code {
    KeyCode::Tab | KeyCode::Up | KeyCode::Down => {
      app.settings_field = match app.settings_field {
        SettingsField::PageSize => SettingsField::FilePath,
        SettingsField::FilePath => SettingsField::PageSize,
      };
    }
    KeyCode::Enter => match app.settings_field {
      SettingsField::PageSize => app.save_settings(),
      SettingsField::FilePath => app.request_import(),
    },
    KeyCode::Esc => app.tab = Tab::Playlist,
    _ => {
      let (text, cursor) = match app.settings_field {
        SettingsField::PageSize => (&mut app.settings.input, &mut app.settings.cursor),
        SettingsField::FilePath => (&mut app.file_input, &mut app.file_cursor),
      };
      edit_field(text, cursor, key);
    }
  }
}
