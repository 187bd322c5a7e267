//! Settings panel: page size editing and bulk playlist operations.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::constants::constants;
use crate::model::Settings;
use crate::store::PlaylistStore;
use crate::transfer::{ImportError, MergeOutcome, export_file_name, export_now, merge_playlists, parse_import};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
  #[error("Please enter a valid number between {min} and {max}")]
  OutOfRange { min: u32, max: u32 },
}

/// Parse a page size the way a lenient form field would: leading whitespace,
/// optional sign, then digits; trailing garbage after the digits is ignored.
pub fn validate_pagination_size(input: &str) -> Result<u32, SettingsError> {
  let c = constants();
  let err = SettingsError::OutOfRange { min: c.min_page_size, max: c.max_page_size };

  let trimmed = input.trim_start();
  let (negative, digits) = match trimmed.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
  };
  let end = digits.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(digits.len());
  if end == 0 || negative {
    return Err(err);
  }
  match digits[..end].parse::<u32>() {
    Ok(n) if (c.min_page_size..=c.max_page_size).contains(&n) => Ok(n),
    _ => Err(err),
  }
}

/// Outcome of a panel action, shown as a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
  Success(String),
  Error(String),
}

impl Status {
  pub fn message(&self) -> &str {
    match self {
      Status::Success(m) | Status::Error(m) => m,
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Status::Error(_))
  }
}

/// A parsed import waiting for the user's confirmation.
#[derive(Debug, Clone)]
pub struct PendingImport {
  pub records: Vec<crate::model::VideoRecord>,
}

impl PendingImport {
  pub fn prompt(&self) -> String {
    format!(
      "This will import {} videos and merge them with your existing playlist. Continue?",
      self.records.len()
    )
  }
}

pub struct SettingsPanel {
  store: PlaylistStore,
  /// Editable page size field.
  pub input: String,
  pub cursor: usize,
}

impl SettingsPanel {
  pub fn new(store: PlaylistStore) -> Self {
    let input = store.get_settings().pagination_size.to_string();
    let cursor = input.chars().count();
    Self { store, input, cursor }
  }

  /// Reload the field from storage.
  pub fn load(&mut self) {
    self.input = self.store.get_settings().pagination_size.to_string();
    self.cursor = self.input.chars().count();
  }

  pub fn save(&self) -> Status {
    let pagination_size = match validate_pagination_size(&self.input) {
      Ok(n) => n,
      Err(e) => return Status::Error(e.to_string()),
    };
    if self.store.save_settings(Settings { pagination_size }) {
      info!(pagination_size, "settings: saved");
      Status::Success("Settings saved successfully!".to_string())
    } else {
      Status::Error("Failed to save settings".to_string())
    }
  }

  /// Write the playlist to `target`, or to a dated file inside it when `target` is a directory.
  pub fn export_to(&self, target: &Path) -> Result<Option<(PathBuf, usize)>> {
    let playlist = self.store.get_playlist();
    if playlist.is_empty() {
      return Ok(None);
    }
    let document = export_now(playlist);
    let path =
      if target.is_dir() { target.join(export_file_name(chrono::Utc::now())) } else { target.to_path_buf() };
    let json = document.to_json().context("Failed to serialize export")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), count = document.total_videos, "settings: playlist exported");
    Ok(Some((path, document.total_videos)))
  }

  pub fn export(&self, target: &Path) -> Status {
    match self.export_to(target) {
      Ok(None) => Status::Error("No videos to export".to_string()),
      Ok(Some((path, count))) => Status::Success(format!("Exported {} videos to {}", count, path.display())),
      Err(e) => {
        warn!(err = %format!("{:#}", e), "settings: export failed");
        Status::Error(format!("Export failed: {:#}", e))
      }
    }
  }

  /// Read and validate an import file. Nothing is written yet.
  pub fn prepare_import(&self, path: &Path) -> Result<PendingImport, Status> {
    let text = std::fs::read_to_string(path).map_err(|e| {
      warn!(path = %path.display(), err = %e, "settings: import file unreadable");
      Status::Error(format!("Failed to import playlist: {}", e))
    })?;
    match parse_import(&text) {
      Ok(records) => Ok(PendingImport { records }),
      Err(e @ ImportError::InvalidFormat) => Err(Status::Error(e.to_string())),
      Err(e) => {
        warn!(path = %path.display(), err = %e, "settings: import file rejected");
        Err(Status::Error(e.to_string()))
      }
    }
  }

  pub fn apply_import(&self, pending: PendingImport) -> Status {
    let existing = self.store.get_playlist();
    let (merged, MergeOutcome { added, skipped }) = merge_playlists(&existing, pending.records);
    match self.store.replace_playlist(&merged) {
      Ok(()) => {
        info!(added, skipped, "settings: playlist imported");
        Status::Success(format!("Imported {} new videos ({} duplicates skipped)", added, skipped))
      }
      Err(e) => Status::Error(format!("Failed to import playlist: {:#}", e)),
    }
  }

  /// Prompt for clearing, or the status to show when there is nothing to clear.
  pub fn prepare_clear(&self) -> Result<String, Status> {
    let count = self.store.get_playlist().len();
    if count == 0 {
      return Err(Status::Error("Playlist is already empty".to_string()));
    }
    Ok(format!("Are you sure you want to delete all {} videos from your playlist? This cannot be undone!", count))
  }

  pub fn apply_clear(&self) -> Status {
    match self.store.replace_playlist(&[]) {
      Ok(()) => Status::Success("Playlist cleared successfully".to_string()),
      Err(e) => Status::Error(format!("Failed to clear playlist: {:#}", e)),
    }
  }
}

/// Where exports land when no path is given.
pub fn default_export_dir() -> PathBuf {
  directories::UserDirs::new()
    .and_then(|d| d.download_dir().map(Path::to_path_buf))
    .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::tests::{memory_store, record};
  use chrono::{TimeZone, Utc};

  // --- validate_pagination_size ---

  #[test]
  fn accepts_bounds() {
    assert_eq!(validate_pagination_size("1"), Ok(1));
    assert_eq!(validate_pagination_size("50"), Ok(50));
    assert_eq!(validate_pagination_size(" 12"), Ok(12));
  }

  #[test]
  fn rejects_out_of_range_and_garbage() {
    for input in ["0", "51", "abc", "", "-3", "999999999999"] {
      assert!(validate_pagination_size(input).is_err(), "accepted {:?}", input);
    }
  }

  #[test]
  fn ignores_trailing_characters_after_digits() {
    assert_eq!(validate_pagination_size("7px"), Ok(7));
    assert_eq!(validate_pagination_size("3.9"), Ok(3));
  }

  #[test]
  fn rejection_message_names_bounds() {
    let err = validate_pagination_size("0").unwrap_err();
    assert_eq!(err.to_string(), "Please enter a valid number between 1 and 50");
  }

  // --- SettingsPanel ---

  #[test]
  fn save_rejects_without_persisting() {
    let store = memory_store();
    let mut panel = SettingsPanel::new(store.clone());
    assert_eq!(panel.input, "5");
    panel.input = "51".to_string();
    assert!(panel.save().is_error());
    assert_eq!(store.get_settings().pagination_size, 5);

    panel.input = "10".to_string();
    assert_eq!(panel.save(), Status::Success("Settings saved successfully!".to_string()));
    assert_eq!(store.get_settings().pagination_size, 10);
  }

  #[test]
  fn export_of_empty_playlist_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let panel = SettingsPanel::new(memory_store());
    assert_eq!(panel.export(dir.path()), Status::Error("No videos to export".to_string()));
  }

  #[test]
  fn export_then_import_into_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let source = memory_store();
    let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    source.add_video(record("1", "abc", t));
    source.add_video(record("2", "def", t));
    let path = dir.path().join("out.json");
    assert!(!SettingsPanel::new(source.clone()).export(&path).is_error());

    let target = memory_store();
    let panel = SettingsPanel::new(target.clone());
    let pending = panel.prepare_import(&path).unwrap();
    assert_eq!(pending.records.len(), 2);
    assert_eq!(
      panel.apply_import(pending),
      Status::Success("Imported 2 new videos (0 duplicates skipped)".to_string())
    );
    assert_eq!(target.get_playlist(), source.get_playlist());
  }

  #[test]
  fn export_into_directory_uses_dated_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = memory_store();
    store.add_video(record("1", "abc", Utc::now()));
    let (written, count) = SettingsPanel::new(store).export_to(dir.path()).unwrap().unwrap();
    assert_eq!(count, 1);
    let name = written.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("playlist-") && name.ends_with(".json"));
  }

  #[test]
  fn malformed_import_is_rejected_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"videos": []}"#).unwrap();
    let store = memory_store();
    store.add_video(record("1", "abc", Utc::now()));
    let panel = SettingsPanel::new(store.clone());
    let err = panel.prepare_import(&path).unwrap_err();
    assert_eq!(err, Status::Error("Invalid playlist file format".to_string()));
    assert_eq!(store.get_playlist().len(), 1);
  }

  #[test]
  fn clear_reports_empty_then_wipes() {
    let store = memory_store();
    let panel = SettingsPanel::new(store.clone());
    assert_eq!(panel.prepare_clear(), Err(Status::Error("Playlist is already empty".to_string())));

    store.add_video(record("1", "abc", Utc::now()));
    assert!(panel.prepare_clear().unwrap().contains("all 1 videos"));
    assert!(!panel.apply_clear().is_error());
    assert!(store.get_playlist().is_empty());
  }
}
