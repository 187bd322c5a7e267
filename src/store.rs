//! Playlist and settings persistence.
//!
//! Every operation reads the whole playlist, changes it, and writes it back.
//! There is no lock or version check across that sequence, so two overlapping
//! mutations can lose one of the writes. Callers treat writes as best-effort.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::model::{Settings, VideoRecord, now_millis};
use crate::storage::{Storage, StorageChange};

pub const PLAYLIST_KEY: &str = "playlist";
pub const SETTINGS_KEY: &str = "settings";

/// Membership of a canonical video id, as shown on a page control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStatus {
  NotInPlaylist,
  InPlaylistUnseen,
  AlreadyWatched,
}

#[derive(Clone)]
pub struct PlaylistStore {
  storage: Arc<dyn Storage>,
}

impl PlaylistStore {
  pub fn new(storage: Arc<dyn Storage>) -> Self {
    Self { storage }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
    self.storage.subscribe()
  }

  fn read_playlist(&self) -> Result<Vec<VideoRecord>> {
    match self.storage.get(PLAYLIST_KEY)? {
      Some(value) => serde_json::from_value(value).context("Stored playlist is malformed"),
      None => Ok(Vec::new()),
    }
  }

  fn write_playlist(&self, playlist: &[VideoRecord]) -> Result<()> {
    let value = serde_json::to_value(playlist).context("Failed to serialize playlist")?;
    self.storage.set(PLAYLIST_KEY, value)
  }

  /// The whole playlist; empty when unset or unreadable.
  pub fn get_playlist(&self) -> Vec<VideoRecord> {
    self.read_playlist().unwrap_or_else(|e| {
      error!(err = %format!("{:#}", e), "store: failed to read playlist");
      Vec::new()
    })
  }

  pub fn add_video(&self, record: VideoRecord) -> bool {
    let mut playlist = self.get_playlist();
    let (id, video_id) = (record.id.clone(), record.video_id.clone());
    playlist.push(record);
    match self.write_playlist(&playlist) {
      Ok(()) => {
        info!(id = %id, video_id = %video_id, "store: video added");
        true
      }
      Err(e) => {
        error!(err = %format!("{:#}", e), "store: failed to add video");
        false
      }
    }
  }

  pub fn remove_video(&self, id: &str) -> bool {
    let playlist: Vec<VideoRecord> = self.get_playlist().into_iter().filter(|v| v.id != id).collect();
    match self.write_playlist(&playlist) {
      Ok(()) => {
        info!(id, "store: video removed");
        true
      }
      Err(e) => {
        error!(err = %format!("{:#}", e), "store: failed to remove video");
        false
      }
    }
  }

  pub fn mark_as_seen(&self, id: &str) -> bool {
    self.set_seen_at(id, true)
  }

  pub fn mark_as_unseen(&self, id: &str) -> bool {
    self.set_seen_at(id, false)
  }

  fn set_seen_at(&self, id: &str, seen: bool) -> bool {
    let mut playlist = self.get_playlist();
    let Some(video) = playlist.iter_mut().find(|v| v.id == id) else {
      return false;
    };
    video.seen_at = seen.then(now_millis);
    match self.write_playlist(&playlist) {
      Ok(()) => {
        info!(id, seen, "store: seen state changed");
        true
      }
      Err(e) => {
        error!(err = %format!("{:#}", e), seen, "store: failed to change seen state");
        false
      }
    }
  }

  pub fn is_video_in_playlist(&self, video_id: &str) -> bool {
    self.get_playlist().iter().any(|v| v.video_id == video_id)
  }

  /// Watched if any record for the id is seen, else in-playlist if any record exists.
  pub fn video_status(&self, video_id: &str) -> VideoStatus {
    let playlist = self.get_playlist();
    let mut matching = playlist.iter().filter(|v| v.video_id == video_id).peekable();
    if matching.peek().is_none() {
      VideoStatus::NotInPlaylist
    } else if matching.any(VideoRecord::is_seen) {
      VideoStatus::AlreadyWatched
    } else {
      VideoStatus::InPlaylistUnseen
    }
  }

  /// Overwrite the whole playlist (import merge, clear).
  pub fn replace_playlist(&self, playlist: &[VideoRecord]) -> Result<()> {
    self.write_playlist(playlist)?;
    info!(count = playlist.len(), "store: playlist replaced");
    Ok(())
  }

  /// Stored settings, or defaults when absent or unreadable.
  pub fn get_settings(&self) -> Settings {
    match self.storage.get(SETTINGS_KEY) {
      Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
        error!(err = %e, "store: stored settings are malformed");
        Settings::default()
      }),
      Ok(None) => Settings::default(),
      Err(e) => {
        error!(err = %format!("{:#}", e), "store: failed to read settings");
        Settings::default()
      }
    }
  }

  pub fn save_settings(&self, settings: Settings) -> bool {
    let result = serde_json::to_value(settings)
      .context("Failed to serialize settings")
      .and_then(|value| self.storage.set(SETTINGS_KEY, value));
    match result {
      Ok(()) => true,
      Err(e) => {
        error!(err = %format!("{:#}", e), "store: failed to save settings");
        false
      }
    }
  }
}
