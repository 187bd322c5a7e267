use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::model::VideoRecord;
use crate::page::{Mutation, Page, watch_page};
use crate::scanner::{Scanner, add_to_playlist};
use crate::settings::{PendingImport, SettingsPanel, Status, default_export_dir};
use crate::storage::{Storage, StorageChange};
use crate::store::{PLAYLIST_KEY, PlaylistStore, SETTINGS_KEY};
use crate::viewer::PlaylistViewer;

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
  Page,
  Playlist,
  Settings,
}

impl Tab {
  pub const ALL: [Tab; 3] = [Tab::Page, Tab::Playlist, Tab::Settings];

  pub fn label(self) -> &'static str {
    match self {
      Tab::Page => "Page",
      Tab::Playlist => "Playlist",
      Tab::Settings => "Settings",
    }
  }

  pub fn next(self) -> Self {
    match self {
      Tab::Page => Tab::Playlist,
      Tab::Playlist => Tab::Settings,
      Tab::Settings => Tab::Page,
    }
  }
}

/// Which text field of the settings tab has the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
  PageSize,
  FilePath,
}

/// Action that runs once the confirmation dialog is accepted.
#[derive(Debug, Clone)]
pub enum PendingAction {
  AddDuplicate { control_id: u64 },
  Remove(VideoRecord),
  Import(PendingImport),
  Clear,
}

#[derive(Debug, Clone)]
pub struct Confirm {
  pub title: String,
  pub message: String,
  pub confirm_label: &'static str,
  pub action: PendingAction,
}

/// Transient toast, shown until `expires`.
#[derive(Debug, Clone)]
pub struct Notification {
  pub message: String,
  pub is_error: bool,
  expires: Instant,
}

/// Result of a background add: (control id, success).
type AddResult = (u64, bool);

pub struct App {
  pub tab: Tab,
  pub store: PlaylistStore,
  pub page: Page,
  pub page_path: Option<PathBuf>,
  pub scanner: Scanner,
  pub viewer: PlaylistViewer,
  pub settings: SettingsPanel,
  pub settings_field: SettingsField,
  /// Import/export path typed on the settings tab. Empty exports to the download directory.
  pub file_input: String,
  pub file_cursor: usize,
  /// Settings tab status line and when it was set.
  pub settings_status: Option<(Status, Instant)>,
  /// Index of the selected control on the page tab.
  pub selected_control: usize,
  pub confirm: Option<Confirm>,
  pub notification: Option<Notification>,
  pub should_quit: bool,
  http_client: Client,
  oembed_endpoint: String,
  mutation_rx: mpsc::UnboundedReceiver<Mutation>,
  page_rx: Option<mpsc::Receiver<String>>,
  watch_handle: Option<JoinHandle<()>>,
  storage_rx: broadcast::Receiver<StorageChange>,
  add_tx: mpsc::UnboundedSender<AddResult>,
  add_rx: mpsc::UnboundedReceiver<AddResult>,
}

impl App {
  pub fn new(config: &Config, storage: Arc<dyn Storage>, page_path: Option<PathBuf>) -> Self {
    let store = PlaylistStore::new(storage);
    let storage_rx = store.subscribe();
    let mut page = Page::new();
    let mutation_rx = page.observe();
    let (add_tx, add_rx) = mpsc::unbounded_channel();
    let http_client = Client::builder()
      .timeout(Duration::from_secs(constants().http_timeout_secs))
      .build()
      .unwrap_or_else(|e| {
        warn!(err = %e, "http: failed to build client with timeout, using defaults");
        Client::new()
      });

    Self {
      tab: if page_path.is_some() { Tab::Page } else { Tab::Playlist },
      viewer: PlaylistViewer::new(store.clone()),
      settings: SettingsPanel::new(store.clone()),
      settings_field: SettingsField::PageSize,
      file_input: String::new(),
      file_cursor: 0,
      settings_status: None,
      store,
      page,
      page_path,
      scanner: Scanner::new(),
      selected_control: 0,
      confirm: None,
      notification: None,
      should_quit: false,
      http_client,
      oembed_endpoint: config.oembed_endpoint().to_string(),
      mutation_rx,
      page_rx: None,
      watch_handle: None,
      storage_rx,
      add_tx,
      add_rx,
    }
  }

  /// Start polling the page file, if one was given.
  pub fn start_watching(&mut self) {
    let Some(path) = self.page_path.clone() else { return };
    info!(path = %path.display(), "page: watching");
    let (tx, rx) = mpsc::channel(4);
    self.watch_handle = Some(tokio::spawn(watch_page(path, tx)));
    self.page_rx = Some(rx);
  }

  pub fn stop_watching(&mut self) {
    if let Some(handle) = self.watch_handle.take() {
      handle.abort();
    }
    self.page_rx = None;
  }

  pub fn next_tab(&mut self) {
    self.tab = self.tab.next();
  }

  pub fn notify(&mut self, message: impl Into<String>, is_error: bool) {
    self.notification =
      Some(Notification { message: message.into(), is_error, expires: Instant::now() + constants().status_clear() });
  }

  pub fn set_settings_status(&mut self, status: Status) {
    self.settings_status = Some((status, Instant::now()));
  }

  /// Drain every channel the loop listens on and expire timers.
  pub fn check_pending(&mut self) {
    let now = Instant::now();

    if let Some(rx) = self.page_rx.as_mut() {
      let mut latest = None;
      while let Ok(html) = rx.try_recv() {
        latest = Some(html);
      }
      if let Some(html) = latest {
        self.page.sync_html(&html);
      }
    }

    // Any addition triggers a full pass; the scanner skips what it has seen.
    let mut rescan = false;
    while let Ok(mutation) = self.mutation_rx.try_recv() {
      rescan |= mutation.added_nodes > 0;
    }
    if rescan {
      self.scanner.scan(&mut self.page, &self.store);
      debug!(processed = self.scanner.processed().live_len(), "scanner: pass complete");
    }
    let controls = self.page.controls().count();
    self.selected_control = self.selected_control.min(controls.saturating_sub(1));

    let (mut playlist_changed, mut settings_changed) = (false, false);
    loop {
      match self.storage_rx.try_recv() {
        Ok(change) if change.key == PLAYLIST_KEY => playlist_changed = true,
        Ok(change) if change.key == SETTINGS_KEY => settings_changed = true,
        Ok(_) => {}
        Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
          debug!(skipped, "storage: change notifications lagged");
          playlist_changed = true;
          settings_changed = true;
        }
        Err(_) => break,
      }
    }
    if settings_changed {
      self.viewer.reload_settings();
    }
    if playlist_changed {
      self.viewer.reload();
    }

    while let Ok((control_id, success)) = self.add_rx.try_recv() {
      let Some(control) = self.page.control_by_id_mut(control_id) else { continue };
      control.finish_add(success, now);
      if success {
        self.notify("Video added to playlist!", false);
      } else {
        self.notify("Failed to add video", true);
      }
    }

    for control in self.page.controls_mut() {
      control.tick(now);
    }

    if self.notification.as_ref().is_some_and(|n| now >= n.expires) {
      self.notification = None;
    }
    if self.settings_status.as_ref().is_some_and(|(_, at)| now.duration_since(*at) >= constants().status_clear()) {
      self.settings_status = None;
    }
  }

  // --- Page tab ---

  /// Activate the selected control: warn about duplicates, else start adding.
  pub fn activate_control(&mut self) {
    let Some(control) = self.page.control_mut(self.selected_control) else { return };
    if control.is_disabled() {
      return;
    }
    let (control_id, video_id) = (control.id, control.video_id.clone());
    if self.store.is_video_in_playlist(&video_id) {
      self.confirm = Some(Confirm {
        title: "Video Already in Playlist".to_string(),
        message: "This video is already in your playlist. Do you want to add it again?".to_string(),
        confirm_label: "Add Anyway",
        action: PendingAction::AddDuplicate { control_id },
      });
      return;
    }
    self.start_add(control_id);
  }

  fn start_add(&mut self, control_id: u64) {
    let Some(control) = self.page.control_by_id_mut(control_id) else { return };
    control.begin_add();
    let (url, video_id) = (control.url.clone(), control.video_id.clone());
    info!(video_id = %video_id, "scanner: adding video");

    let client = self.http_client.clone();
    let endpoint = self.oembed_endpoint.clone();
    let store = self.store.clone();
    let tx = self.add_tx.clone();
    tokio::spawn(async move {
      let success = add_to_playlist(&client, &endpoint, &store, url, video_id).await;
      let _ = tx.send((control_id, success));
    });
  }

  // --- Playlist tab ---

  pub fn open_selected(&mut self) {
    let Some(video) = self.viewer.selected_video().cloned() else { return };
    if let Err(e) = self.viewer.open(&video) {
      self.notify(format!("Failed to open video: {:#}", e), true);
    }
  }

  pub fn toggle_selected(&mut self) {
    let Some(video) = self.viewer.selected_video().cloned() else { return };
    if !self.viewer.toggle_seen(&video) {
      self.notify("Failed to update video", true);
    }
  }

  pub fn request_remove_selected(&mut self) {
    let Some(video) = self.viewer.selected_video().cloned() else { return };
    self.confirm = Some(Confirm {
      title: "Remove Video".to_string(),
      message: "Are you sure you want to remove this video from your playlist?".to_string(),
      confirm_label: "Remove",
      action: PendingAction::Remove(video),
    });
  }

  // --- Settings tab ---

  pub fn save_settings(&mut self) {
    let status = self.settings.save();
    self.set_settings_status(status);
  }

  fn file_path(&self) -> Option<PathBuf> {
    let trimmed = self.file_input.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
  }

  pub fn export_playlist(&mut self) {
    let target = self.file_path().unwrap_or_else(default_export_dir);
    let status = self.settings.export(&target);
    self.set_settings_status(status);
  }

  pub fn request_import(&mut self) {
    let Some(path) = self.file_path() else {
      self.set_settings_status(Status::Error("Enter the path of a playlist file to import".to_string()));
      return;
    };
    match self.settings.prepare_import(&path) {
      Ok(pending) => {
        self.confirm = Some(Confirm {
          title: "Import Playlist".to_string(),
          message: pending.prompt(),
          confirm_label: "Import",
          action: PendingAction::Import(pending),
        });
      }
      Err(status) => self.set_settings_status(status),
    }
  }

  pub fn request_clear(&mut self) {
    match self.settings.prepare_clear() {
      Ok(message) => {
        self.confirm =
          Some(Confirm { title: "Clear Playlist".to_string(), message, confirm_label: "Delete All", action: PendingAction::Clear });
      }
      Err(status) => self.set_settings_status(status),
    }
  }

  // --- Confirmation ---

  pub fn resolve_confirm(&mut self, accepted: bool) {
    let Some(confirm) = self.confirm.take() else { return };
    if !accepted {
      debug!(title = %confirm.title, "confirm: cancelled");
      return;
    }
    match confirm.action {
      PendingAction::AddDuplicate { control_id } => self.start_add(control_id),
      PendingAction::Remove(video) => {
        if !self.viewer.remove(&video) {
          self.notify("Failed to remove video", true);
        }
      }
      PendingAction::Import(pending) => {
        let status = self.settings.apply_import(pending);
        self.set_settings_status(status);
      }
      PendingAction::Clear => {
        let status = self.settings.apply_clear();
        self.set_settings_status(status);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scanner::ControlState;
  use crate::storage::MemoryStorage;
  use crate::store::tests::record;
  use chrono::Utc;

  const PAGE: &str = r#"<a href="https://youtu.be/aaa">a</a> <a href="https://example.com">x</a>"#;

  fn test_app() -> App {
    let config = Config { oembed_endpoint: Some("http://127.0.0.1:9/oembed".to_string()), ..Config::default() };
    App::new(&config, Arc::new(MemoryStorage::new()), None)
  }

  fn load_page(app: &mut App, html: &str) {
    app.page.sync_html(html);
    app.check_pending();
  }

  #[test]
  fn tabs_cycle() {
    assert_eq!(Tab::Page.next().next().next(), Tab::Page);
  }

  #[test]
  fn page_sync_triggers_scan_through_observer() {
    let mut app = test_app();
    load_page(&mut app, PAGE);
    assert_eq!(app.page.controls().count(), 1);
  }

  #[test]
  fn duplicate_add_asks_first_and_cancel_is_noop() {
    let mut app = test_app();
    app.store.add_video(record("1", "aaa", Utc::now()));
    load_page(&mut app, PAGE);

    app.activate_control();
    let confirm = app.confirm.as_ref().unwrap();
    assert_eq!(confirm.title, "Video Already in Playlist");
    assert!(matches!(confirm.action, PendingAction::AddDuplicate { .. }));

    app.resolve_confirm(false);
    assert!(app.confirm.is_none());
    assert_eq!(app.page.controls().next().unwrap().state, ControlState::InPlaylist);
    assert_eq!(app.store.get_playlist().len(), 1);
  }

  #[tokio::test]
  async fn add_completes_and_updates_control() {
    let mut app = test_app();
    load_page(&mut app, PAGE);
    app.activate_control();
    assert!(app.confirm.is_none());
    assert_eq!(app.page.controls().next().unwrap().state, ControlState::Adding);

    // Second activation while disabled is ignored.
    app.activate_control();

    for _ in 0..100 {
      tokio::time::sleep(Duration::from_millis(20)).await;
      app.check_pending();
      if app.page.controls().next().unwrap().state != ControlState::Adding {
        break;
      }
    }
    assert_eq!(app.page.controls().next().unwrap().state, ControlState::InPlaylist);
    assert_eq!(app.store.get_playlist().len(), 1);
    assert!(!app.notification.as_ref().unwrap().is_error);
    assert_eq!(app.viewer.count(crate::viewer::Partition::Unseen), 1);
  }

  #[test]
  fn remove_requires_confirmation() {
    let mut app = test_app();
    app.store.add_video(record("1", "aaa", Utc::now()));
    app.check_pending();

    app.request_remove_selected();
    assert!(app.confirm.is_some());
    assert_eq!(app.store.get_playlist().len(), 1);

    app.resolve_confirm(true);
    assert!(app.store.get_playlist().is_empty());
  }

  #[test]
  fn storage_changes_rerender_viewer() {
    let mut app = test_app();
    assert_eq!(app.viewer.count(crate::viewer::Partition::Unseen), 0);
    app.store.add_video(record("1", "aaa", Utc::now()));
    app.check_pending();
    assert_eq!(app.viewer.count(crate::viewer::Partition::Unseen), 1);
  }

  #[test]
  fn clear_on_empty_reports_status() {
    let mut app = test_app();
    app.request_clear();
    assert!(app.confirm.is_none());
    assert_eq!(app.settings_status.as_ref().unwrap().0, Status::Error("Playlist is already empty".to_string()));
  }

  #[test]
  fn import_without_path_is_rejected() {
    let mut app = test_app();
    app.request_import();
    assert!(app.settings_status.as_ref().unwrap().0.is_error());
  }
}
