//! Link detection and the add-to-playlist controls injected next to links.

use reqwest::Client;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use crate::constants::constants;
use crate::model::{VideoRecord, now_millis};
use crate::page::{Anchor, Page};
use crate::store::{PlaylistStore, VideoStatus};
use crate::youtube::{extract_video_id, fetch_video_metadata, generate_unique_id, is_youtube_url};

static NEXT_CONTROL_ID: AtomicU64 = AtomicU64::new(1);

/// Non-owning, identity-keyed set of anchors.
///
/// Holding `Weak` references means an anchor dropped by the page is freed and
/// its entry simply stops matching. Dead entries are pruned on insert.
#[derive(Default)]
pub struct ProcessedSet {
  entries: Vec<Weak<Anchor>>,
}

impl ProcessedSet {
  pub fn contains(&self, anchor: &Rc<Anchor>) -> bool {
    let ptr = Rc::as_ptr(anchor);
    self.entries.iter().any(|w| w.as_ptr() == ptr && w.strong_count() > 0)
  }

  pub fn insert(&mut self, anchor: &Rc<Anchor>) {
    self.entries.retain(|w| w.strong_count() > 0);
    if !self.contains(anchor) {
      self.entries.push(Rc::downgrade(anchor));
    }
  }

  /// Entries whose anchor is still alive.
  pub fn live_len(&self) -> usize {
    self.entries.iter().filter(|w| w.strong_count() > 0).count()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
  NotInPlaylist,
  InPlaylist,
  AlreadyWatched,
  Adding,
  /// Shows the error until `reset_at`, then returns to `NotInPlaylist`.
  Error { reset_at: Instant },
}

impl From<VideoStatus> for ControlState {
  fn from(status: VideoStatus) -> Self {
    match status {
      VideoStatus::NotInPlaylist => ControlState::NotInPlaylist,
      VideoStatus::InPlaylistUnseen => ControlState::InPlaylist,
      VideoStatus::AlreadyWatched => ControlState::AlreadyWatched,
    }
  }
}

/// The button shown after a YouTube link.
#[derive(Debug, Clone)]
pub struct ActionControl {
  pub id: u64,
  pub video_id: String,
  pub url: String,
  pub state: ControlState,
}

impl ActionControl {
  pub fn new(video_id: String, url: String, status: VideoStatus) -> Self {
    Self { id: NEXT_CONTROL_ID.fetch_add(1, Ordering::Relaxed), video_id, url, state: status.into() }
  }

  pub fn label(&self) -> &'static str {
    match self.state {
      ControlState::NotInPlaylist => "+ Add to Playlist",
      ControlState::InPlaylist => "✓ In Playlist",
      ControlState::AlreadyWatched => "Already watched",
      ControlState::Adding => "Adding…",
      ControlState::Error { .. } => "✗ Error",
    }
  }

  pub fn is_disabled(&self) -> bool {
    matches!(self.state, ControlState::Adding | ControlState::Error { .. })
  }

  pub fn begin_add(&mut self) {
    self.state = ControlState::Adding;
  }

  pub fn finish_add(&mut self, success: bool, now: Instant) {
    self.state =
      if success { ControlState::InPlaylist } else { ControlState::Error { reset_at: now + constants().error_reset() } };
  }

  /// Expire the error state. Returns true if the control changed.
  pub fn tick(&mut self, now: Instant) -> bool {
    match self.state {
      ControlState::Error { reset_at } if now >= reset_at => {
        self.state = ControlState::NotInPlaylist;
        true
      }
      _ => false,
    }
  }
}

#[derive(Default)]
pub struct Scanner {
  processed: ProcessedSet,
}

impl Scanner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn processed(&self) -> &ProcessedSet {
    &self.processed
  }

  /// One pass over the page. Every unprocessed YouTube anchor is marked
  /// processed and, if it yields a video id, gets a control reflecting the
  /// playlist's current state. Returns the number of controls injected.
  pub fn scan(&mut self, page: &mut Page, store: &PlaylistStore) -> usize {
    let candidates: Vec<Rc<Anchor>> = page
      .anchors()
      .filter(|a| !self.processed.contains(a) && is_youtube_url(Some(a.href.as_str())))
      .cloned()
      .collect();

    let mut injected = 0;
    for anchor in candidates {
      self.processed.insert(&anchor);
      let Some(video_id) = extract_video_id(Some(anchor.href.as_str())) else {
        debug!(href = %anchor.href, "scanner: YouTube link without a video id");
        continue;
      };
      let status = store.video_status(&video_id);
      if page.insert_after(&anchor, ActionControl::new(video_id, anchor.href.clone(), status)) {
        injected += 1;
      }
    }
    if injected > 0 {
      info!(injected, "scanner: controls injected");
    }
    injected
  }
}

/// Fetch metadata and append a new unseen record. Returns the store's success flag.
pub async fn add_to_playlist(
  client: &Client,
  endpoint: &str,
  store: &PlaylistStore,
  url: String,
  video_id: String,
) -> bool {
  let metadata = fetch_video_metadata(client, endpoint, &url).await;
  let record = VideoRecord {
    id: generate_unique_id(),
    url,
    video_id,
    title: metadata.title,
    channel: metadata.channel,
    thumbnail: metadata.thumbnail,
    added_at: now_millis(),
    seen_at: None,
  };
  store.add_video(record)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::tests::{memory_store, record};
  use chrono::Utc;
  use std::time::Duration;

  const PAGE: &str = r#"
    <a href="https://www.youtube.com/watch?v=aaa">one</a>
    <a href="https://example.com/x">not youtube</a>
    <a href="https://www.youtube.com/channel/UC1">channel</a>
    <a href="https://youtu.be/bbb">two</a>
  "#;

  fn scanned(store: &PlaylistStore) -> (Page, Scanner, usize) {
    let mut page = Page::new();
    page.sync_html(PAGE);
    let mut scanner = Scanner::new();
    let injected = scanner.scan(&mut page, store);
    (page, scanner, injected)
  }

  #[test]
  fn injects_controls_only_for_video_links() {
    let (page, scanner, injected) = scanned(&memory_store());
    assert_eq!(injected, 2);
    let ids: Vec<_> = page.controls().map(|c| c.video_id.as_str()).collect();
    assert_eq!(ids, ["aaa", "bbb"]);
    // The channel link is processed even though it has no control.
    assert_eq!(scanner.processed().live_len(), 3);
  }

  #[test]
  fn rescan_does_not_duplicate_controls() {
    let store = memory_store();
    let (mut page, mut scanner, _) = scanned(&store);
    assert_eq!(scanner.scan(&mut page, &store), 0);
    assert_eq!(page.controls().count(), 2);
  }

  #[test]
  fn rescan_after_mutation_handles_only_new_anchors() {
    let store = memory_store();
    let (mut page, mut scanner, _) = scanned(&store);
    page.sync_html(&format!("{}<a href=\"https://youtu.be/ccc\">three</a>", PAGE));
    assert_eq!(scanner.scan(&mut page, &store), 1);
    assert_eq!(page.controls().count(), 3);
  }

  #[test]
  fn control_state_reflects_store() {
    let store = memory_store();
    store.add_video(record("1", "aaa", Utc::now()));
    store.add_video(record("2", "bbb", Utc::now()));
    store.mark_as_seen("2");
    let (page, _, _) = scanned(&store);
    let labels: Vec<_> = page.controls().map(ActionControl::label).collect();
    assert_eq!(labels, ["✓ In Playlist", "Already watched"]);
  }

  #[test]
  fn dropped_anchors_leave_the_processed_set() {
    let store = memory_store();
    let (mut page, scanner, _) = scanned(&store);
    page.sync_html("<p>empty</p>");
    assert_eq!(scanner.processed().live_len(), 0);
  }

  #[test]
  fn processed_set_is_identity_keyed() {
    let mut set = ProcessedSet::default();
    let a = Rc::new(Anchor { href: "https://youtu.be/a".to_string(), text: String::new() });
    let twin = Rc::new(Anchor { href: "https://youtu.be/a".to_string(), text: String::new() });
    set.insert(&a);
    set.insert(&a);
    assert!(set.contains(&a));
    assert!(!set.contains(&twin));
    assert_eq!(set.live_len(), 1);
    drop(a);
    set.insert(&twin);
    assert_eq!(set.live_len(), 1);
  }

  #[test]
  fn error_state_resets_after_two_seconds() {
    let mut control = ActionControl::new("aaa".to_string(), "https://youtu.be/aaa".to_string(), VideoStatus::NotInPlaylist);
    control.begin_add();
    assert!(control.is_disabled());
    assert_eq!(control.label(), "Adding…");

    let now = Instant::now();
    control.finish_add(false, now);
    assert_eq!(control.label(), "✗ Error");
    assert!(!control.tick(now + Duration::from_millis(1999)));
    assert!(control.is_disabled());
    assert!(control.tick(now + Duration::from_secs(2)));
    assert_eq!(control.state, ControlState::NotInPlaylist);
    assert!(!control.is_disabled());
  }

  #[test]
  fn successful_add_marks_in_playlist() {
    let mut control = ActionControl::new("aaa".to_string(), "https://youtu.be/aaa".to_string(), VideoStatus::NotInPlaylist);
    control.begin_add();
    control.finish_add(true, Instant::now());
    assert_eq!(control.label(), "✓ In Playlist");
  }

  #[tokio::test]
  async fn add_to_playlist_stores_unseen_record_with_fallback_metadata() {
    let store = memory_store();
    // Port 9 (discard) is not listening, so the lookup degrades to placeholders.
    let ok = add_to_playlist(
      &Client::new(),
      "http://127.0.0.1:9/oembed",
      &store,
      "https://youtu.be/aaa".to_string(),
      "aaa".to_string(),
    )
    .await;
    assert!(ok);
    let playlist = store.get_playlist();
    assert_eq!(playlist.len(), 1);
    assert_eq!(playlist[0].video_id, "aaa");
    assert_eq!(playlist[0].title, "Unknown Title");
    assert!(playlist[0].seen_at.is_none());
  }
}
