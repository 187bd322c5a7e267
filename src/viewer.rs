//! Playlist view: seen/unseen partitions with independent pagination.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use std::process::Stdio;
use tracing::{info, warn};

use crate::model::VideoRecord;
use crate::store::PlaylistStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
  Unseen,
  Seen,
}

impl Partition {
  pub fn label(self) -> &'static str {
    match self {
      Partition::Unseen => "unseen",
      Partition::Seen => "seen",
    }
  }

  pub fn empty_message(self) -> (&'static str, &'static str) {
    match self {
      Partition::Unseen => ("No unseen videos yet", "Add videos from the Page tab to see them here"),
      Partition::Seen => ("No seen videos yet", "Open videos to mark them as seen"),
    }
  }

  pub fn other(self) -> Self {
    match self {
      Partition::Unseen => Partition::Seen,
      Partition::Seen => Partition::Unseen,
    }
  }
}

/// One rendered page of a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView<'a> {
  pub items: &'a [VideoRecord],
  /// 1-based.
  pub page: usize,
  /// Zero for an empty partition.
  pub total_pages: usize,
  pub has_prev: bool,
  pub has_next: bool,
}

pub fn total_pages(len: usize, page_size: usize) -> usize {
  len.div_ceil(page_size.max(1))
}

/// Slice `items` to the 1-based `page`.
pub fn paginate(items: &[VideoRecord], page: usize, page_size: usize) -> PageView<'_> {
  let page_size = page_size.max(1);
  let total = total_pages(items.len(), page_size);
  let start = (page.saturating_sub(1) * page_size).min(items.len());
  let end = (start + page_size).min(items.len());
  PageView { items: &items[start..end], page, total_pages: total, has_prev: page > 1, has_next: page < total }
}

/// Split into (unseen by `addedAt` desc, seen by `seenAt` desc).
pub fn partition(playlist: Vec<VideoRecord>) -> (Vec<VideoRecord>, Vec<VideoRecord>) {
  let (mut seen, mut unseen): (Vec<_>, Vec<_>) = playlist.into_iter().partition(VideoRecord::is_seen);
  unseen.sort_by(|a, b| b.added_at.cmp(&a.added_at));
  seen.sort_by(|a, b| b.seen_at.cmp(&a.seen_at));
  (unseen, seen)
}

/// `Just now`, `5m ago`, `3h ago`, `2d ago`, else `May 1` (with year if not this year).
pub fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let diff = now.signed_duration_since(ts);
  let mins = diff.num_minutes();
  let hours = diff.num_hours();
  let days = diff.num_days();
  if mins < 1 {
    "Just now".to_string()
  } else if mins < 60 {
    format!("{}m ago", mins)
  } else if hours < 24 {
    format!("{}h ago", hours)
  } else if days < 7 {
    format!("{}d ago", days)
  } else if ts.year() != now.year() {
    ts.format("%b %-d, %Y").to_string()
  } else {
    ts.format("%b %-d").to_string()
  }
}

/// Launch `url` with the platform's default handler.
pub fn open_in_browser(url: &str) -> Result<()> {
  #[cfg(target_os = "macos")]
  let cmd = "open";
  #[cfg(not(target_os = "macos"))]
  let cmd = "xdg-open";
  let mut child = std::process::Command::new(cmd)
    .arg(url)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()
    .with_context(|| format!("Failed to run {}", cmd))?;
  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}

pub struct PlaylistViewer {
  store: PlaylistStore,
  page_size: usize,
  unseen_page: usize,
  seen_page: usize,
  unseen: Vec<VideoRecord>,
  seen: Vec<VideoRecord>,
  /// Selection within the focused partition's current page.
  pub focus: Partition,
  pub selected: usize,
}

impl PlaylistViewer {
  pub fn new(store: PlaylistStore) -> Self {
    let page_size = (store.get_settings().pagination_size as usize).max(1);
    let mut viewer = Self {
      store,
      page_size,
      unseen_page: 1,
      seen_page: 1,
      unseen: Vec::new(),
      seen: Vec::new(),
      focus: Partition::Unseen,
      selected: 0,
    };
    viewer.reload();
    viewer
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  /// Re-read the page size from settings.
  pub fn reload_settings(&mut self) {
    self.page_size = (self.store.get_settings().pagination_size as usize).max(1);
    self.clamp();
  }

  /// Re-read the playlist and re-render.
  pub fn reload(&mut self) {
    let playlist = self.store.get_playlist();
    self.refresh(playlist);
  }

  pub fn refresh(&mut self, playlist: Vec<VideoRecord>) {
    let (unseen, seen) = partition(playlist);
    self.unseen = unseen;
    self.seen = seen;
    self.clamp();
  }

  fn clamp(&mut self) {
    let size = self.page_size;
    self.unseen_page = self.unseen_page.clamp(1, total_pages(self.unseen.len(), size).max(1));
    self.seen_page = self.seen_page.clamp(1, total_pages(self.seen.len(), size).max(1));
    let visible = self.page(self.focus).items.len();
    self.selected = self.selected.min(visible.saturating_sub(1));
  }

  pub fn count(&self, partition: Partition) -> usize {
    self.items(partition).len()
  }

  fn items(&self, partition: Partition) -> &[VideoRecord] {
    match partition {
      Partition::Unseen => &self.unseen,
      Partition::Seen => &self.seen,
    }
  }

  fn cursor_mut(&mut self, partition: Partition) -> &mut usize {
    match partition {
      Partition::Unseen => &mut self.unseen_page,
      Partition::Seen => &mut self.seen_page,
    }
  }

  pub fn page(&self, partition: Partition) -> PageView<'_> {
    let page = match partition {
      Partition::Unseen => self.unseen_page,
      Partition::Seen => self.seen_page,
    };
    paginate(self.items(partition), page, self.page_size)
  }

  pub fn next_page(&mut self, partition: Partition) -> bool {
    if !self.page(partition).has_next {
      return false;
    }
    *self.cursor_mut(partition) += 1;
    self.selected = 0;
    true
  }

  pub fn prev_page(&mut self, partition: Partition) -> bool {
    if !self.page(partition).has_prev {
      return false;
    }
    *self.cursor_mut(partition) -= 1;
    self.selected = 0;
    true
  }

  pub fn switch_focus(&mut self) {
    self.focus = self.focus.other();
    self.selected = 0;
  }

  pub fn select_next(&mut self) {
    let visible = self.page(self.focus).items.len();
    if visible > 0 {
      self.selected = (self.selected + 1) % visible;
    }
  }

  pub fn select_prev(&mut self) {
    let visible = self.page(self.focus).items.len();
    if visible > 0 {
      self.selected = if self.selected == 0 { visible - 1 } else { self.selected - 1 };
    }
  }

  pub fn selected_video(&self) -> Option<&VideoRecord> {
    self.page(self.focus).items.get(self.selected)
  }

  /// Open the video in the system browser; an unseen video is marked seen as a side effect.
  pub fn open(&self, video: &VideoRecord) -> Result<()> {
    self.open_with(video, open_in_browser)
  }

  /// Like [`open`](Self::open), launching the URL with `launch`.
  pub fn open_with(&self, video: &VideoRecord, launch: impl FnOnce(&str) -> Result<()>) -> Result<()> {
    launch(&video.url)?;
    info!(id = %video.id, "viewer: video opened");
    if !video.is_seen() && !self.store.mark_as_seen(&video.id) {
      warn!(id = %video.id, "viewer: could not mark opened video as seen");
    }
    Ok(())
  }

  pub fn toggle_seen(&self, video: &VideoRecord) -> bool {
    if video.is_seen() { self.store.mark_as_unseen(&video.id) } else { self.store.mark_as_seen(&video.id) }
  }

  /// Call only after the user confirmed.
  pub fn remove(&self, video: &VideoRecord) -> bool {
    self.store.remove_video(&video.id)
  }
}
