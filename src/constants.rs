//! Tunables for metadata lookup, pagination, timers and export, kept in
//! `constants.ron` next to the manifest and compiled into the binary.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Metadata
  pub oembed_endpoint: String,
  pub fallback_title: String,
  pub fallback_channel: String,
  pub http_timeout_secs: u64,

  // Pagination
  pub default_page_size: u32,
  pub min_page_size: u32,
  pub max_page_size: u32,

  // Timers
  pub error_reset_ms: u64,
  pub status_clear_ms: u64,
  pub page_poll_ms: u64,

  // Export
  pub export_version: String,
  pub export_file_prefix: String,
}

impl Constants {
  /// How long an add control stays in its error state before resetting.
  pub fn error_reset(&self) -> Duration {
    Duration::from_millis(self.error_reset_ms)
  }

  /// Lifetime of status lines and notifications.
  pub fn status_clear(&self) -> Duration {
    Duration::from_millis(self.status_clear_ms)
  }

  pub fn page_poll(&self) -> Duration {
    Duration::from_millis(self.page_poll_ms)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  ron::from_str(include_str!("../constants.ron")).expect("embedded constants.ron is malformed")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
