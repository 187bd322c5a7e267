use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::constants;

const APP_NAME: &str = "ytlater";

/// User preferences from `prefs.toml`. Every field is optional.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  /// Directory holding `storage.json` and the log files.
  pub data_dir: Option<PathBuf>,
  /// oEmbed endpoint override (mostly useful for testing against a local server).
  pub oembed_endpoint: Option<String>,
  /// Page file watched when the TUI is started without an explicit path.
  pub page_file: Option<PathBuf>,
}

impl Config {
  /// Read `prefs.toml`. A missing file gives defaults; a malformed one gives
  /// defaults plus the parse error, to be logged once logging is up.
  pub fn load() -> (Self, Option<toml::de::Error>) {
    if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file) {
        return Self::from_toml(&content);
      }
    }
    (Self::default(), None)
  }

  pub fn from_toml(content: &str) -> (Self, Option<toml::de::Error>) {
    match toml::from_str(content) {
      Ok(config) => (config, None),
      Err(e) => (Self::default(), Some(e)),
    }
  }

  pub fn data_dir(&self) -> PathBuf {
    if let Some(ref dir) = self.data_dir {
      return dir.clone();
    }
    ProjectDirs::from("", "", APP_NAME).map(|d| d.data_dir().to_path_buf()).unwrap_or_else(|| PathBuf::from("."))
  }

  pub fn oembed_endpoint(&self) -> &str {
    self.oembed_endpoint.as_deref().unwrap_or(&constants().oembed_endpoint)
  }
}
