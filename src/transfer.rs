//! Export file format and import merging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::constants::constants;
use crate::model::{VideoRecord, now_millis};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
  pub version: String,
  pub exported_at: String,
  pub total_videos: usize,
  pub playlist: Vec<VideoRecord>,
}

impl ExportDocument {
  pub fn new(playlist: Vec<VideoRecord>, exported_at: DateTime<Utc>) -> Self {
    Self {
      version: constants().export_version.clone(),
      exported_at: crate::model::to_iso(&exported_at),
      total_videos: playlist.len(),
      playlist,
    }
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }
}

/// Default export file name, e.g. `playlist-2024-05-01.json`.
pub fn export_file_name(now: DateTime<Utc>) -> String {
  format!("{}-{}.json", constants().export_file_prefix, now.format("%Y-%m-%d"))
}

pub fn export_now(playlist: Vec<VideoRecord>) -> ExportDocument {
  ExportDocument::new(playlist, now_millis())
}

#[derive(Debug, Error)]
pub enum ImportError {
  #[error("Failed to import playlist: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid playlist file format")]
  InvalidFormat,
}

/// Parse an import file. Only the `playlist` array is required; other fields are ignored.
pub fn parse_import(text: &str) -> Result<Vec<VideoRecord>, ImportError> {
  let document: Value = serde_json::from_str(text)?;
  let Some(entries @ Value::Array(_)) = document.get("playlist") else {
    return Err(ImportError::InvalidFormat);
  };
  Ok(serde_json::from_value(entries.clone())?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
  pub added: usize,
  pub skipped: usize,
}

/// Append every candidate that does not match an existing record on both
/// canonical id and `addedAt`. Candidates are only checked against records
/// that existed before the merge.
pub fn merge_playlists(existing: &[VideoRecord], incoming: Vec<VideoRecord>) -> (Vec<VideoRecord>, MergeOutcome) {
  let mut merged = existing.to_vec();
  let mut outcome = MergeOutcome { added: 0, skipped: 0 };
  for video in incoming {
    let exists = existing.iter().any(|v| v.video_id == video.video_id && v.added_at == video.added_at);
    if exists {
      outcome.skipped += 1;
    } else {
      merged.push(video);
      outcome.added += 1;
    }
  }
  (merged, outcome)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::tests::record;
  use chrono::TimeZone;

  fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600 + secs, 0).unwrap()
  }

  #[test]
  fn export_carries_metadata() {
    let doc = ExportDocument::new(vec![record("1", "abc", t(0))], t(60));
    let json: Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
    assert_eq!(json["version"], "1.0");
    assert_eq!(json["totalVideos"], 1);
    assert_eq!(json["exportedAt"], "2024-05-01T10:01:00.000Z");
    assert_eq!(json["playlist"][0]["videoId"], "abc");
  }

  #[test]
  fn export_file_name_uses_date() {
    assert_eq!(export_file_name(t(0)), "playlist-2024-05-01.json");
  }

  #[test]
  fn round_trip_into_empty_playlist() {
    let original = vec![record("1", "abc", t(0)), record("2", "def", t(30)), record("3", "abc", t(90))];
    let text = ExportDocument::new(original.clone(), t(100)).to_json().unwrap();
    let incoming = parse_import(&text).unwrap();
    let (merged, outcome) = merge_playlists(&[], incoming);
    assert_eq!(merged, original);
    assert_eq!(outcome, MergeOutcome { added: 3, skipped: 0 });
  }

  #[test]
  fn identical_video_and_timestamp_is_skipped() {
    let existing = vec![record("1", "abc", t(0))];
    let (merged, outcome) = merge_playlists(&existing, vec![record("other-id", "abc", t(0))]);
    assert_eq!(merged.len(), 1);
    assert_eq!(outcome, MergeOutcome { added: 0, skipped: 1 });
  }

  #[test]
  fn timestamps_match_by_instant_not_spelling() {
    let existing = vec![record("1", "abc", t(0))];
    let text = r#"{"playlist": [{"id": "x", "url": "u", "videoId": "abc", "title": "t", "channel": "c",
      "thumbnail": "", "addedAt": "2024-05-01T10:00:00Z", "seenAt": null}]}"#;
    let (merged, outcome) = merge_playlists(&existing, parse_import(text).unwrap());
    assert_eq!(merged.len(), 1);
    assert_eq!(outcome, MergeOutcome { added: 0, skipped: 1 });
  }

  #[test]
  fn same_video_different_timestamp_is_appended() {
    let existing = vec![record("1", "abc", t(0))];
    let (merged, outcome) = merge_playlists(&existing, vec![record("2", "abc", t(1))]);
    assert_eq!(merged.len(), 2);
    assert_eq!(outcome, MergeOutcome { added: 1, skipped: 0 });
  }

  #[test]
  fn import_requires_playlist_array() {
    assert!(matches!(parse_import(r#"{"videos": []}"#), Err(ImportError::InvalidFormat)));
    assert!(matches!(parse_import(r#"{"playlist": {}}"#), Err(ImportError::InvalidFormat)));
    assert!(matches!(parse_import(r#"[]"#), Err(ImportError::InvalidFormat)));
    assert!(matches!(parse_import("{oops"), Err(ImportError::Parse(_))));
  }

  #[test]
  fn import_accepts_bare_playlist_field() {
    assert!(parse_import(r#"{"playlist": []}"#).unwrap().is_empty());
  }
}
