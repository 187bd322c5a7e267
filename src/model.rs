//! Persisted record types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::constants;

/// One playlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
  /// Unique within the playlist.
  pub id: String,
  pub url: String,
  /// Canonical YouTube id. Several records may share one.
  pub video_id: String,
  pub title: String,
  pub channel: String,
  pub thumbnail: String,
  #[serde(with = "iso_millis")]
  pub added_at: DateTime<Utc>,
  #[serde(with = "iso_millis_opt", default)]
  pub seen_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
  pub fn is_seen(&self) -> bool {
    self.seen_at.is_some()
  }
}

/// Title/channel/thumbnail triple from the metadata endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
  pub title: String,
  pub channel: String,
  pub thumbnail: String,
}

impl VideoMetadata {
  pub fn fallback() -> Self {
    Self {
      title: constants().fallback_title.clone(),
      channel: constants().fallback_channel.clone(),
      thumbnail: String::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
  pub pagination_size: u32,
}

impl Default for Settings {
  fn default() -> Self {
    Self { pagination_size: constants().default_page_size }
  }
}

/// Format a timestamp the way it is persisted: `2024-05-01T10:00:00.000Z`.
pub fn to_iso(ts: &DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time truncated to millisecond precision, so a stored value reads back unchanged.
pub fn now_millis() -> DateTime<Utc> {
  let now = Utc::now();
  DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

mod iso_millis {
  use super::*;

  pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_iso(ts))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    DateTime::parse_from_rfc3339(&raw).map(|t| t.with_timezone(&Utc)).map_err(serde::de::Error::custom)
  }
}

mod iso_millis_opt {
  use super::*;

  pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match ts {
      Some(ts) => s.serialize_some(&to_iso(ts)),
      None => s.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    raw
      .filter(|s| !s.is_empty())
      .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)).map_err(serde::de::Error::custom))
      .transpose()
  }
}
