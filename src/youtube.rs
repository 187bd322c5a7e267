use rand::Rng;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::VideoMetadata;

/// Host substrings that mark a link as a YouTube link.
const YOUTUBE_HOSTS: [&str; 2] = ["youtube.com", "youtu.be"];

/// URL shapes that carry a video id, tried in order. The id follows the prefix.
const VIDEO_ID_PREFIXES: [&str; 4] =
  ["youtube.com/watch?v=", "youtu.be/", "youtube.com/embed/", "m.youtube.com/watch?v="];

/// True if the string mentions a YouTube host anywhere. Path and query are ignored.
pub fn is_youtube_url(url: Option<&str>) -> bool {
  let Some(url) = url else { return false };
  YOUTUBE_HOSTS.iter().any(|host| url.contains(host))
}

/// Extract the canonical video id from a watch, short-link, embed or mobile URL.
///
/// The id runs up to the first `&`, `?` or whitespace. Returns `None` for
/// empty input or when no shape matches.
pub fn extract_video_id(url: Option<&str>) -> Option<String> {
  let url = url.filter(|u| !u.is_empty())?;

  VIDEO_ID_PREFIXES.iter().find_map(|prefix| {
    url.match_indices(prefix).find_map(|(idx, _)| {
      let rest = &url[idx + prefix.len()..];
      let end = rest.find(|c: char| c == '&' || c == '?' || c.is_whitespace()).unwrap_or(rest.len());
      (end > 0).then(|| rest[..end].to_string())
    })
  })
}

/// Record id: `<unix millis>-<9 random base36 chars>`.
pub fn generate_unique_id() -> String {
  let mut rng = rand::thread_rng();
  let suffix: String = (0..9).filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36)).collect();
  format!("{}-{}", chrono::Utc::now().timestamp_millis(), suffix)
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
  title: Option<String>,
  author_name: Option<String>,
  thumbnail_url: Option<String>,
}

impl From<OEmbedResponse> for VideoMetadata {
  fn from(r: OEmbedResponse) -> Self {
    let fallback = VideoMetadata::fallback();
    let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
    VideoMetadata {
      title: non_empty(r.title).unwrap_or(fallback.title),
      channel: non_empty(r.author_name).unwrap_or(fallback.channel),
      thumbnail: r.thumbnail_url.unwrap_or_default(),
    }
  }
}

async fn request_oembed(client: &Client, endpoint: &str, video_url: &str) -> anyhow::Result<OEmbedResponse> {
  let url = Url::parse_with_params(endpoint, &[("url", video_url), ("format", "json")])?;
  debug!(url = %url, "oembed: requesting metadata");
  let response = client.get(url).send().await?;
  if !response.status().is_success() {
    anyhow::bail!("Failed to fetch metadata: {}", response.status());
  }
  Ok(response.json::<OEmbedResponse>().await?)
}

/// Look up title, channel and thumbnail for a video URL.
///
/// Never fails: any network, status or parse error degrades to placeholder metadata.
pub async fn fetch_video_metadata(client: &Client, endpoint: &str, video_url: &str) -> VideoMetadata {
  match request_oembed(client, endpoint, video_url).await {
    Ok(response) => response.into(),
    Err(e) => {
      warn!(url = %video_url, err = %e, "oembed: metadata lookup failed, using placeholders");
      VideoMetadata::fallback()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  // --- is_youtube_url ---

  #[test]
  fn youtube_hosts_are_recognized() {
    assert!(is_youtube_url(Some("https://www.youtube.com/watch?v=abc")));
    assert!(is_youtube_url(Some("https://youtu.be/abc")));
    assert!(is_youtube_url(Some("https://youtube.com/channel/xyz")));
    assert!(is_youtube_url(Some("youtube.com")));
  }

  #[test]
  fn non_youtube_and_absent_are_rejected() {
    assert!(!is_youtube_url(Some("https://vimeo.com/123")));
    assert!(!is_youtube_url(Some("")));
    assert!(!is_youtube_url(None));
  }

  // --- extract_video_id ---

  #[test]
  fn extracts_from_watch_url() {
    assert_eq!(extract_video_id(Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")).as_deref(), Some("dQw4w9WgXcQ"));
    assert_eq!(
      extract_video_id(Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s")).as_deref(),
      Some("dQw4w9WgXcQ")
    );
  }

  #[test]
  fn extracts_from_short_link() {
    assert_eq!(extract_video_id(Some("https://youtu.be/dQw4w9WgXcQ?si=share")).as_deref(), Some("dQw4w9WgXcQ"));
  }

  #[test]
  fn extracts_from_embed_and_mobile() {
    assert_eq!(extract_video_id(Some("https://www.youtube.com/embed/abc_-12")).as_deref(), Some("abc_-12"));
    assert_eq!(extract_video_id(Some("https://m.youtube.com/watch?v=mob1le")).as_deref(), Some("mob1le"));
  }

  #[test]
  fn id_stops_at_whitespace() {
    assert_eq!(extract_video_id(Some("see youtu.be/abc123 later")).as_deref(), Some("abc123"));
  }

  #[test]
  fn malformed_or_foreign_urls_yield_none() {
    assert_eq!(extract_video_id(Some("https://www.youtube.com/channel/UC123")), None);
    assert_eq!(extract_video_id(Some("https://www.youtube.com/watch?v=")), None);
    assert_eq!(extract_video_id(Some("https://vimeo.com/123")), None);
    assert_eq!(extract_video_id(Some("")), None);
    assert_eq!(extract_video_id(None), None);
  }

  // --- generate_unique_id ---

  #[test]
  fn unique_ids_have_millis_and_suffix() {
    let id = generate_unique_id();
    let (millis, suffix) = id.split_once('-').unwrap();
    assert!(millis.parse::<i64>().is_ok());
    assert_eq!(suffix.len(), 9);
    assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    assert_ne!(generate_unique_id(), generate_unique_id());
  }

  // --- fetch_video_metadata ---

  /// Serve exactly one canned HTTP response on a local port; returns the endpoint URL.
  async fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 4096];
      let _ = socket.read(&mut buf).await;
      let response =
        format!("HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}", status, body.len(), body);
      let _ = socket.write_all(response.as_bytes()).await;
      let _ = socket.shutdown().await;
    });
    format!("http://{}/oembed", addr)
  }

  #[tokio::test]
  async fn metadata_from_successful_response() {
    let endpoint = serve_once(
      "200 OK",
      r#"{"title":"Talk","author_name":"Conf","thumbnail_url":"https://i.ytimg.com/vi/x/hqdefault.jpg"}"#,
    )
    .await;
    let meta = fetch_video_metadata(&Client::new(), &endpoint, "https://youtu.be/x").await;
    assert_eq!(meta.title, "Talk");
    assert_eq!(meta.channel, "Conf");
    assert_eq!(meta.thumbnail, "https://i.ytimg.com/vi/x/hqdefault.jpg");
  }

  #[tokio::test]
  async fn metadata_falls_back_on_error_status() {
    let endpoint = serve_once("404 Not Found", "{}").await;
    let meta = fetch_video_metadata(&Client::new(), &endpoint, "https://youtu.be/x").await;
    assert_eq!(meta, VideoMetadata::fallback());
  }

  #[tokio::test]
  async fn metadata_falls_back_on_bad_json() {
    let endpoint = serve_once("200 OK", "not json").await;
    let meta = fetch_video_metadata(&Client::new(), &endpoint, "https://youtu.be/x").await;
    assert_eq!(meta, VideoMetadata::fallback());
  }

  #[tokio::test]
  async fn metadata_falls_back_per_missing_field() {
    let endpoint = serve_once("200 OK", r#"{"title":"Only title"}"#).await;
    let meta = fetch_video_metadata(&Client::new(), &endpoint, "https://youtu.be/x").await;
    assert_eq!(meta.title, "Only title");
    assert_eq!(meta.channel, "Unknown Channel");
    assert_eq!(meta.thumbnail, "");
  }

  #[tokio::test]
  async fn metadata_falls_back_when_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let endpoint = format!("http://{}/oembed", addr);
    let meta = fetch_video_metadata(&Client::new(), &endpoint, "https://youtu.be/x").await;
    assert_eq!(meta, VideoMetadata::fallback());
  }
}
