//! Short-video backend.
//!
//! Derives the numeric content id from the link, asks the resolving CDN
//! mirror for the raw file with a browser-like header profile, and streams
//! the body to `<video_dir>/<id>.mp4`.

use crate::config::HeaderProfile;
use crate::fetch::{map_http_error, Acquired, AcquisitionError};
use crate::scratch::Scratch;
use futures_util::StreamExt;
use lazy_regex::lazy_regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Capture the numeric id of a long-form video link.
static RE_VIDEO_ID: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?:https?://)?(?:www\.)?tiktok\.com/[^/]+/video/([0-9]+)");

/// Extract the content identifier from a resolved video link.
#[must_use]
pub fn extract_video_id(link: &str) -> Option<&str> {
    RE_VIDEO_ID
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Backend for single short-form videos.
pub struct VideoBackend {
    client: reqwest::Client,
    cdn_base: String,
    headers: HeaderMap,
    scratch: Scratch,
}

impl VideoBackend {
    /// Build the backend with a pre-validated header profile.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header value is malformed.
    pub fn new(
        client: reqwest::Client,
        cdn_base: String,
        profile: &HeaderProfile,
        scratch: Scratch,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            cdn_base,
            headers: build_headers(profile)?,
            scratch,
        })
    }

    /// Fetch the video behind `link`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no id can be derived or the mirror answers 404;
    /// `BackendRejected` on any other non-2xx status or a non-video body.
    pub async fn fetch(&self, link: &str) -> Result<Acquired, AcquisitionError> {
        let video_id = extract_video_id(link).ok_or(AcquisitionError::NotFound)?;
        let url = format!("{}/{}", self.cdn_base.trim_end_matches('/'), video_id);
        info!(video_id, url = %url, "Requesting video from CDN mirror");

        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| map_http_error(&e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AcquisitionError::NotFound);
        }
        if !response.status().is_success() {
            return Err(AcquisitionError::BackendRejected(format!(
                "mirror answered {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_video_content_type(&content_type) {
            warn!(video_id, content_type = %content_type, "Mirror returned non-video body");
            return Err(AcquisitionError::BackendRejected(format!(
                "unexpected content type `{content_type}`"
            )));
        }

        self.scratch.ensure().await?;
        let local_path = self.scratch.keyed_file(video_id, "mp4");
        let mut file = tokio::fs::File::create(&local_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_http_error(&e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(video_id, path = %local_path.display(), "Video downloaded");
        Ok(Acquired::Video { local_path })
    }
}

/// Accept anything the mirrors actually serve for raw clips.
fn is_video_content_type(content_type: &str) -> bool {
    content_type.starts_with("video/") || content_type.starts_with("application/octet-stream")
}

fn build_headers(profile: &HeaderProfile) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(&profile.user_agent)?);
    headers.insert(ACCEPT, HeaderValue::from_str(&profile.accept)?);
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&profile.accept_language)?,
    );
    if !profile.referer.is_empty() {
        headers.insert(
            HeaderName::from_static("referer"),
            HeaderValue::from_str(&profile.referer)?,
        );
    }
    if !profile.origin.is_empty() {
        headers.insert(
            HeaderName::from_static("origin"),
            HeaderValue::from_str(&profile.origin)?,
        );
    }
    Ok(headers)
}
