//! Reel backend.
//!
//! Primary path: a conversion API that answers with a direct media URL to
//! stream. Fallback path: the external downloader tool keyed by the reel
//! shortcode, under a hard 120 s wall-clock timeout with forced kill.

use crate::config::REEL_SUBPROCESS_TIMEOUT_SECS;
use crate::fetch::command::{CommandError, ExternalCommand};
use crate::fetch::{map_http_error, Acquired, AcquisitionError};
use crate::scratch::Scratch;
use futures_util::StreamExt;
use lazy_regex::lazy_regex;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Capture the shortcode of a reel link.
static RE_SHORTCODE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"instagram\.com/reel/([A-Za-z0-9_-]+)");

/// Extract the reel shortcode from a link.
#[must_use]
pub fn extract_shortcode(link: &str) -> Option<&str> {
    RE_SHORTCODE
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Pull the direct media URL out of a conversion API response.
#[must_use]
pub fn parse_direct_url(body: &serde_json::Value) -> Option<String> {
    body.get("url")
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}

/// Backend for reels.
pub struct ReelBackend {
    client: reqwest::Client,
    api_url: String,
    fallback_tool: String,
    scratch: Scratch,
}

impl ReelBackend {
    /// Build the backend.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        fallback_tool: String,
        scratch: Scratch,
    ) -> Self {
        Self {
            client,
            api_url,
            fallback_tool,
            scratch,
        }
    }

    /// Fetch the reel behind `link`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no shortcode can be derived; `BackendTimeout` when
    /// the fallback tool exceeds its budget; `BackendRejected` otherwise.
    pub async fn fetch(&self, link: &str) -> Result<Acquired, AcquisitionError> {
        let shortcode = extract_shortcode(link).ok_or(AcquisitionError::NotFound)?;

        match self.fetch_via_api(link, shortcode).await {
            Ok(acquired) => Ok(acquired),
            Err(api_err) => {
                warn!(
                    shortcode,
                    error = %api_err,
                    "Conversion API failed, falling back to downloader tool"
                );
                self.fetch_via_tool(shortcode).await
            }
        }
    }

    async fn fetch_via_api(
        &self,
        link: &str,
        shortcode: &str,
    ) -> Result<Acquired, AcquisitionError> {
        let body = serde_json::json!({
            "url": link,
            "vCodec": "h264",
            "vQuality": "720",
            "aFormat": "mp3",
        });
        info!(shortcode, api = %self.api_url, "Requesting reel from conversion API");

        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error(&e))?;

        if !response.status().is_success() {
            return Err(AcquisitionError::BackendRejected(format!(
                "conversion API answered {}",
                response.status()
            )));
        }

        let payload: serde_json::Value =
            response.json().await.map_err(|e| map_http_error(&e))?;
        let direct_url = parse_direct_url(&payload).ok_or_else(|| {
            AcquisitionError::BackendRejected("conversion API response had no url".to_string())
        })?;

        self.scratch.ensure().await?;
        let local_path = self.scratch.keyed_file(&format!("reel_{shortcode}"), "mp4");
        self.stream_to(&direct_url, &local_path).await?;

        info!(shortcode, path = %local_path.display(), "Reel downloaded via API");
        Ok(Acquired::Video { local_path })
    }

    async fn fetch_via_tool(&self, shortcode: &str) -> Result<Acquired, AcquisitionError> {
        self.scratch.ensure().await?;
        let dir = self.scratch.unique_dir("reel").await?;
        let dir_str = dir.to_string_lossy().into_owned();

        let result = ExternalCommand::new(&self.fallback_tool)
            .arg("--no-metadata-json")
            .arg("--no-captions")
            .arg(format!("--dirname-pattern={dir_str}"))
            .arg("--")
            .arg(format!("-{shortcode}"))
            .timeout(Duration::from_secs(REEL_SUBPROCESS_TIMEOUT_SECS))
            .run()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(CommandError::Timeout { .. }) => return Err(AcquisitionError::BackendTimeout),
            Err(CommandError::Io { source, .. }) => {
                return Err(AcquisitionError::LocalIo(source))
            }
        };

        if !output.success {
            return Err(AcquisitionError::BackendRejected(format!(
                "downloader exited with {:?}: {}",
                output.code,
                output.stderr.trim()
            )));
        }

        let local_path = find_first_mp4(&dir).await?.ok_or_else(|| {
            AcquisitionError::BackendRejected("downloader produced no video file".to_string())
        })?;

        info!(shortcode, path = %local_path.display(), "Reel downloaded via tool");
        Ok(Acquired::Video { local_path })
    }

    async fn stream_to(
        &self,
        url: &str,
        target: &std::path::Path,
    ) -> Result<(), AcquisitionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_http_error(&e))?;
        if !response.status().is_success() {
            return Err(AcquisitionError::BackendRejected(format!(
                "media download answered {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_http_error(&e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// First `.mp4` file inside `dir`, if any.
async fn find_first_mp4(dir: &std::path::Path) -> Result<Option<PathBuf>, AcquisitionError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("mp4") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_shortcode() {
        assert_eq!(
            extract_shortcode("https://www.instagram.com/reel/Cx1_-abc"),
            Some("Cx1_-abc")
        );
        assert_eq!(extract_shortcode("https://www.instagram.com/p/Cx1/"), None);
    }

    #[test]
    fn test_parse_direct_url() {
        let body = serde_json::json!({"status": "stream", "url": "https://cdn.example/v.mp4"});
        assert_eq!(
            parse_direct_url(&body).as_deref(),
            Some("https://cdn.example/v.mp4")
        );

        let body = serde_json::json!({"status": "error", "text": "no"});
        assert_eq!(parse_direct_url(&body), None);
    }

    #[tokio::test]
    async fn test_find_first_mp4() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        assert!(find_first_mp4(tmp.path()).await?.is_none());

        tokio::fs::write(tmp.path().join("note.txt"), b"x").await?;
        tokio::fs::write(tmp.path().join("clip.mp4"), b"x").await?;
        let found = find_first_mp4(tmp.path()).await?;
        assert_eq!(
            found.and_then(|p| p.file_name().map(std::ffi::OsStr::to_os_string)),
            Some(std::ffi::OsString::from("clip.mp4"))
        );
        Ok(())
    }
}
