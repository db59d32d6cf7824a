//! Photo-set backend.
//!
//! Posts the link to a scraping aggregator, parses the HTML fragment it
//! returns for image links and one audio-download link, then downloads the
//! images sequentially into a per-request scratch directory. Partial
//! success is allowed: individual image failures are skipped; zero images
//! is a rejection.

use crate::fetch::{map_http_error, Acquired, AcquisitionError};
use crate::scratch::Scratch;
use scraper::{Html, Selector};
use std::path::PathBuf;
use tracing::{info, warn};

/// Aggregator endpoint configuration.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Form POST endpoint
    pub api_url: String,
    /// Opaque form prefix the endpoint expects
    pub prefix: String,
    /// Host fragment identifying usable image links
    pub image_host: String,
    /// Host fragment identifying the audio link
    pub audio_host: String,
}

/// Links harvested from one aggregator response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SlideListing {
    /// Image URLs in presentation order
    pub images: Vec<String>,
    /// The audio-download URL, when present
    pub audio: Option<String>,
}

/// Parse the aggregator's HTML fragment.
///
/// Images are `img[src]` elements on the configured CDN host, kept in
/// document order (which matches the post's slide order). The audio link is
/// the last `a[href*="download?token="]` anchor on the audio host.
#[must_use]
pub fn parse_listing(html: &str, image_host: &str, audio_host: &str) -> SlideListing {
    let doc = Html::parse_document(html);
    let mut listing = SlideListing::default();

    if let Ok(selector) = Selector::parse("img[src]") {
        for element in doc.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                if src.contains(image_host) {
                    listing.images.push(src.to_string());
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse(r#"a[href*="download?token="]"#) {
        listing.audio = doc
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .filter(|href| href.contains(audio_host))
            .last()
            .map(String::from);
    }

    listing
}

/// Backend for photo posts (slide shows).
pub struct PhotoSetBackend {
    client: reqwest::Client,
    config: AggregatorConfig,
    scratch: Scratch,
}

impl PhotoSetBackend {
    /// Build the backend.
    #[must_use]
    pub fn new(client: reqwest::Client, config: AggregatorConfig, scratch: Scratch) -> Self {
        Self {
            client,
            config,
            scratch,
        }
    }

    /// Fetch the photo set behind `link`.
    ///
    /// # Errors
    ///
    /// `BackendRejected` when the aggregator fails or yields zero images;
    /// audio download failure only drops the soundtrack.
    pub async fn fetch(&self, link: &str) -> Result<Acquired, AcquisitionError> {
        let html = self.query_aggregator(link).await?;
        let listing = parse_listing(&html, &self.config.image_host, &self.config.audio_host);
        info!(
            images = listing.images.len(),
            has_audio = listing.audio.is_some(),
            "Aggregator response parsed"
        );

        if listing.images.is_empty() {
            return Err(AcquisitionError::BackendRejected(
                "aggregator response contained no images".to_string(),
            ));
        }

        self.scratch.ensure().await?;
        let dir = self.scratch.unique_dir("slides").await?;

        // Sequential downloads; order of local_paths must match the
        // listing order, it drives album presentation order.
        let mut local_paths = Vec::new();
        for (index, image_url) in listing.images.iter().enumerate() {
            let target = dir.join(format!("{index:02}.jpg"));
            match self.download_to(image_url, &target).await {
                Ok(()) => local_paths.push(target),
                Err(e) => {
                    warn!(image_url = %image_url, error = %e, "Skipping failed image download");
                }
            }
        }

        if local_paths.is_empty() {
            return Err(AcquisitionError::BackendRejected(
                "every image download failed".to_string(),
            ));
        }

        let audio_path = match listing.audio {
            Some(ref audio_url) => {
                let target = dir.join("soundtrack.mp3");
                match self.download_to(audio_url, &target).await {
                    Ok(()) => Some(target),
                    Err(e) => {
                        warn!(audio_url = %audio_url, error = %e, "Soundtrack download failed");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Acquired::PhotoAlbum {
            local_paths,
            audio_path,
        })
    }

    async fn query_aggregator(&self, link: &str) -> Result<String, AcquisitionError> {
        let form = [("prefix", self.config.prefix.as_str()), ("vid", link)];
        let response = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| map_http_error(&e))?;

        if !response.status().is_success() {
            return Err(AcquisitionError::BackendRejected(format!(
                "aggregator answered {}",
                response.status()
            )));
        }

        response.text().await.map_err(|e| map_http_error(&e))
    }

    async fn download_to(
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
                "download answered {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(|e| map_http_error(&e))?;
        tokio::fs::write(target, &bytes).await?;
        Ok(())
    }
}

/// Paths produced by one photo-set acquisition all live in one per-request
/// directory; exposing it lets cleanup remove the directory afterwards.
#[must_use]
pub fn album_dir(paths: &[PathBuf]) -> Option<&std::path::Path> {
    paths.first().and_then(|p| p.parent())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <div id="result">
          <img src="https://p16-sign.tiktokcdn-us.example/one~tplv.jpeg">
          <img src="https://ads.example/banner.png">
          <img src="https://p16-sign.tiktokcdn-us.example/two~tplv.jpeg">
          <a href="https://cdn.tiktokio.example/download?token=aaa">Download MP3 (A)</a>
          <a href="https://cdn.tiktokio.example/download?token=bbb">Download MP3 (B)</a>
          <a href="https://elsewhere.example/download?token=ccc">Other</a>
        </div>"#;

    #[test]
    fn test_parse_listing_filters_and_orders() {
        let listing = parse_listing(SAMPLE, "tiktokcdn", "tiktokio");
        assert_eq!(
            listing.images,
            vec![
                "https://p16-sign.tiktokcdn-us.example/one~tplv.jpeg",
                "https://p16-sign.tiktokcdn-us.example/two~tplv.jpeg",
            ]
        );
        // Last matching audio anchor wins
        assert_eq!(
            listing.audio.as_deref(),
            Some("https://cdn.tiktokio.example/download?token=bbb")
        );
    }

    #[test]
    fn test_parse_listing_empty_response() {
        let listing = parse_listing("<html><body>nothing here</body></html>", "tiktokcdn", "tiktokio");
        assert!(listing.images.is_empty());
        assert_eq!(listing.audio, None);
    }

    #[test]
    fn test_album_dir() {
        let paths = vec![PathBuf::from("scratch/slides_ab/00.jpg")];
        assert_eq!(album_dir(&paths), Some(std::path::Path::new("scratch/slides_ab")));
        assert_eq!(album_dir(&[]), None);
    }
}
