//! Acquisition backends and the dispatcher.
//!
//! Every backend exposes the same contract: turn a classified link into
//! local media file(s) or a typed [`AcquisitionError`]. The dispatcher owns
//! one backend per [`ContentKind`] and performs no retries of its own;
//! retry semantics differ per transport and live inside each backend.

/// Audio-track backend (external tool)
pub mod audio;
/// External command abstraction with hard timeout
pub mod command;
/// Photo-set backend (scraping aggregator)
pub mod photoset;
/// Reel backend (conversion API + downloader fallback)
pub mod reel;
/// Short-video backend (CDN mirror)
pub mod video;

use crate::config::Settings;
use crate::links::ContentKind;
use crate::scratch::Scratch;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Normalized result of a successful acquisition.
///
/// Every path referenced here exists on local scratch storage at the moment
/// the value is constructed; ownership passes to cleanup once delivery has
/// been attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// A single video file
    Video {
        /// Path of the downloaded video
        local_path: PathBuf,
    },
    /// An ordered photo set, optionally with its soundtrack
    PhotoAlbum {
        /// Photo paths in source presentation order
        local_paths: Vec<PathBuf>,
        /// Soundtrack path, when the aggregator exposed one
        audio_path: Option<PathBuf>,
    },
    /// A single audio file
    Audio {
        /// Path of the downloaded track
        local_path: PathBuf,
    },
}

impl Acquired {
    /// All local paths referenced by this result, in delivery order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        let list: Vec<&Path> = match self {
            Self::Video { local_path } | Self::Audio { local_path } => {
                vec![local_path.as_path()]
            }
            Self::PhotoAlbum {
                local_paths,
                audio_path,
            } => local_paths
                .iter()
                .map(PathBuf::as_path)
                .chain(audio_path.iter().map(PathBuf::as_path))
                .collect(),
        };
        list.into_iter()
    }
}

/// Typed acquisition failure. Aborts the current message's pipeline only.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The link carries no retrievable content (bad id, 404)
    #[error("content not found for link")]
    NotFound,
    /// A backend network call or subprocess exceeded its time budget
    #[error("backend timed out")]
    BackendTimeout,
    /// The backend answered but refused to produce usable media
    #[error("backend rejected the request: {0}")]
    BackendRejected(String),
    /// Local filesystem failure, including ambiguous tool output
    #[error("local I/O failure")]
    LocalIo(#[from] std::io::Error),
}

/// Map an HTTP client error onto the acquisition taxonomy.
pub(crate) fn map_http_error(err: &reqwest::Error) -> AcquisitionError {
    if err.is_timeout() || err.is_connect() {
        AcquisitionError::BackendTimeout
    } else {
        AcquisitionError::BackendRejected(err.to_string())
    }
}

/// Capability contract shared by the dispatcher and test doubles.
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Acquire the media behind a classified link.
    async fn acquire(&self, kind: ContentKind, link: &str)
        -> Result<Acquired, AcquisitionError>;
}

/// Routes a classified link to the backend registered for its kind.
pub struct Dispatcher {
    video: video::VideoBackend,
    photos: photoset::PhotoSetBackend,
    reel: reel::ReelBackend,
    audio: audio::AudioTrackBackend,
}

impl Dispatcher {
    /// Build all backends from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client or header profile is invalid.
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(crate::config::ACQUIRE_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            video: video::VideoBackend::new(
                http.clone(),
                settings.video_cdn_base.clone(),
                &settings.video_headers,
                Scratch::new(&settings.video_dir),
            )?,
            photos: photoset::PhotoSetBackend::new(
                http.clone(),
                photoset::AggregatorConfig {
                    api_url: settings.slide_api_url.clone(),
                    prefix: settings.slide_api_prefix.clone(),
                    image_host: settings.slide_image_host.clone(),
                    audio_host: settings.slide_audio_host.clone(),
                },
                Scratch::new(&settings.image_dir),
            ),
            reel: reel::ReelBackend::new(
                http,
                settings.reel_api_url.clone(),
                settings.reel_fallback_tool.clone(),
                Scratch::new(&settings.video_dir),
            ),
            audio: audio::AudioTrackBackend::new(
                settings.audio_tool.clone(),
                settings.audio_sources(),
                Scratch::new(&settings.audio_dir),
            ),
        })
    }
}

#[async_trait]
impl Acquirer for Dispatcher {
    async fn acquire(
        &self,
        kind: ContentKind,
        link: &str,
    ) -> Result<Acquired, AcquisitionError> {
        match kind {
            ContentKind::ShortVideo => self.video.fetch(link).await,
            ContentKind::PhotoSet => self.photos.fetch(link).await,
            ContentKind::Reel => self.reel.fetch(link).await,
            ContentKind::AudioTrack => self.audio.fetch(link).await,
            ContentKind::Unrecognized => Err(AcquisitionError::NotFound),
        }
    }
}
