//! Configuration and settings management
//!
//! Loads settings from environment variables and defines pipeline constants.
//! Backend endpoints, header profiles and tool names are configuration, not
//! structural logic: operators swap them without touching the dispatch code.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Browser-like header profile applied to CDN mirror requests.
///
/// Mirrors historically rotate which headers they require, so the whole set
/// lives in configuration rather than in the backend itself.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HeaderProfile {
    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Accept header value
    #[serde(default = "default_accept")]
    pub accept: String,
    /// Accept-Language header value
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    /// Referer header value (empty = omitted)
    #[serde(default)]
    pub referer: String,
    /// Origin header value (empty = omitted)
    #[serde(default)]
    pub origin: String,
}

impl Default for HeaderProfile {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            referer: String::new(),
            origin: String::new(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0".to_string()
}

fn default_accept() -> String {
    "*/*".to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.5".to_string()
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(default)]
    pub telegram_token: String,

    /// Directory for downloaded video files
    #[serde(default = "default_video_dir")]
    pub video_dir: String,
    /// Directory for downloaded audio tracks
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
    /// Directory for downloaded photo sets
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// Directory for transcoding outputs
    #[serde(default = "default_convert_dir")]
    pub convert_dir: String,

    /// Base URL of the resolving CDN mirror for short videos
    #[serde(default = "default_video_cdn_base")]
    pub video_cdn_base: String,
    /// Header profile sent with CDN mirror requests
    #[serde(default)]
    pub video_headers: HeaderProfile,

    /// Scraping aggregator endpoint for photo posts
    #[serde(default = "default_slide_api_url")]
    pub slide_api_url: String,
    /// Opaque form prefix the aggregator expects
    #[serde(default = "default_slide_api_prefix")]
    pub slide_api_prefix: String,
    /// Host fragment identifying image links in the aggregator response
    #[serde(default = "default_slide_image_host")]
    pub slide_image_host: String,
    /// Host fragment identifying the audio link in the aggregator response
    #[serde(default = "default_slide_audio_host")]
    pub slide_audio_host: String,

    /// Conversion API endpoint for reels
    #[serde(default = "default_reel_api_url")]
    pub reel_api_url: String,
    /// External downloader used when the conversion API fails
    #[serde(default = "default_reel_fallback_tool")]
    pub reel_fallback_tool: String,

    /// External audio-fetch tool
    #[serde(default = "default_audio_tool")]
    pub audio_tool: String,
    /// Fallback source list passed to the audio-fetch tool, comma-separated
    #[serde(rename = "audio_sources", default = "default_audio_sources")]
    pub audio_sources_str: String,
}

fn default_video_dir() -> String {
    "downloads/video".to_string()
}

fn default_audio_dir() -> String {
    "downloads/audio".to_string()
}

fn default_image_dir() -> String {
    "downloads/images".to_string()
}

fn default_convert_dir() -> String {
    "downloads/convert".to_string()
}

fn default_video_cdn_base() -> String {
    "https://tikcdn.io/ssstik".to_string()
}

fn default_slide_api_url() -> String {
    "https://tiktokio.cc/api/v1/tk-htmx".to_string()
}

fn default_slide_api_prefix() -> String {
    "dtGslxrcdcG9raW8uY2MO0O0O".to_string()
}

fn default_slide_image_host() -> String {
    "tiktokcdn".to_string()
}

fn default_slide_audio_host() -> String {
    "tiktokio".to_string()
}

fn default_reel_api_url() -> String {
    "https://api.cobalt.tools/api/json".to_string()
}

fn default_reel_fallback_tool() -> String {
    "instaloader".to_string()
}

fn default_audio_tool() -> String {
    "spotdl".to_string()
}

fn default_audio_sources() -> String {
    "soundcloud,slider-kz,bandcamp,piped".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or no bot token is present.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check the token env var directly if config didn't pick it up
        if settings.telegram_token.is_empty() {
            if let Ok(val) = std::env::var("TELEGRAM_TOKEN") {
                if !val.is_empty() {
                    settings.telegram_token = val;
                }
            }
        }

        if settings.telegram_token.is_empty() {
            return Err(ConfigError::NotFound("telegram_token".to_string()));
        }

        Ok(settings)
    }

    /// Returns the fallback source list for the audio-fetch tool
    #[must_use]
    pub fn audio_sources(&self) -> Vec<String> {
        self.audio_sources_str
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// Telegram media group capacity (platform limit)
pub const MEDIA_GROUP_CAPACITY: usize = 10;

/// Connect/read timeout for short-link resolution, seconds
pub const RESOLVE_TIMEOUT_SECS: u64 = 5;
/// Timeout for acquisition HTTP calls (CDN mirror, aggregator, reel API), seconds
pub const ACQUIRE_HTTP_TIMEOUT_SECS: u64 = 60;
/// Hard wall-clock timeout for the reel downloader subprocess, seconds
pub const REEL_SUBPROCESS_TIMEOUT_SECS: u64 = 120;
/// Hard wall-clock timeout for the audio-fetch subprocess, seconds
pub const AUDIO_SUBPROCESS_TIMEOUT_SECS: u64 = 300;
/// Hard wall-clock timeout for ffmpeg conversions, seconds
pub const CONVERT_TIMEOUT_SECS: u64 = 60;

// Telegram API retry configuration
/// Initial backoff delay for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff delay for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum retry attempts for Telegram API operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
