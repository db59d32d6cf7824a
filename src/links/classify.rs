//! Classification of resolved links into content kinds.

use lazy_regex::lazy_regex;

/// Match a long-form video link: `…tiktok.com/@<user>/video/<digits>`
static RE_VIDEO: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^https://www\.tiktok\.com/@[^/]+/video/[0-9]+");

/// Match a photo post link: `…tiktok.com/@<user>/photo/<digits>`
static RE_PHOTO: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^https://www\.tiktok\.com/@[^/]+/photo/[0-9]+");

/// Match a reel link: `…instagram.com/reel/<token>`
static RE_REEL: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^https://www\.instagram\.com/reel/[A-Za-z0-9_-]+");

/// Match an audio track link: `…open.spotify.com/track/<id>`
static RE_TRACK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^https://open\.spotify\.com/track/[A-Za-z0-9]+");

/// The acquisition strategy a link maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// A single short-form video, fetched through the CDN mirror
    ShortVideo,
    /// A photo post (slide show), fetched through the scraping aggregator
    PhotoSet,
    /// A reel, fetched through the conversion API or the downloader tool
    Reel,
    /// An audio track, fetched through the audio-fetch tool
    AudioTrack,
    /// No registered backend; the pipeline stops here
    Unrecognized,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ShortVideo => "short-video",
            Self::PhotoSet => "photo-set",
            Self::Reel => "reel",
            Self::AudioTrack => "audio-track",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// Map a resolved link to its [`ContentKind`].
///
/// Pure function of the URL's host and path shape; trailing query
/// parameters (common on resolved short links) are ignored.
#[must_use]
pub fn classify(link: &str) -> ContentKind {
    if RE_VIDEO.is_match(link) {
        ContentKind::ShortVideo
    } else if RE_PHOTO.is_match(link) {
        ContentKind::PhotoSet
    } else if RE_REEL.is_match(link) {
        ContentKind::Reel
    } else if RE_TRACK.is_match(link) {
        ContentKind::AudioTrack
    } else {
        ContentKind::Unrecognized
    }
}
