//! Link extraction from free-form chat text.
//!
//! Categories are probed in a fixed priority order expressed as a rule
//! table; the first category with a match contributes the working link and
//! the rest are ignored. Matching uses exact structural patterns (scheme +
//! host + path shape), never substring search.

use crate::config::RESOLVE_TIMEOUT_SECS;
use lazy_regex::lazy_regex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Short-form redirect: `https://vm.tiktok.com/<token>`
static RE_SHORT: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"https://vm\.tiktok\.com/[A-Za-z0-9]+");

/// Long-form video: `https://www.tiktok.com/@<user>/video/<digits>`
static RE_VIDEO: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"https://www\.tiktok\.com/@[^/\s]+/video/[0-9]+");

/// Photo post: `https://www.tiktok.com/@<user>/photo/<digits>`
static RE_PHOTO: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"https://www\.tiktok\.com/@[^/\s]+/photo/[0-9]+");

/// Reel: `https://www.instagram.com/reel/<token>`
static RE_REEL: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"https://www\.instagram\.com/reel/[A-Za-z0-9_-]+");

/// Audio track: `https://open.spotify.com/track/<id>[?si=…]`
static RE_TRACK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"https://open\.spotify\.com/track/[A-Za-z0-9]+(\?si=[A-Za-z0-9]+)?");

/// Which extraction rule produced a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCategory {
    /// Redirect link that must be resolved before classification
    ShortRedirect,
    /// Direct long-form video link
    Video,
    /// Direct photo-post link
    Photo,
    /// Reel link
    Reel,
    /// Audio-track link
    AudioTrack,
}

/// A link found in message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// The matched URL, exactly as it appeared
    pub url: String,
    /// Byte offset of the match in the original text
    pub offset: usize,
    /// The rule that matched
    pub category: LinkCategory,
}

/// Ordered rule table. Earlier entries win when a message contains links of
/// several categories; order here is the single source of truth for
/// extraction priority.
fn link_rules() -> [(LinkCategory, &'static regex::Regex); 5] {
    [
        (LinkCategory::ShortRedirect, &RE_SHORT),
        (LinkCategory::Video, &RE_VIDEO),
        (LinkCategory::Photo, &RE_PHOTO),
        (LinkCategory::Reel, &RE_REEL),
        (LinkCategory::AudioTrack, &RE_TRACK),
    ]
}

/// Scan `text` for the highest-priority recognized link.
///
/// Returns `None` when no rule matches; that is not an error, the message
/// simply carries nothing for the pipeline.
#[must_use]
pub fn extract_link(text: &str) -> Option<ExtractedLink> {
    for (category, pattern) in link_rules() {
        if let Some(found) = pattern.find(text) {
            debug!(category = ?category, url = found.as_str(), "Matched link rule");
            return Some(ExtractedLink {
                url: found.as_str().to_string(),
                offset: found.start(),
                category,
            });
        }
    }
    None
}

/// Failure to resolve a short redirect link.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The redirect-following request itself failed
    #[error("redirect resolution failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Resolves short redirect links by following redirects with a bounded
/// timeout.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    client: reqwest::Client,
}

impl LinkResolver {
    /// Build a resolver with the 5 s connect/read budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(RESOLVE_TIMEOUT_SECS))
            .timeout(Duration::from_secs(RESOLVE_TIMEOUT_SECS))
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self { client })
    }

    /// Follow the redirect chain of `short_url` and return the final URL.
    ///
    /// Retries the request once on failure; resolution failure is the only
    /// error surface and the caller drops the message on it.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when both attempts fail.
    pub async fn resolve(&self, short_url: &str) -> Result<String, ResolveError> {
        info!(url = short_url, "Resolving short link");
        let resolved = match self.follow(short_url).await {
            Ok(url) => url,
            Err(e) => {
                warn!(url = short_url, error = %e, "Short link resolution failed, retrying once");
                self.follow(short_url).await?
            }
        };
        info!(url = short_url, resolved = %resolved, "Short link resolved");
        Ok(resolved)
    }

    async fn follow(&self, short_url: &str) -> Result<String, reqwest::Error> {
        let response = self.client.get(short_url).send().await?;
        Ok(response.url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_each_category() {
        let cases = [
            ("https://vm.tiktok.com/ZM2abc9/", LinkCategory::ShortRedirect),
            (
                "https://www.tiktok.com/@user/video/123456",
                LinkCategory::Video,
            ),
            (
                "https://www.tiktok.com/@user/photo/123456",
                LinkCategory::Photo,
            ),
            (
                "https://www.instagram.com/reel/Cx1_-abc",
                LinkCategory::Reel,
            ),
            (
                "https://open.spotify.com/track/11dFghVXANMlKmJXsNCbNl?si=f00",
                LinkCategory::AudioTrack,
            ),
        ];
        for (url, category) in cases {
            let text = format!("check this {url} out");
            let link = extract_link(&text);
            match link {
                Some(found) => {
                    assert_eq!(found.category, category, "category for {url}");
                    assert!(url.starts_with(&found.url), "match for {url}");
                    assert_eq!(found.offset, 11);
                }
                None => panic!("no link extracted from {text}"),
            }
        }
    }

    #[test]
    fn test_extract_priority_order() {
        // Short redirect beats a direct video link even when it appears later
        let text = "first https://www.tiktok.com/@user/video/1 then https://vm.tiktok.com/Zabc1";
        let link = extract_link(text);
        assert_eq!(
            link.map(|l| l.category),
            Some(LinkCategory::ShortRedirect)
        );

        // Video beats photo
        let text = "a https://www.tiktok.com/@u/photo/2 b https://www.tiktok.com/@u/video/3";
        let link = extract_link(text);
        assert_eq!(link.map(|l| l.category), Some(LinkCategory::Video));
    }

    #[test]
    fn test_extract_nothing_from_plain_text() {
        assert_eq!(extract_link("just words, no links"), None);
        // Structurally wrong links do not match
        assert_eq!(extract_link("https://tiktok.com/@user/video/1"), None);
        assert_eq!(extract_link("http://vm.tiktok.com/Zabc"), None);
    }

    #[test]
    fn test_extract_exactly_one_link() {
        let text = "check this https://www.tiktok.com/@user/video/123456";
        let link = extract_link(text);
        assert_eq!(
            link,
            Some(ExtractedLink {
                url: "https://www.tiktok.com/@user/video/123456".to_string(),
                offset: 11,
                category: LinkCategory::Video,
            })
        );
    }
}
