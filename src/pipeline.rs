//! The per-message processing pipeline.
//!
//! One message flows strictly sequentially through extract → classify →
//! acquire → deliver → cleanup. Failures are contained to the message being
//! processed; the only user-visible notice is for clearly actionable cases.
//! Every path of an [`Acquired`] value is released exactly once, after the
//! delivery attempt, regardless of outcome.

use crate::bot::batcher::MediaBatcher;
use crate::bot::gateway::{DeliveryError, MediaGateway};
use crate::fetch::{photoset, Acquired, AcquisitionError, Acquirer};
use crate::links::{classify, extract_link, ContentKind, LinkCategory, LinkResolver};
use crate::scratch;
use std::sync::Arc;
use teloxide::types::ChatId;
use tracing::{error, info, warn};

/// Long-lived collaborators shared by all pipeline runs.
pub struct PipelineDeps {
    /// Short-link resolver
    pub resolver: LinkResolver,
    /// Acquisition dispatcher
    pub acquirer: Arc<dyn Acquirer>,
}

/// Process one inbound text message end to end.
///
/// Messages without a recognized link are ignored silently; everything else
/// that goes wrong is logged and contained here.
pub async fn process_text(
    gateway: &dyn MediaGateway,
    deps: &PipelineDeps,
    chat: ChatId,
    text: &str,
) {
    let Some(found) = extract_link(text) else {
        return;
    };

    let working_link = match found.category {
        LinkCategory::ShortRedirect => match deps.resolver.resolve(&found.url).await {
            Ok(resolved) => resolved,
            Err(e) => {
                // Non-fatal: the message is dropped as if no link was found.
                warn!(url = %found.url, error = %e, "Dropping message, short link did not resolve");
                return;
            }
        },
        _ => found.url,
    };

    let kind = classify(&working_link);
    if kind == ContentKind::Unrecognized {
        warn!(link = %working_link, "Link shape not mapped to a backend");
        return;
    }

    info!(link = %working_link, kind = %kind, "Acquiring media");
    let acquired = match deps.acquirer.acquire(kind, &working_link).await {
        Ok(acquired) => acquired,
        Err(e) => {
            error!(link = %working_link, kind = %kind, error = %e, "Acquisition failed");
            notify_acquisition_failure(gateway, chat, kind, &e).await;
            return;
        }
    };

    if let Err(e) = deliver(gateway, chat, &acquired).await {
        error!(link = %working_link, kind = %kind, error = %e, "Delivery failed");
    }

    cleanup(&acquired).await;
}

/// Deliver an acquired result into the chat.
///
/// # Errors
///
/// Returns the first [`DeliveryError`] that aborts the remaining delivery
/// steps for this message. Cleanup is the caller's responsibility and runs
/// either way.
pub async fn deliver(
    gateway: &dyn MediaGateway,
    chat: ChatId,
    acquired: &Acquired,
) -> Result<(), DeliveryError> {
    match acquired {
        Acquired::Video { local_path } => gateway.send_video(chat, local_path).await,
        Acquired::Audio { local_path } => gateway.send_audio(chat, local_path).await,
        Acquired::PhotoAlbum {
            local_paths,
            audio_path,
        } => {
            let mut batcher = MediaBatcher::new(gateway, chat);
            for path in local_paths {
                if let Err(e) = batcher.add_photo(path).await {
                    // Per-photo failure: skip the photo, keep the album going.
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    warn!(path = %path.display(), error = %e, "Failed to upload photo");
                    let _ = gateway
                        .send_text(chat, &format!("Failed to upload photo: {name}"))
                        .await;
                }
                // A failed group send aborts the album, unlike a failed upload.
                batcher.flush_if_full().await?;
            }
            batcher.flush_remaining().await?;

            if let Some(audio) = audio_path {
                gateway.send_audio(chat, audio).await?;
            }
            Ok(())
        }
    }
}

/// Release every local path referenced by `acquired` exactly once, then tidy
/// the per-request album directory when one exists.
pub async fn cleanup(acquired: &Acquired) {
    for path in acquired.paths() {
        scratch::release_file(path).await;
    }
    if let Acquired::PhotoAlbum { local_paths, .. } = acquired {
        if let Some(dir) = photoset::album_dir(local_paths) {
            scratch::remove_dir_if_empty(dir).await;
        }
    }
}

async fn notify_acquisition_failure(
    gateway: &dyn MediaGateway,
    chat: ChatId,
    kind: ContentKind,
    err: &AcquisitionError,
) {
    // Only clearly actionable cases get a user-visible notice.
    if kind == ContentKind::PhotoSet && matches!(err, AcquisitionError::BackendRejected(_)) {
        if let Err(e) = gateway
            .send_text(chat, "No photos were found or downloaded.")
            .await
        {
            warn!(error = %e, "Failed to send failure notice");
        }
    }
}
