//! Outbound delivery operations, abstracted over the messaging collaborator.
//!
//! The [`MediaGateway`] trait is the only surface the pipeline talks to:
//! uploads by local file, group sends by remote reference, deletions by id
//! and remote-file fetches. The Telegram implementation wraps every call in
//! the exponential-backoff retry helper.

use crate::utils::retry_telegram_operation;
use async_trait::async_trait;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, FileId, InputFile, InputMedia, InputMediaPhoto, MessageId, ParseMode,
};
use thiserror::Error;

/// Typed delivery failure; never fatal beyond the current message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport could not complete the call (network, I/O)
    #[error("transport failure: {0}")]
    TransportFailure(String),
    /// The remote side rejected the operation
    #[error("remote rejected: {0}")]
    RemoteRejected(String),
}

/// Receipt of an individual photo upload: the remote file reference needed
/// for group sends plus the placeholder message to delete afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoReceipt {
    /// Remote file reference usable in a group send
    pub remote_ref: String,
    /// Placeholder message created by the individual upload
    pub message_id: MessageId,
}

/// Outbound operations against the messaging platform.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError>;

    /// Send an HTML-formatted message.
    async fn send_html(&self, chat: ChatId, html: &str) -> Result<(), DeliveryError>;

    /// Upload a photo by local file; returns the remote reference and the
    /// placeholder message id.
    async fn send_photo(&self, chat: ChatId, path: &Path) -> Result<PhotoReceipt, DeliveryError>;

    /// Upload a video by local file.
    async fn send_video(&self, chat: ChatId, path: &Path) -> Result<(), DeliveryError>;

    /// Upload an audio file by local file.
    async fn send_audio(&self, chat: ChatId, path: &Path) -> Result<(), DeliveryError>;

    /// Upload an animation by local file.
    async fn send_animation(&self, chat: ChatId, path: &Path) -> Result<(), DeliveryError>;

    /// Send a grouped album (≤10 items) by previously obtained remote
    /// references.
    async fn send_photo_group(
        &self,
        chat: ChatId,
        remote_refs: &[String],
    ) -> Result<(), DeliveryError>;

    /// Delete a message by id.
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), DeliveryError>;

    /// Fetch the bytes of a platform-hosted file by its remote id.
    async fn fetch_remote_file(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError>;
}

/// Telegram implementation of [`MediaGateway`] over a `teloxide` bot.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Wrap a bot handle.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// The underlying bot handle, for collaborator calls outside the
    /// delivery surface (e.g. listing chat administrators).
    #[must_use]
    pub const fn bot(&self) -> &Bot {
        &self.bot
    }
}

/// Classify a retried operation's final error into the delivery taxonomy.
fn to_delivery_error(err: &anyhow::Error) -> DeliveryError {
    match err.downcast_ref::<teloxide::RequestError>() {
        Some(teloxide::RequestError::Api(api)) => DeliveryError::RemoteRejected(api.to_string()),
        _ => DeliveryError::TransportFailure(err.to_string()),
    }
}

#[async_trait]
impl MediaGateway for TelegramGateway {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError> {
        retry_telegram_operation(|| async {
            self.bot
                .send_message(chat, text)
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map(|_| ())
        .map_err(|e| to_delivery_error(&e))
    }

    async fn send_html(&self, chat: ChatId, html: &str) -> Result<(), DeliveryError> {
        retry_telegram_operation(|| async {
            self.bot
                .send_message(chat, html)
                .parse_mode(ParseMode::Html)
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map(|_| ())
        .map_err(|e| to_delivery_error(&e))
    }

    async fn send_photo(&self, chat: ChatId, path: &Path) -> Result<PhotoReceipt, DeliveryError> {
        let sent = retry_telegram_operation(|| async {
            self.bot
                .send_photo(chat, InputFile::file(path))
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map_err(|e| to_delivery_error(&e))?;

        let remote_ref = sent
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|size| size.file.id.0.clone())
            .ok_or_else(|| {
                DeliveryError::RemoteRejected("upload response carried no photo".to_string())
            })?;

        Ok(PhotoReceipt {
            remote_ref,
            message_id: sent.id,
        })
    }

    async fn send_video(&self, chat: ChatId, path: &Path) -> Result<(), DeliveryError> {
        retry_telegram_operation(|| async {
            self.bot
                .send_video(chat, InputFile::file(path))
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map(|_| ())
        .map_err(|e| to_delivery_error(&e))
    }

    async fn send_audio(&self, chat: ChatId, path: &Path) -> Result<(), DeliveryError> {
        retry_telegram_operation(|| async {
            self.bot
                .send_audio(chat, InputFile::file(path))
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map(|_| ())
        .map_err(|e| to_delivery_error(&e))
    }

    async fn send_animation(&self, chat: ChatId, path: &Path) -> Result<(), DeliveryError> {
        retry_telegram_operation(|| async {
            self.bot
                .send_animation(chat, InputFile::file(path))
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map(|_| ())
        .map_err(|e| to_delivery_error(&e))
    }

    async fn send_photo_group(
        &self,
        chat: ChatId,
        remote_refs: &[String],
    ) -> Result<(), DeliveryError> {
        let media: Vec<InputMedia> = remote_refs
            .iter()
            .map(|remote_ref| {
                InputMedia::Photo(InputMediaPhoto::new(InputFile::file_id(FileId(
                    remote_ref.clone(),
                ))))
            })
            .collect();

        retry_telegram_operation(|| async {
            self.bot
                .send_media_group(chat, media.clone())
                .await
                .map_err(anyhow::Error::from)
        })
        .await
        .map(|_| ())
        .map_err(|e| to_delivery_error(&e))
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), DeliveryError> {
        // Deletion is not retried: a second attempt after a success races
        // with Telegram's own removal and reports a spurious error.
        self.bot
            .delete_message(chat, message)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                teloxide::RequestError::Api(api) => DeliveryError::RemoteRejected(api.to_string()),
                other => DeliveryError::TransportFailure(other.to_string()),
            })
    }

    async fn fetch_remote_file(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError> {
        let owned = file_id.to_string();
        retry_telegram_operation(|| async {
            let file = self.bot.get_file(FileId(owned.clone())).await?;
            let mut buf = Vec::new();
            self.bot.download_file(&file.path, &mut buf).await?;
            Ok(buf)
        })
        .await
        .map_err(|e| to_delivery_error(&e))
    }
}
