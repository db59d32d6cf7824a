//! Capacity-bounded accumulation of photo uploads into grouped albums.
//!
//! The platform's group-send operation takes remote references, not raw
//! file bytes, so every photo is first uploaded individually to obtain a
//! reference. When a batch boundary is reached the whole batch is re-sent
//! as one album and the placeholder messages are deleted.

use crate::bot::gateway::{DeliveryError, MediaGateway, PhotoReceipt};
use crate::config::MEDIA_GROUP_CAPACITY;
use std::path::Path;
use teloxide::types::ChatId;
use tracing::{info, warn};

/// Accumulates photo uploads for one chat and flushes them as albums.
pub struct MediaBatcher<'a> {
    gateway: &'a dyn MediaGateway,
    chat: ChatId,
    pending: Vec<PhotoReceipt>,
}

impl<'a> MediaBatcher<'a> {
    /// New empty batcher for `chat`.
    #[must_use]
    pub fn new(gateway: &'a dyn MediaGateway, chat: ChatId) -> Self {
        Self {
            gateway,
            chat,
            pending: Vec::new(),
        }
    }

    /// Upload one photo individually and add its receipt to the batch.
    /// The caller drives [`MediaBatcher::flush_if_full`] between additions.
    ///
    /// # Errors
    ///
    /// Propagates the upload failure; the caller decides whether to skip
    /// the photo and continue.
    pub async fn add_photo(&mut self, path: &Path) -> Result<PhotoReceipt, DeliveryError> {
        let receipt = self.gateway.send_photo(self.chat, path).await?;
        self.pending.push(receipt.clone());
        Ok(receipt)
    }

    /// Flush as a grouped album if the batch is at capacity.
    ///
    /// # Errors
    ///
    /// Propagates a failed group send.
    pub async fn flush_if_full(&mut self) -> Result<(), DeliveryError> {
        if self.pending.len() >= MEDIA_GROUP_CAPACITY {
            self.flush_group().await?;
        }
        Ok(())
    }

    /// Flush whatever remains at end of input.
    ///
    /// A trailing batch of exactly one item is left as the already-sent
    /// individual upload; albums require at least two items.
    ///
    /// # Errors
    ///
    /// Propagates a failed group send.
    pub async fn flush_remaining(&mut self) -> Result<(), DeliveryError> {
        if self.pending.len() >= 2 {
            self.flush_group().await?;
        } else if self.pending.len() == 1 {
            info!("Single trailing photo left as individual upload");
            self.pending.clear();
        }
        Ok(())
    }

    async fn flush_group(&mut self) -> Result<(), DeliveryError> {
        let refs: Vec<String> = self
            .pending
            .iter()
            .map(|receipt| receipt.remote_ref.clone())
            .collect();
        let receipts = std::mem::take(&mut self.pending);

        info!(size = refs.len(), "Sending media group");
        if let Err(e) = self.gateway.send_photo_group(self.chat, &refs).await {
            // The individual uploads stay visible in the chat; dropping
            // the placeholders would lose the photos entirely.
            warn!(error = %e, "Failed to send media group, leaving individual uploads");
            return Err(e);
        }

        for receipt in receipts {
            if let Err(e) = self
                .gateway
                .delete_message(self.chat, receipt.message_id)
                .await
            {
                warn!(
                    message_id = receipt.message_id.0,
                    error = %e,
                    "Failed to delete placeholder message"
                );
            }
        }
        Ok(())
    }
}
