//! Telegram-facing layer.

/// Capacity-bounded photo batching for album delivery
pub mod batcher;
/// Outbound delivery operations behind a trait seam
pub mod gateway;
/// Command and message handlers
pub mod handlers;

pub use gateway::{DeliveryError, MediaGateway, PhotoReceipt, TelegramGateway};
