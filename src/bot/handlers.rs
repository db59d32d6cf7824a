//! Command and message handlers.
//!
//! Thin teloxide glue: commands are parsed here, mention entities are
//! lifted into platform-neutral spans, and plain text is handed to the
//! pipeline.

use crate::bot::gateway::{MediaGateway, TelegramGateway};
use crate::convert::Converter;
use crate::pipeline::{self, PipelineDeps};
use crate::roles::{resolve_mention, Member, MemberDirectory, MentionSpan};
use crate::scratch;
use anyhow::Result;
use lazy_regex::lazy_regex;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageEntity, MessageEntityKind};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Match a bare role tag message: `@<role>`
static RE_ROLE_TAG: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^@(\w+)$");

/// Supported commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Convert a replied-to photo or video into an animation
    #[command(description = "Convert the replied photo/video to a GIF.")]
    Gif,
    /// Seed the member directory from chat administrators
    #[command(description = "Initialize the member directory.")]
    Initrole,
    /// Register a role name
    #[command(description = "Add a role: /addrole <role>")]
    Addrole(String),
    /// Assign a role to a mentioned member
    #[command(description = "Assign a role: /setrole <role> <@username>")]
    Setrole(String),
    /// Revoke a role from a mentioned member
    #[command(description = "Unassign a role: /unsetrole <role> <@username>")]
    Unsetrole(String),
    /// Delete a role name
    #[command(description = "Remove a role: /removerole <role>")]
    Removerole(String),
    /// Liveness probe
    #[command(description = "Health check.")]
    Healthcheck,
}

/// Dispatch a parsed command.
///
/// # Errors
///
/// Returns an error when a reply to the chat cannot be sent.
pub async fn handle_command(
    msg: Message,
    cmd: Command,
    gateway: Arc<TelegramGateway>,
    directory: Arc<dyn MemberDirectory>,
    converter: Arc<Converter>,
) -> Result<()> {
    let chat = msg.chat.id;
    match cmd {
        Command::Gif => handle_gif(&msg, gateway.as_ref(), converter.as_ref()).await?,
        Command::Initrole => init_group_members(chat, &gateway, directory.as_ref()).await?,
        Command::Addrole(args) => {
            let role = args.trim();
            if role.is_empty() {
                gateway.send_text(chat, "Usage: /addrole <role>").await?;
            } else {
                directory.add_role(role).await;
                gateway
                    .send_text(chat, &format!("Role '{role}' has been added."))
                    .await?;
            }
        }
        Command::Removerole(args) => {
            let role = args.trim();
            if !role.is_empty() {
                let reply = if directory.remove_role(role).await {
                    format!("Role '{role}' has been removed.")
                } else {
                    format!("Role '{role}' not found.")
                };
                gateway.send_text(chat, &reply).await?;
            }
        }
        Command::Setrole(args) => {
            apply_role_change(&msg, &args, gateway.as_ref(), directory.as_ref(), true).await?;
        }
        Command::Unsetrole(args) => {
            apply_role_change(&msg, &args, gateway.as_ref(), directory.as_ref(), false).await?;
        }
        Command::Healthcheck => gateway.send_text(chat, "OK").await?,
    }
    Ok(())
}

/// Handle a plain text message: role tags first, then the media pipeline.
///
/// # Errors
///
/// Returns an error when a reply to the chat cannot be sent.
pub async fn handle_text(
    msg: Message,
    gateway: Arc<TelegramGateway>,
    directory: Arc<dyn MemberDirectory>,
    deps: Arc<PipelineDeps>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Some(caps) = RE_ROLE_TAG.captures(text) {
        if let Some(role) = caps.get(1) {
            return tag_members_by_role(
                msg.chat.id,
                role.as_str(),
                gateway.as_ref(),
                directory.as_ref(),
            )
            .await;
        }
    }

    pipeline::process_text(gateway.as_ref(), deps.as_ref(), msg.chat.id, text).await;
    Ok(())
}

/// Lift a message's mention entities into platform-neutral spans.
///
/// Offsets are kept in UTF-16 code units as the platform reports them; the
/// username slice is decoded accordingly.
#[must_use]
pub fn mention_spans(text: &str, entities: &[MessageEntity]) -> Vec<MentionSpan> {
    entities
        .iter()
        .filter_map(|entity| match &entity.kind {
            MessageEntityKind::TextMention { user } => Some(MentionSpan::Direct {
                offset: entity.offset,
                user_id: user.id.0.cast_signed(),
            }),
            MessageEntityKind::Mention => {
                let raw = utf16_slice(text, entity.offset, entity.length)?;
                Some(MentionSpan::Username {
                    offset: entity.offset,
                    name: raw.trim_start_matches('@').to_string(),
                })
            }
            _ => None,
        })
        .collect()
}

/// Decode a UTF-16 code-unit span of `text`.
fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    if end > units.len() {
        return None;
    }
    String::from_utf16(&units[offset..end]).ok()
}

async fn apply_role_change(
    msg: &Message,
    args: &str,
    gateway: &TelegramGateway,
    directory: &dyn MemberDirectory,
    assign: bool,
) -> Result<()> {
    let chat = msg.chat.id;
    let usage = if assign {
        "Usage: /setrole <role> <@username>"
    } else {
        "Usage: /unsetrole <role> <@username>"
    };

    let Some(role) = args.split_whitespace().next() else {
        gateway.send_text(chat, usage).await?;
        return Ok(());
    };

    let text = msg.text().unwrap_or_default();
    let entities = msg.entities().unwrap_or_default();
    let spans = mention_spans(text, entities);
    let Some(member_id) = resolve_mention(directory, &spans).await else {
        gateway
            .send_text(chat, "User not found or mention is invalid.")
            .await?;
        return Ok(());
    };

    let outcome = if assign {
        directory.assign_role(member_id, role).await
    } else {
        directory.unassign_role(member_id, role).await
    };

    let reply = match outcome {
        Ok(()) if assign => format!("Role '{role}' has been assigned to the mentioned user."),
        Ok(()) => format!("Role '{role}' has been removed from the mentioned user."),
        Err(e) => e.to_string(),
    };
    gateway.send_text(chat, &reply).await?;
    Ok(())
}

async fn tag_members_by_role(
    chat: ChatId,
    role: &str,
    gateway: &TelegramGateway,
    directory: &dyn MemberDirectory,
) -> Result<()> {
    let members: Vec<Member> = if role == "all" || role == "everyone" {
        directory.find_all().await
    } else {
        directory.find_by_role(role).await
    };

    let text = crate::roles::render_tag_text(&members);
    if text.is_empty() {
        info!(role, "No members to tag");
        return Ok(());
    }
    gateway.send_html(chat, &text).await?;
    Ok(())
}

async fn init_group_members(
    chat: ChatId,
    gateway: &Arc<TelegramGateway>,
    directory: &dyn MemberDirectory,
) -> Result<()> {
    let admins = gateway.bot().get_chat_administrators(chat).await?;
    for admin in admins {
        let user = admin.user;
        let id = user.id.0.cast_signed();
        if directory.find_by_id(id).await.is_none() {
            directory
                .add_member(Member {
                    id,
                    username: user.username.clone(),
                    first_name: Some(user.first_name.clone()),
                })
                .await;
        }
    }
    info!(chat = chat.0, "Member directory initialized from administrators");
    Ok(())
}

async fn handle_gif(
    msg: &Message,
    gateway: &TelegramGateway,
    converter: &Converter,
) -> Result<()> {
    let chat = msg.chat.id;
    let Some(replied) = msg.reply_to_message() else {
        gateway
            .send_text(chat, "/gif command should be used as a reply to a photo or video")
            .await?;
        return Ok(());
    };

    if let Some(photo) = replied.photo().and_then(|sizes| sizes.last()) {
        let bytes = gateway.fetch_remote_file(&photo.file.id.0).await?;
        let output = converter.image_to_looping_mp4(&bytes).await?;
        let sent = gateway.send_animation(chat, &output).await;
        scratch::release_file(&output).await;
        sent?;
        return Ok(());
    }

    if let Some(video) = replied.video() {
        let source = converter.scratch_file("reply", "mp4");
        converter.ensure_dir().await?;
        let bytes = gateway.fetch_remote_file(&video.file.id.0).await?;
        tokio::fs::write(&source, &bytes).await?;

        let converted = converter.video_to_gif(&source).await;
        scratch::release_file(&source).await;
        let output = match converted {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "GIF conversion failed");
                gateway.send_text(chat, "Failed to convert the video.").await?;
                return Ok(());
            }
        };

        let sent = gateway.send_animation(chat, &output).await;
        scratch::release_file(&output).await;
        sent?;
        return Ok(());
    }

    gateway
        .send_text(chat, "/gif command should be used with a photo or video reply only")
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tag_pattern() {
        assert!(RE_ROLE_TAG.is_match("@admins"));
        assert!(RE_ROLE_TAG.is_match("@all"));
        assert!(!RE_ROLE_TAG.is_match("@admins hello"));
        assert!(!RE_ROLE_TAG.is_match("email@example.com"));
    }

    #[test]
    fn test_utf16_slice_handles_non_ascii_prefix() {
        // Emoji occupy two UTF-16 code units; offsets after them must
        // still land on the mention.
        let text = "\u{1F525} @carol";
        assert_eq!(utf16_slice(text, 3, 6).as_deref(), Some("@carol"));
        assert_eq!(utf16_slice(text, 3, 60), None);
    }

    #[test]
    fn test_mention_spans_orders_and_kinds() {
        let text = "hi @carol";
        let entities = vec![MessageEntity {
            kind: MessageEntityKind::Mention,
            offset: 3,
            length: 6,
        }];
        let spans = mention_spans(text, &entities);
        assert_eq!(
            spans,
            vec![MentionSpan::Username {
                offset: 3,
                name: "carol".to_string(),
            }]
        );

        // Non-mention entities are ignored
        let entities = vec![MessageEntity {
            kind: MessageEntityKind::Bold,
            offset: 0,
            length: 2,
        }];
        assert!(mention_spans(text, &entities).is_empty());
    }
}
