//! Member directory and role tagging.
//!
//! Persistence of members and roles is an external collaborator behind the
//! [`MemberDirectory`] trait; the bot only resolves mention spans, renders
//! tag text and forwards assignments. An in-memory implementation backs the
//! default wiring and tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

/// A chat member known to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Platform user id
    pub id: i64,
    /// Public username, when the member has one
    pub username: Option<String>,
    /// Display first name
    pub first_name: Option<String>,
}

/// Directory failure surfaced to the chat.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The referenced member is not in the directory
    #[error("Member not found")]
    MemberNotFound,
    /// The referenced role does not exist
    #[error("Role not found")]
    RoleNotFound,
}

/// External member/role directory collaborator.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Insert or update a member.
    async fn add_member(&self, member: Member);
    /// Look a member up by id.
    async fn find_by_id(&self, id: i64) -> Option<Member>;
    /// Look a member up by username.
    async fn find_by_username(&self, username: &str) -> Option<Member>;
    /// All known members.
    async fn find_all(&self) -> Vec<Member>;
    /// Members holding `role`.
    async fn find_by_role(&self, role: &str) -> Vec<Member>;
    /// Register a role name.
    async fn add_role(&self, name: &str);
    /// Remove a role name; `true` when it existed.
    async fn remove_role(&self, name: &str) -> bool;
    /// Grant `role` to the member with `member_id`.
    async fn assign_role(&self, member_id: i64, role: &str) -> Result<(), DirectoryError>;
    /// Revoke `role` from the member with `member_id`.
    async fn unassign_role(&self, member_id: i64, role: &str) -> Result<(), DirectoryError>;
}

/// In-memory directory used by the default wiring and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    members: RwLock<HashMap<i64, Member>>,
    roles: RwLock<HashSet<String>>,
    assignments: RwLock<HashMap<i64, HashSet<String>>>,
}

#[async_trait]
impl MemberDirectory for InMemoryDirectory {
    async fn add_member(&self, member: Member) {
        self.members.write().await.insert(member.id, member);
    }

    async fn find_by_id(&self, id: i64) -> Option<Member> {
        self.members.read().await.get(&id).cloned()
    }

    async fn find_by_username(&self, username: &str) -> Option<Member> {
        self.members
            .read()
            .await
            .values()
            .find(|m| m.username.as_deref() == Some(username))
            .cloned()
    }

    async fn find_all(&self) -> Vec<Member> {
        self.members.read().await.values().cloned().collect()
    }

    async fn find_by_role(&self, role: &str) -> Vec<Member> {
        let assignments = self.assignments.read().await;
        let members = self.members.read().await;
        assignments
            .iter()
            .filter(|(_, roles)| roles.contains(role))
            .filter_map(|(id, _)| members.get(id).cloned())
            .collect()
    }

    async fn add_role(&self, name: &str) {
        self.roles.write().await.insert(name.to_string());
    }

    async fn remove_role(&self, name: &str) -> bool {
        let existed = self.roles.write().await.remove(name);
        if existed {
            for roles in self.assignments.write().await.values_mut() {
                roles.remove(name);
            }
        }
        existed
    }

    async fn assign_role(&self, member_id: i64, role: &str) -> Result<(), DirectoryError> {
        if !self.members.read().await.contains_key(&member_id) {
            return Err(DirectoryError::MemberNotFound);
        }
        if !self.roles.read().await.contains(role) {
            return Err(DirectoryError::RoleNotFound);
        }
        self.assignments
            .write()
            .await
            .entry(member_id)
            .or_default()
            .insert(role.to_string());
        Ok(())
    }

    async fn unassign_role(&self, member_id: i64, role: &str) -> Result<(), DirectoryError> {
        if !self.members.read().await.contains_key(&member_id) {
            return Err(DirectoryError::MemberNotFound);
        }
        if !self.roles.read().await.contains(role) {
            return Err(DirectoryError::RoleNotFound);
        }
        if let Some(roles) = self.assignments.write().await.get_mut(&member_id) {
            roles.remove(role);
        }
        Ok(())
    }
}

/// A structured mention span lifted out of a message's entity list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionSpan {
    /// `text_mention`: the platform already resolved the user id
    Direct {
        /// Offset of the span in UTF-16 code units
        offset: usize,
        /// The mentioned user's id
        user_id: i64,
    },
    /// `@username` mention that needs a directory lookup
    Username {
        /// Offset of the span in UTF-16 code units
        offset: usize,
        /// Username without the leading `@`
        name: String,
    },
}

impl MentionSpan {
    const fn offset(&self) -> usize {
        match self {
            Self::Direct { offset, .. } | Self::Username { offset, .. } => *offset,
        }
    }
}

/// Resolve a mention to a member id.
///
/// Precedence is explicit: the first mention entity in textual order is THE
/// mention; when it is an unresolvable username the whole resolution yields
/// `None` rather than falling through to a later span.
pub async fn resolve_mention(
    directory: &dyn MemberDirectory,
    spans: &[MentionSpan],
) -> Option<i64> {
    let first = spans.iter().min_by_key(|span| span.offset())?;
    match first {
        MentionSpan::Direct { user_id, .. } => Some(*user_id),
        MentionSpan::Username { name, .. } => {
            directory.find_by_username(name).await.map(|m| m.id)
        }
    }
}

/// Render the tag message for a set of members: `@username` when public,
/// otherwise an HTML user link with the escaped first name.
#[must_use]
pub fn render_tag_text(members: &[Member]) -> String {
    let mut text = String::new();
    for member in members {
        if let Some(ref username) = member.username {
            text.push('@');
            text.push_str(username);
        } else {
            let display = member.first_name.as_deref().unwrap_or("incognito");
            text.push_str(&format!(
                "<a href=\"tg://user?id={}\">{}</a>",
                member.id,
                html_escape::encode_text(display)
            ));
        }
        text.push(' ');
    }
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: i64, username: Option<&str>, first_name: Option<&str>) -> Member {
        Member {
            id,
            username: username.map(String::from),
            first_name: first_name.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_role_lifecycle() -> Result<(), DirectoryError> {
        let dir = InMemoryDirectory::default();
        dir.add_member(member(1, Some("alice"), Some("Alice"))).await;
        dir.add_member(member(2, None, Some("Bob"))).await;
        dir.add_role("admins").await;

        dir.assign_role(1, "admins").await?;
        assert_eq!(dir.find_by_role("admins").await.len(), 1);

        // Unknown member and role are distinct failures
        assert_eq!(
            dir.assign_role(99, "admins").await,
            Err(DirectoryError::MemberNotFound)
        );
        assert_eq!(
            dir.assign_role(1, "ghosts").await,
            Err(DirectoryError::RoleNotFound)
        );

        dir.unassign_role(1, "admins").await?;
        assert!(dir.find_by_role("admins").await.is_empty());

        assert!(dir.remove_role("admins").await);
        assert!(!dir.remove_role("admins").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_mention_first_in_textual_order() {
        let dir = InMemoryDirectory::default();
        dir.add_member(member(7, Some("carol"), None)).await;

        // Direct span later in the text loses to the earlier username span
        let spans = vec![
            MentionSpan::Direct {
                offset: 20,
                user_id: 42,
            },
            MentionSpan::Username {
                offset: 5,
                name: "carol".to_string(),
            },
        ];
        assert_eq!(resolve_mention(&dir, &spans).await, Some(7));

        // First span unresolvable: no fall-through to the later one
        let spans = vec![
            MentionSpan::Username {
                offset: 0,
                name: "nobody".to_string(),
            },
            MentionSpan::Direct {
                offset: 9,
                user_id: 42,
            },
        ];
        assert_eq!(resolve_mention(&dir, &spans).await, None);

        assert_eq!(resolve_mention(&dir, &[]).await, None);
    }

    #[test]
    fn test_render_tag_text() {
        let members = vec![
            member(1, Some("alice"), Some("Alice")),
            member(2, None, Some("Bob <3")),
            member(3, None, None),
        ];
        assert_eq!(
            render_tag_text(&members),
            "@alice <a href=\"tg://user?id=2\">Bob &lt;3</a> <a href=\"tg://user?id=3\">incognito</a>"
        );
    }
}
