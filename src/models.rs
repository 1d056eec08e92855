use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostId(pub String);

#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentId(pub String);

#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorId(pub String);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        PostId(value.to_owned())
    }
}

impl From<&str> for CommentId {
    fn from(value: &str) -> Self {
        CommentId(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: AuthorId,
    pub display_name: String,
    /// Unique per author within a session.
    pub handle: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_by_current_user: Option<bool>,
    /// Set on the optimistic local copy until the server confirms it.
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub author: Author,
    pub like_count: u64,
    pub liked_by_current_user: bool,
    pub share_count: u64,
    pub shared_by_current_user: bool,
    /// Insertion order is display order.
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn pending_comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter().filter(|c| c.pending)
    }
}

/// One page of posts as returned by a `FeedSource`.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Post>,
    pub has_more: bool,
}

/// Authoritative like state echoed by the server, if it has any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeReceipt {
    pub like_count: Option<u64>,
    pub liked_by_current_user: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShareReceipt {
    pub share_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum InteractionKind {
    Like,
    Share,
    Comment,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::Like => f.write_str("like"),
            InteractionKind::Share => f.write_str("share"),
            InteractionKind::Comment => f.write_str("comment"),
        }
    }
}
