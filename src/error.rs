use std::fmt;

use thiserror::Error;

use crate::models::{InteractionKind, PostId};

/// Failure talking to a `FeedSource`. Never surfaced to callers directly,
/// the store and coordinator wrap it in a `FeedError`.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Page(u32),
    Comments(PostId),
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Page(page) => write!(f, "page {page}"),
            FetchTarget::Comments(post_id) => write!(f, "comments of post {post_id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FeedError {
    /// A load failed. Store contents are unchanged.
    #[error("failed to load {target}: {source}")]
    Fetch {
        target: FetchTarget,
        #[source]
        source: SourceError,
    },

    /// The remote confirm failed and the optimistic change was rolled back.
    #[error("{kind} on post {post_id} failed: {source}")]
    InteractionFailed {
        kind: InteractionKind,
        post_id: PostId,
        #[source]
        source: SourceError,
    },

    /// A local precondition failed; nothing was mutated or sent.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("post not found: {0}")]
    PostNotFound(PostId),
}

pub type FeedResult<T> = Result<T, FeedError>;
