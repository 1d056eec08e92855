//! Stand-in content for when the first load fails, so a screen is never
//! left empty by a transient network error.
//!
//! Placeholders never enter a `FeedStore`; they live in `FeedView::Degraded`
//! next to it.

use chrono::{Duration, TimeZone, Utc};
use serde::Serialize;

use crate::feed_source::FeedSource;
use crate::models::{Author, AuthorId, Post, PostId};
use crate::store::{FeedSnapshot, FeedStore};

/// Builds `count` deterministic placeholder posts, ids `placeholder-1`
/// onwards.
pub fn placeholder_posts(count: usize) -> Vec<Post> {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).single().unwrap_or_default();
    (1..=count)
        .map(|n| Post {
            id: PostId(format!("placeholder-{n}")),
            content: format!(
                "This is post number {n} with some interesting content about technology and development!"
            ),
            image_url: None,
            author: Author {
                id: AuthorId(format!("user-{n}")),
                display_name: format!("User {n}"),
                handle: format!("user{n}"),
                avatar_url: format!("https://i.pravatar.cc/150?img={}", n % 70 + 1),
            },
            like_count: (n as u64 * 7) % 100,
            liked_by_current_user: false,
            share_count: 0,
            shared_by_current_user: false,
            comments: Vec::new(),
            created_at: epoch - Duration::hours(n as i64),
        })
        .collect()
}

/// What a screen should render.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FeedView {
    Live(FeedSnapshot),
    Degraded {
        placeholders: Vec<Post>,
        reason: String,
    },
}

impl FeedView {
    /// Loads the first page, falling back to placeholders if that fails
    /// and the store has nothing to show yet.
    pub async fn first_load<S: FeedSource>(store: &FeedStore<S>, page_size: usize) -> FeedView {
        match store.load_first_page(page_size).await {
            Ok(_) => FeedView::Live(store.snapshot()),
            Err(err) if store.is_empty() => FeedView::Degraded {
                placeholders: placeholder_posts(page_size),
                reason: err.to_string(),
            },
            Err(_) => FeedView::Live(store.snapshot()),
        }
    }

    pub fn posts(&self) -> &[Post] {
        match self {
            FeedView::Live(snapshot) => &snapshot.posts,
            FeedView::Degraded { placeholders, .. } => placeholders,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, FeedView::Degraded { .. })
    }
}
