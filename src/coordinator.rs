use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{FeedError, FeedResult};
use crate::feed_source::FeedSource;
use crate::models::{Author, Comment, CommentId, InteractionKind, Post, PostId};
use crate::store::FeedStore;

/// Receives the link of a post once a share is confirmed, e.g. to put it
/// on the clipboard or hand it to a share sheet.
pub trait LinkSharer: Send + Sync {
    fn share_link(&self, post_id: &PostId, url: &str) -> anyhow::Result<()>;
}

/// Just logs the link.
pub struct LogLinkSharer;

impl LinkSharer for LogLinkSharer {
    fn share_link(&self, post_id: &PostId, url: &str) -> anyhow::Result<()> {
        info!("Share link for post {post_id}: {url}");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub liked: bool,
    pub like_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareState {
    pub shared: bool,
    pub share_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareOutcome {
    pub shared: bool,
    pub share_count: u64,
    /// Set when the post ended up shared.
    pub link: Option<String>,
    /// Set when handing the link off failed. The share itself still stands.
    pub warning: Option<String>,
}

type TurnKey = (PostId, InteractionKind);

/// Applies likes, shares and comments to posts in a `FeedStore` right
/// away, then confirms them with the source and rolls back on failure.
///
/// Attempts of the same kind on the same post take turns; different kinds
/// run side by side since they touch disjoint fields.
pub struct InteractionCoordinator<S> {
    store: Arc<FeedStore<S>>,
    current_user: Author,
    share_base_url: String,
    max_comment_chars: usize,
    sharer: Arc<dyn LinkSharer>,
    turns: Mutex<HashMap<TurnKey, Arc<TurnLock<()>>>>,
}

struct Turn<'a> {
    key: TurnKey,
    lock: Arc<TurnLock<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    turns: &'a Mutex<HashMap<TurnKey, Arc<TurnLock<()>>>>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut turns = self.turns.lock();
        // Only the map and this turn still reference the lock: nobody waits.
        if Arc::strong_count(&self.lock) == 2 {
            turns.remove(&self.key);
        }
    }
}

impl<S: FeedSource> InteractionCoordinator<S> {
    pub fn new(store: Arc<FeedStore<S>>, config: &Config) -> Self {
        InteractionCoordinator {
            store,
            current_user: config.current_user.clone(),
            share_base_url: config.share_base_url.clone(),
            max_comment_chars: config.max_comment_chars,
            sharer: Arc::new(LogLinkSharer),
            turns: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sharer(mut self, sharer: Arc<dyn LinkSharer>) -> Self {
        self.sharer = sharer;
        self
    }

    pub fn store(&self) -> &Arc<FeedStore<S>> {
        &self.store
    }

    pub async fn toggle_like(&self, post_id: &PostId) -> FeedResult<LikeState> {
        let _turn = self.take_turn(post_id, InteractionKind::Like).await;

        let (before, optimistic) = self
            .store
            .modify_post(post_id, |post| {
                let before = like_state(post);
                flip(
                    &mut post.liked_by_current_user,
                    &mut post.like_count,
                    !before.liked,
                );
                (before, like_state(post))
            })
            .ok_or_else(|| FeedError::PostNotFound(post_id.clone()))?;
        debug!(
            "Optimistic like on {post_id}: {} -> {}",
            before.like_count, optimistic.like_count
        );

        match self
            .store
            .source()
            .submit_like(post_id, optimistic.liked)
            .await
        {
            Ok(receipt) => {
                let confirmed = self.store.modify_post(post_id, |post| {
                    if let Some(count) = receipt.like_count {
                        post.like_count = count;
                    }
                    if let Some(liked) = receipt.liked_by_current_user {
                        post.liked_by_current_user = liked;
                    }
                    like_state(post)
                });
                Ok(confirmed.unwrap_or(LikeState {
                    liked: receipt.liked_by_current_user.unwrap_or(optimistic.liked),
                    like_count: receipt.like_count.unwrap_or(optimistic.like_count),
                }))
            }
            Err(source) => {
                self.store.modify_post(post_id, |post| {
                    if like_state(post) == optimistic {
                        post.liked_by_current_user = before.liked;
                        post.like_count = before.like_count;
                    } else if post.liked_by_current_user == optimistic.liked {
                        flip(
                            &mut post.liked_by_current_user,
                            &mut post.like_count,
                            before.liked,
                        );
                    }
                });
                warn!("Like on {post_id} failed, rolled back: {source}");
                Err(FeedError::InteractionFailed {
                    kind: InteractionKind::Like,
                    post_id: post_id.clone(),
                    source,
                })
            }
        }
    }

    pub async fn toggle_share(&self, post_id: &PostId) -> FeedResult<ShareOutcome> {
        let _turn = self.take_turn(post_id, InteractionKind::Share).await;

        let (before, optimistic) = self
            .store
            .modify_post(post_id, |post| {
                let before = share_state(post);
                flip(
                    &mut post.shared_by_current_user,
                    &mut post.share_count,
                    !before.shared,
                );
                (before, share_state(post))
            })
            .ok_or_else(|| FeedError::PostNotFound(post_id.clone()))?;

        let receipt = match self
            .store
            .source()
            .submit_share(post_id, optimistic.shared)
            .await
        {
            Ok(receipt) => receipt,
            Err(source) => {
                self.store.modify_post(post_id, |post| {
                    if share_state(post) == optimistic {
                        post.shared_by_current_user = before.shared;
                        post.share_count = before.share_count;
                    } else if post.shared_by_current_user == optimistic.shared {
                        flip(
                            &mut post.shared_by_current_user,
                            &mut post.share_count,
                            before.shared,
                        );
                    }
                });
                warn!("Share on {post_id} failed, rolled back: {source}");
                return Err(FeedError::InteractionFailed {
                    kind: InteractionKind::Share,
                    post_id: post_id.clone(),
                    source,
                });
            }
        };

        let confirmed = self
            .store
            .modify_post(post_id, |post| {
                if let Some(count) = receipt.share_count {
                    post.share_count = count;
                }
                share_state(post)
            })
            .unwrap_or(ShareState {
                share_count: receipt.share_count.unwrap_or(optimistic.share_count),
                ..optimistic
            });

        let mut outcome = ShareOutcome {
            shared: confirmed.shared,
            share_count: confirmed.share_count,
            link: None,
            warning: None,
        };
        if confirmed.shared {
            let link = format!("{}/post/{}", self.share_base_url, post_id);
            if let Err(err) = self.sharer.share_link(post_id, &link) {
                warn!("Couldn't hand off share link for {post_id}: {err:#}");
                outcome.warning = Some(format!("failed to share link: {err:#}"));
            }
            outcome.link = Some(link);
        }
        Ok(outcome)
    }

    /// Appends a pending comment, then swaps it for the server's copy.
    pub async fn add_comment(&self, post_id: &PostId, text: &str) -> FeedResult<Comment> {
        let content = text.trim();
        if content.is_empty() {
            return Err(FeedError::Validation("comment is empty".to_owned()));
        }
        let length = content.chars().count();
        if length > self.max_comment_chars {
            return Err(FeedError::Validation(format!(
                "comment is {length} characters, the limit is {}",
                self.max_comment_chars
            )));
        }

        let _turn = self.take_turn(post_id, InteractionKind::Comment).await;

        let temp_id = CommentId(format!("temp-{}", Uuid::new_v4()));
        let pending = Comment {
            id: temp_id.clone(),
            content: content.to_owned(),
            author: self.current_user.clone(),
            created_at: Utc::now(),
            like_count: None,
            liked_by_current_user: None,
            pending: true,
        };
        self.store
            .modify_post(post_id, |post| post.comments.push(pending))
            .ok_or_else(|| FeedError::PostNotFound(post_id.clone()))?;
        debug!("Pending comment {temp_id} on {post_id}");

        match self.store.source().submit_comment(post_id, content).await {
            Ok(mut confirmed) => {
                confirmed.pending = false;
                if confirmed.author.display_name.trim().is_empty() {
                    warn!("Server comment {} has no author, using local user", confirmed.id);
                    confirmed.author = self.current_user.clone();
                }
                self.store.modify_post(post_id, |post| {
                    // A thread reload may already have brought in the
                    // confirmed copy.
                    if post.comments.iter().any(|c| c.id == confirmed.id) {
                        post.comments.retain(|c| c.id != temp_id);
                    } else if let Some(slot) =
                        post.comments.iter_mut().find(|c| c.id == temp_id)
                    {
                        *slot = confirmed.clone();
                    }
                });
                Ok(confirmed)
            }
            Err(source) => {
                self.store
                    .modify_post(post_id, |post| post.comments.retain(|c| c.id != temp_id));
                warn!("Comment on {post_id} failed, removed pending copy: {source}");
                Err(FeedError::InteractionFailed {
                    kind: InteractionKind::Comment,
                    post_id: post_id.clone(),
                    source,
                })
            }
        }
    }

    async fn take_turn(&self, post_id: &PostId, kind: InteractionKind) -> Turn<'_> {
        let key = (post_id.clone(), kind);
        let lock = self.turns.lock().entry(key.clone()).or_default().clone();
        let guard = lock.clone().lock_owned().await;
        Turn {
            key,
            lock,
            guard: Some(guard),
            turns: &self.turns,
        }
    }
}

fn like_state(post: &Post) -> LikeState {
    LikeState {
        liked: post.liked_by_current_user,
        like_count: post.like_count,
    }
}

fn share_state(post: &Post) -> ShareState {
    ShareState {
        shared: post.shared_by_current_user,
        share_count: post.share_count,
    }
}

/// Moves `flag` to `target`, counting the transition.
fn flip(flag: &mut bool, count: &mut u64, target: bool) {
    if *flag == target {
        return;
    }
    *flag = target;
    *count = if target {
        *count + 1
    } else {
        count.saturating_sub(1)
    };
}
