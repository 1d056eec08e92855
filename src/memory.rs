use std::collections::{HashMap, HashSet};

use chrono::Utc;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::Config;
use crate::error::SourceError;
use crate::feed_source::FeedSource;
use crate::models::{Author, Comment, CommentId, LikeReceipt, Page, Post, PostId, ShareReceipt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOp {
    FetchPage,
    FetchComments,
    Like,
    Share,
    Comment,
}

/// A `FeedSource` backed by a vector of posts.
///
/// It keeps its own authoritative like/share counts and comment threads, so
/// receipts reflect what a real server would echo back. Each call settles
/// its outcome on arrival, applies it server-side, and only then waits for
/// the reply to be let through: `pause` holds every reply, `hold` one kind
/// of call, `hold_page` one page number. Failures can be injected per
/// operation.
pub struct MemorySource {
    inner: Mutex<Inner>,
    gate: watch::Sender<Gate>,
}

struct Inner {
    posts: Vec<Post>,
    threads: HashMap<PostId, Vec<Comment>>,
    failing: HashSet<SourceOp>,
    calls: HashMap<SourceOp, usize>,
    next_comment_id: u64,
    commenter: Author,
}

#[derive(Default)]
struct Gate {
    paused: bool,
    ops: HashSet<SourceOp>,
    pages: HashSet<u32>,
}

impl Gate {
    fn holds(&self, op: SourceOp, page: Option<u32>) -> bool {
        self.paused || self.ops.contains(&op) || page.is_some_and(|p| self.pages.contains(&p))
    }
}

impl MemorySource {
    pub fn new(posts: Vec<Post>) -> Self {
        let (gate, _) = watch::channel(Gate::default());
        MemorySource {
            inner: Mutex::new(Inner {
                posts,
                threads: HashMap::new(),
                failing: HashSet::new(),
                calls: HashMap::new(),
                next_comment_id: 1,
                commenter: Config::default().current_user,
            }),
            gate,
        }
    }

    /// The next confirmed comment gets id `c-<first>`.
    pub fn with_comment_ids_from(self, first: u64) -> Self {
        self.inner.lock().next_comment_id = first;
        self
    }

    /// Author echoed on confirmed comments.
    pub fn with_commenter(self, author: Author) -> Self {
        self.inner.lock().commenter = author;
        self
    }

    pub fn with_thread(self, post_id: PostId, comments: Vec<Comment>) -> Self {
        self.inner.lock().threads.insert(post_id, comments);
        self
    }

    pub fn fail(&self, op: SourceOp) {
        self.inner.lock().failing.insert(op);
    }

    pub fn recover(&self, op: SourceOp) {
        self.inner.lock().failing.remove(&op);
    }

    pub fn pause(&self) {
        self.gate.send_modify(|g| g.paused = true);
    }

    pub fn resume(&self) {
        self.gate.send_modify(|g| g.paused = false);
    }

    pub fn hold(&self, op: SourceOp) {
        self.gate.send_modify(|g| {
            g.ops.insert(op);
        });
    }

    pub fn release(&self, op: SourceOp) {
        self.gate.send_modify(|g| {
            g.ops.remove(&op);
        });
    }

    pub fn hold_page(&self, page: u32) {
        self.gate.send_modify(|g| {
            g.pages.insert(page);
        });
    }

    pub fn release_page(&self, page: u32) {
        self.gate.send_modify(|g| {
            g.pages.remove(&page);
        });
    }

    pub fn calls(&self, op: SourceOp) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Yields until `op` has been called at least `count` times.
    pub async fn wait_for_calls(&self, op: SourceOp, count: usize) {
        while self.calls(op) < count {
            tokio::task::yield_now().await;
        }
    }

    /// The server-side copy of a post.
    pub fn stored_post(&self, id: &PostId) -> Option<Post> {
        self.inner.lock().posts.iter().find(|p| &p.id == id).cloned()
    }

    /// Replaces the server-side posts, e.g. to simulate new content
    /// showing up before a refresh.
    pub fn set_posts(&self, posts: Vec<Post>) {
        self.inner.lock().posts = posts;
    }

    /// Counts the call and settles whether it fails.
    fn enter(&self, op: SourceOp) -> Result<(), SourceError> {
        let mut inner = self.inner.lock();
        *inner.calls.entry(op).or_insert(0) += 1;
        if inner.failing.contains(&op) {
            debug!("memory source failing {op:?}");
            return Err(SourceError::Other(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    /// Waits until the gate lets a reply to `op` through.
    async fn reply<T>(&self, op: SourceOp, page: Option<u32>, result: T) -> T {
        let mut gate = self.gate.subscribe();
        loop {
            let held = gate.borrow_and_update().holds(op, page);
            if !held {
                break;
            }
            if gate.changed().await.is_err() {
                break;
            }
        }
        result
    }
}

impl FeedSource for MemorySource {
    async fn fetch_posts_page(&self, page: u32, page_size: usize) -> Result<Page, SourceError> {
        let result = self.enter(SourceOp::FetchPage).map(|()| {
            let inner = self.inner.lock();
            let start = (page.saturating_sub(1) as usize).saturating_mul(page_size);
            let items: Vec<Post> = inner
                .posts
                .iter()
                .skip(start)
                .take(page_size)
                .cloned()
                .collect();
            Page {
                has_more: start + items.len() < inner.posts.len(),
                items,
            }
        });
        self.reply(SourceOp::FetchPage, Some(page), result).await
    }

    async fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, SourceError> {
        let result = self.enter(SourceOp::FetchComments).map(|()| {
            self.inner
                .lock()
                .threads
                .get(post_id)
                .cloned()
                .unwrap_or_default()
        });
        self.reply(SourceOp::FetchComments, None, result).await
    }

    async fn submit_like(&self, post_id: &PostId, liked: bool) -> Result<LikeReceipt, SourceError> {
        let result = self.enter(SourceOp::Like).and_then(|()| {
            let mut inner = self.inner.lock();
            let post = inner
                .posts
                .iter_mut()
                .find(|p| &p.id == post_id)
                .ok_or_else(|| SourceError::Other(format!("unknown post {post_id}")))?;
            if post.liked_by_current_user != liked {
                post.liked_by_current_user = liked;
                post.like_count = if liked {
                    post.like_count + 1
                } else {
                    post.like_count.saturating_sub(1)
                };
            }
            Ok(LikeReceipt {
                like_count: Some(post.like_count),
                liked_by_current_user: Some(post.liked_by_current_user),
            })
        });
        self.reply(SourceOp::Like, None, result).await
    }

    async fn submit_share(
        &self,
        post_id: &PostId,
        shared: bool,
    ) -> Result<ShareReceipt, SourceError> {
        let result = self.enter(SourceOp::Share).and_then(|()| {
            let mut inner = self.inner.lock();
            let post = inner
                .posts
                .iter_mut()
                .find(|p| &p.id == post_id)
                .ok_or_else(|| SourceError::Other(format!("unknown post {post_id}")))?;
            if post.shared_by_current_user != shared {
                post.shared_by_current_user = shared;
                post.share_count = if shared {
                    post.share_count + 1
                } else {
                    post.share_count.saturating_sub(1)
                };
            }
            Ok(ShareReceipt {
                share_count: Some(post.share_count),
            })
        });
        self.reply(SourceOp::Share, None, result).await
    }

    async fn submit_comment(&self, post_id: &PostId, text: &str) -> Result<Comment, SourceError> {
        let result = self.enter(SourceOp::Comment).map(|()| {
            let mut inner = self.inner.lock();
            let id = CommentId(format!("c-{}", inner.next_comment_id));
            inner.next_comment_id += 1;
            let comment = Comment {
                id,
                content: text.to_owned(),
                author: inner.commenter.clone(),
                created_at: Utc::now(),
                like_count: Some(0),
                liked_by_current_user: Some(false),
                pending: false,
            };
            inner
                .threads
                .entry(post_id.clone())
                .or_default()
                .push(comment.clone());
            comment
        });
        self.reply(SourceOp::Comment, None, result).await
    }
}
