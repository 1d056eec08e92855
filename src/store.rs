use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{FeedError, FeedResult, FetchTarget};
use crate::feed_source::FeedSource;
use crate::models::{Post, PostId};

/// What a page load ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `received` posts came back, `added` of them were new to the store.
    Loaded { received: usize, added: usize },
    /// Nothing was requested: a load of the same kind (or a first-page
    /// load) was already running, or there is no more to load.
    Skipped,
    /// A newer first-page load replaced the list while this page was in
    /// flight, so its result was dropped.
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub posts: Vec<Post>,
    pub has_more: bool,
    pub next_page: u32,
    pub loading: bool,
}

/// The canonical, deduplicated list of posts.
///
/// All mutation goes through the methods here, each of which runs under a
/// single lock, so readers see an update either fully applied or not at all.
/// At most one load of each kind runs at a time. A first-page load may
/// start while a next-page load is in flight; once it commits, the older
/// page is discarded when it lands.
pub struct FeedStore<S> {
    source: Arc<S>,
    page_size: usize,
    state: Mutex<FeedState>,
    version: watch::Sender<u64>,
}

struct FeedState {
    posts: IndexMap<PostId, Post>,
    has_more: bool,
    next_page: u32,
    /// Bumped whenever a first page replaces the list.
    generation: u64,
    first_in_flight: bool,
    next_in_flight: bool,
}

#[derive(Clone, Copy)]
enum LoadKind {
    First,
    Next,
}

/// Clears the in-flight marker even if the load future is dropped.
struct InFlight<'a, S> {
    store: &'a FeedStore<S>,
    kind: LoadKind,
}

impl<S> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        {
            let mut state = self.store.state.lock();
            match self.kind {
                LoadKind::First => state.first_in_flight = false,
                LoadKind::Next => state.next_in_flight = false,
            }
        }
        self.store.mark_changed();
    }
}

impl<S: FeedSource> FeedStore<S> {
    pub fn new(source: Arc<S>, page_size: usize) -> Self {
        let (version, _) = watch::channel(0);
        FeedStore {
            source,
            page_size,
            state: Mutex::new(FeedState {
                posts: IndexMap::new(),
                has_more: true,
                next_page: 1,
                generation: 0,
                first_in_flight: false,
                next_in_flight: false,
            }),
            version,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetches page 1 and replaces the whole list with it.
    ///
    /// On error the current posts are left exactly as they were. A call made
    /// while another first-page load is running is skipped.
    pub async fn load_first_page(&self, page_size: usize) -> FeedResult<LoadOutcome> {
        check_page_size(page_size)?;
        {
            let mut state = self.state.lock();
            if state.first_in_flight {
                debug!("First page already loading");
                return Ok(LoadOutcome::Skipped);
            }
            state.first_in_flight = true;
        }
        let _in_flight = InFlight {
            store: self,
            kind: LoadKind::First,
        };
        self.mark_changed();

        let page = self
            .source
            .fetch_posts_page(1, page_size)
            .await
            .map_err(|source| {
                warn!("First page load failed: {source}");
                FeedError::Fetch {
                    target: FetchTarget::Page(1),
                    source,
                }
            })?;

        let received = page.items.len();
        let mut state = self.state.lock();
        state.generation += 1;
        state.posts.clear();
        for post in page.items {
            state.posts.entry(post.id.clone()).or_insert(post);
        }
        state.has_more = received == page_size && page.has_more;
        state.next_page = 2;
        let added = state.posts.len();
        info!(
            "Loaded first page: {} posts, has_more={}",
            added, state.has_more
        );
        Ok(LoadOutcome::Loaded { received, added })
    }

    /// Fetches the page at the cursor and appends the posts not already
    /// present.
    pub async fn load_next_page(&self, page_size: usize) -> FeedResult<LoadOutcome> {
        check_page_size(page_size)?;
        let (page_number, generation) = {
            let mut state = self.state.lock();
            if state.next_in_flight || state.first_in_flight || !state.has_more {
                return Ok(LoadOutcome::Skipped);
            }
            state.next_in_flight = true;
            (state.next_page, state.generation)
        };
        let _in_flight = InFlight {
            store: self,
            kind: LoadKind::Next,
        };
        self.mark_changed();

        let page = self
            .source
            .fetch_posts_page(page_number, page_size)
            .await
            .map_err(|source| {
                warn!("Loading page {page_number} failed: {source}");
                FeedError::Fetch {
                    target: FetchTarget::Page(page_number),
                    source,
                }
            })?;

        let received = page.items.len();
        let mut state = self.state.lock();
        if state.generation != generation || state.next_page != page_number {
            debug!("Dropping stale page {page_number}");
            return Ok(LoadOutcome::Discarded);
        }

        let before = state.posts.len();
        for post in page.items {
            if state.posts.contains_key(&post.id) {
                debug!("Skipping duplicate post {}", post.id);
                continue;
            }
            state.posts.insert(post.id.clone(), post);
        }
        let added = state.posts.len() - before;
        state.next_page += 1;
        state.has_more = received == page_size && page.has_more;
        info!(
            "Loaded page {page_number}: {received} received, {added} new, has_more={}",
            state.has_more
        );
        Ok(LoadOutcome::Loaded { received, added })
    }

    /// `load_first_page` with the store's page size.
    pub async fn refresh(&self) -> FeedResult<LoadOutcome> {
        self.load_first_page(self.page_size).await
    }

    /// `load_next_page` with the store's page size.
    pub async fn load_more(&self) -> FeedResult<LoadOutcome> {
        self.load_next_page(self.page_size).await
    }

    /// Replaces a post's confirmed comments with the server's thread.
    /// Pending comments stay at the tail.
    pub async fn load_comments(&self, id: &PostId) -> FeedResult<()> {
        if !self.contains(id) {
            return Err(FeedError::PostNotFound(id.clone()));
        }
        let thread = self.source.fetch_comments(id).await.map_err(|source| {
            warn!("Loading comments for {id} failed: {source}");
            FeedError::Fetch {
                target: FetchTarget::Comments(id.clone()),
                source,
            }
        })?;

        self.modify_post(id, |post| {
            let pending: Vec<_> = post.comments.drain(..).filter(|c| c.pending).collect();
            post.comments = thread;
            post.comments.extend(pending);
        });
        Ok(())
    }
}

fn check_page_size(page_size: usize) -> FeedResult<()> {
    if page_size == 0 {
        return Err(FeedError::Validation(
            "page size must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

impl<S> FeedStore<S> {
    pub fn get_post(&self, id: &PostId) -> Option<Post> {
        self.state.lock().posts.get(id).cloned()
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.state.lock().posts.contains_key(id)
    }

    /// Writes `updater(post)` back in place of the post. Returns `false`
    /// and does nothing if `id` is absent. The id itself cannot be changed.
    pub fn replace_post(&self, id: &PostId, updater: impl FnOnce(&Post) -> Post) -> bool {
        self.modify_post(id, |post| {
            let mut next = updater(post);
            next.id = post.id.clone();
            *post = next;
        })
        .is_some()
    }

    /// Runs `f` on the post under the store lock.
    pub fn modify_post<R>(&self, id: &PostId, f: impl FnOnce(&mut Post) -> R) -> Option<R> {
        let result = {
            let mut state = self.state.lock();
            state.posts.get_mut(id).map(|post| {
                let result = f(post);
                post.id = id.clone();
                result
            })
        };
        if result.is_some() {
            self.mark_changed();
        }
        result
    }

    pub fn remove_post(&self, id: &PostId) -> Option<Post> {
        let removed = self.state.lock().posts.shift_remove(id);
        if removed.is_some() {
            self.mark_changed();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn is_loading(&self) -> bool {
        let state = self.state.lock();
        state.next_in_flight || state.first_in_flight
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock();
        FeedSnapshot {
            posts: state.posts.values().cloned().collect(),
            has_more: state.has_more,
            next_page: state.next_page,
            loading: state.next_in_flight || state.first_in_flight,
        }
    }

    /// A counter that ticks after every change to the store.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn mark_changed(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
