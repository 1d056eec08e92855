use std::future::Future;

use crate::error::SourceError;
use crate::models::{Comment, LikeReceipt, Page, PostId, ShareReceipt};

/// The remote side of a feed: where pages come from and where interactions
/// get confirmed.
pub trait FeedSource: Send + Sync + 'static {
    /// Fetches one page. `page` is 1-based.
    fn fetch_posts_page(
        &self,
        page: u32,
        page_size: usize,
    ) -> impl Future<Output = Result<Page, SourceError>> + Send;
    fn fetch_comments(
        &self,
        post_id: &PostId,
    ) -> impl Future<Output = Result<Vec<Comment>, SourceError>> + Send;
    /// `liked` is the state being requested: `true` likes, `false` unlikes.
    fn submit_like(
        &self,
        post_id: &PostId,
        liked: bool,
    ) -> impl Future<Output = Result<LikeReceipt, SourceError>> + Send;
    fn submit_share(
        &self,
        post_id: &PostId,
        shared: bool,
    ) -> impl Future<Output = Result<ShareReceipt, SourceError>> + Send;
    fn submit_comment(
        &self,
        post_id: &PostId,
        text: &str,
    ) -> impl Future<Output = Result<Comment, SourceError>> + Send;
}
