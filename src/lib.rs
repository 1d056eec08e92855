mod config;
mod coordinator;
mod dummyjson;
mod error;
mod feed_source;
mod memory;
mod models;
mod placeholder;
mod store;

pub use config::Config;
pub use coordinator::{
    InteractionCoordinator, LikeState, LinkSharer, LogLinkSharer, ShareOutcome, ShareState,
};
pub use dummyjson::DummyJsonSource;
pub use error::{FeedError, FeedResult, FetchTarget, SourceError};
pub use feed_source::FeedSource;
pub use memory::{MemorySource, SourceOp};
pub use models::{
    Author, AuthorId, Comment, CommentId, InteractionKind, LikeReceipt, Page, Post, PostId,
    ShareReceipt,
};
pub use placeholder::{placeholder_posts, FeedView};
pub use store::{FeedSnapshot, FeedStore, LoadOutcome};
