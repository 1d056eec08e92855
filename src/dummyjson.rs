use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, warn};
use parking_lot::Mutex;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::SourceError;
use crate::feed_source::FeedSource;
use crate::models::{
    Author, AuthorId, Comment, CommentId, LikeReceipt, Page, Post, PostId, ShareReceipt,
};

/// A `FeedSource` talking to a DummyJSON-compatible REST API.
///
/// Posts, users and comments are real endpoints. The API has nothing for
/// likes or shares, so those confirm after `confirm_delay` without echoing
/// any counts.
pub struct DummyJsonSource {
    client: Client,
    base_url: String,
    comment_preview: usize,
    confirm_delay: Duration,
    commenter_id: u64,
    authors: Mutex<HashMap<u64, Author>>,
}

#[derive(Deserialize)]
struct PostsResponse {
    posts: Vec<RawPost>,
    total: u64,
    skip: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPost {
    id: u64,
    body: String,
    #[serde(default)]
    reactions: Option<Reactions>,
    user_id: u64,
}

/// Reactions show up either as one number or as a per-type breakdown.
/// Only likes count towards `Post::like_count`.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(untagged)]
enum Reactions {
    Total(u64),
    Breakdown { likes: u64 },
}

impl Reactions {
    fn likes(&self) -> u64 {
        match self {
            Reactions::Total(total) => *total,
            Reactions::Breakdown { likes } => *likes,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    id: u64,
    first_name: String,
    last_name: String,
    username: String,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Deserialize)]
struct CommentsResponse {
    comments: Vec<RawComment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComment {
    id: u64,
    body: String,
    user: RawCommentUser,
    #[serde(default)]
    likes: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommentUser {
    id: u64,
    username: String,
    #[serde(default)]
    full_name: Option<String>,
}

impl DummyJsonSource {
    pub fn new(config: &Config) -> Self {
        DummyJsonSource {
            client: Client::new(),
            base_url: config.api_base_url.clone(),
            comment_preview: config.comment_preview,
            confirm_delay: config.confirm_delay,
            // The API wants a numeric user id for new comments.
            commenter_id: config.current_user.id.0.parse().unwrap_or(1),
            authors: Mutex::new(HashMap::new()),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn author(&self, user_id: u64) -> Author {
        let cached = self.authors.lock().get(&user_id).cloned();
        if let Some(author) = cached {
            return author;
        }
        let author = match self.get_json::<RawUser>(&format!("/users/{user_id}")).await {
            Ok(user) => author_from_user(user),
            Err(err) => {
                warn!("Couldn't load user {user_id}: {err}");
                fallback_author(user_id)
            }
        };
        self.authors.lock().insert(user_id, author.clone());
        author
    }

    async fn comment_preview(&self, post_id: u64) -> Vec<Comment> {
        if self.comment_preview == 0 {
            return Vec::new();
        }
        match self
            .get_json::<CommentsResponse>(&format!("/posts/{post_id}/comments"))
            .await
        {
            Ok(response) => response
                .comments
                .into_iter()
                .take(self.comment_preview)
                .map(comment_from_raw)
                .collect(),
            Err(err) => {
                warn!("Couldn't load comments of post {post_id}: {err}");
                Vec::new()
            }
        }
    }
}

impl FeedSource for DummyJsonSource {
    async fn fetch_posts_page(&self, page: u32, page_size: usize) -> Result<Page, SourceError> {
        let skip = (page.max(1) as usize - 1) * page_size;
        let response: PostsResponse = self
            .get_json(&format!("/posts?limit={page_size}&skip={skip}"))
            .await?;

        let has_more = response.skip + (response.posts.len() as u64) < response.total;
        let user_ids = distinct_user_ids(&response.posts);
        let (authors, previews) = tokio::join!(
            join_all(user_ids.iter().map(|&id| self.author(id))),
            join_all(response.posts.iter().map(|raw| self.comment_preview(raw.id))),
        );
        let authors: HashMap<u64, Author> = user_ids.into_iter().zip(authors).collect();

        let items = response
            .posts
            .into_iter()
            .zip(previews)
            .map(|(raw, comments)| {
                let author = authors
                    .get(&raw.user_id)
                    .cloned()
                    .unwrap_or_else(|| fallback_author(raw.user_id));
                post_from_raw(raw, author, comments)
            })
            .collect();
        Ok(Page { items, has_more })
    }

    async fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, SourceError> {
        let response: CommentsResponse = self
            .get_json(&format!("/posts/{post_id}/comments"))
            .await?;
        Ok(response.comments.into_iter().map(comment_from_raw).collect())
    }

    async fn submit_like(&self, post_id: &PostId, liked: bool) -> Result<LikeReceipt, SourceError> {
        debug!("Confirming like={liked} on {post_id}");
        tokio::time::sleep(self.confirm_delay).await;
        Ok(LikeReceipt::default())
    }

    async fn submit_share(
        &self,
        post_id: &PostId,
        shared: bool,
    ) -> Result<ShareReceipt, SourceError> {
        debug!("Confirming share={shared} on {post_id}");
        tokio::time::sleep(self.confirm_delay).await;
        Ok(ShareReceipt::default())
    }

    async fn submit_comment(&self, post_id: &PostId, text: &str) -> Result<Comment, SourceError> {
        let numeric_post: u64 = post_id
            .0
            .parse()
            .map_err(|_| SourceError::Other(format!("post id {post_id} is not numeric")))?;
        let body = serde_json::to_string(&json!({
            "body": text,
            "postId": numeric_post,
            "userId": self.commenter_id,
        }))?;

        let url = format!("{}/comments/add", self.base_url);
        debug!("POST {url}");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let raw: RawComment = serde_json::from_str(&response.text().await?)?;
        Ok(comment_from_raw(raw))
    }
}

/// Each author once, in first-seen order, so a page looks every user up a
/// single time.
fn distinct_user_ids(posts: &[RawPost]) -> Vec<u64> {
    let mut seen = HashSet::new();
    posts
        .iter()
        .map(|raw| raw.user_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn author_from_user(user: RawUser) -> Author {
    Author {
        id: AuthorId(user.id.to_string()),
        display_name: format!("{} {}", user.first_name, user.last_name),
        handle: user.username,
        avatar_url: user
            .image
            .unwrap_or_else(|| format!("https://i.pravatar.cc/150?img={}", user.id)),
    }
}

fn fallback_author(user_id: u64) -> Author {
    Author {
        id: AuthorId(user_id.to_string()),
        display_name: "Social User".to_owned(),
        handle: format!("socialuser{user_id}"),
        avatar_url: format!("https://i.pravatar.cc/150?img={user_id}"),
    }
}

fn post_from_raw(raw: RawPost, author: Author, comments: Vec<Comment>) -> Post {
    Post {
        id: PostId(raw.id.to_string()),
        content: raw.body,
        image_url: None,
        author,
        like_count: raw.reactions.as_ref().map(Reactions::likes).unwrap_or(0),
        liked_by_current_user: false,
        share_count: 0,
        shared_by_current_user: false,
        comments,
        // The API has no timestamps; older ids read as older posts.
        created_at: Utc::now() - chrono::Duration::hours(raw.id as i64),
    }
}

fn comment_from_raw(raw: RawComment) -> Comment {
    let user = raw.user;
    Comment {
        id: CommentId(raw.id.to_string()),
        content: raw.body,
        author: Author {
            id: AuthorId(user.id.to_string()),
            display_name: user.full_name.unwrap_or_default(),
            handle: user.username,
            avatar_url: format!("https://i.pravatar.cc/150?img={}", user.id + 10),
        },
        created_at: Utc::now(),
        like_count: raw.likes,
        liked_by_current_user: raw.likes.map(|_| false),
        pending: false,
    }
}
