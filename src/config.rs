use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dotenv::dotenv;

use crate::models::{Author, AuthorId};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub page_size: usize,
    /// Comments attached to each fetched post. `0` skips the lookup.
    pub comment_preview: usize,
    /// Artificial latency for confirms the API has no endpoint for.
    pub confirm_delay: Duration,
    pub share_base_url: String,
    pub max_comment_chars: usize,
    pub current_user: Author,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: "https://dummyjson.com".to_owned(),
            page_size: 10,
            comment_preview: 3,
            confirm_delay: Duration::from_millis(500),
            share_base_url: "https://yourapp.com".to_owned(),
            max_comment_chars: 500,
            current_user: Author {
                id: AuthorId("current-user-id".to_owned()),
                display_name: "Current User".to_owned(),
                handle: "currentuser".to_owned(),
                avatar_url: "https://i.pravatar.cc/150?img=1".to_owned(),
            },
        }
    }
}

impl Config {
    /// Loads configuration from the environment, reading a local `.env`
    /// first if there is one. Unset variables keep their defaults.
    pub fn load_env_config() -> Result<Self> {
        // A missing .env is fine; the process environment still applies.
        let _ = dotenv();
        let defaults = Config::default();
        let user = defaults.current_user;

        Ok(Config {
            api_base_url: var_or("FEED_API_BASE_URL", defaults.api_base_url)
                .trim_end_matches('/')
                .to_owned(),
            page_size: positive_or("FEED_PAGE_SIZE", defaults.page_size)?,
            comment_preview: parsed_or("FEED_COMMENT_PREVIEW", defaults.comment_preview)?,
            confirm_delay: Duration::from_millis(parsed_or(
                "FEED_CONFIRM_DELAY_MS",
                defaults.confirm_delay.as_millis() as u64,
            )?),
            share_base_url: var_or("FEED_SHARE_BASE_URL", defaults.share_base_url)
                .trim_end_matches('/')
                .to_owned(),
            max_comment_chars: parsed_or("FEED_MAX_COMMENT_CHARS", defaults.max_comment_chars)?,
            current_user: Author {
                id: AuthorId(var_or("FEED_USER_ID", user.id.0)),
                display_name: var_or("FEED_USER_NAME", user.display_name),
                handle: var_or("FEED_USER_HANDLE", user.handle),
                avatar_url: var_or("FEED_USER_AVATAR", user.avatar_url),
            },
        })
    }
}

fn var_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn positive_or(key: &str, default: usize) -> Result<usize> {
    let value = parsed_or(key, default)?;
    if value == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(value)
}
