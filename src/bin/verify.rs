use anyhow::{Context, Result};
use clap::Parser;
use postfeed::Config;
use reqwest::Client;
use serde_json::Value;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the API. Defaults to FEED_API_BASE_URL
    /// Ex: https://dummyjson.com
    #[arg(long)]
    base_url: Option<String>,

    /// User to look up
    #[arg(long, default_value_t = 1)]
    user_id: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load_env_config()?;
    let base_url = args
        .base_url
        .unwrap_or(config.api_base_url)
        .trim_end_matches('/')
        .to_owned();

    let client = Client::new();

    let posts = fetch(&client, &format!("{base_url}/posts?limit=2&skip=0")).await?;
    println!(
        "Posts Response:\n{}",
        serde_json::to_string_pretty(&posts)?
    );

    let user = fetch(&client, &format!("{base_url}/users/{}", args.user_id)).await?;
    println!("User Response:\n{}", serde_json::to_string_pretty(&user)?);

    // Comments of the first post, if there is one
    if let Some(post_id) = posts["posts"][0]["id"].as_u64() {
        let comments = fetch(&client, &format!("{base_url}/posts/{post_id}/comments")).await?;
        println!(
            "Comments Response:\n{}",
            serde_json::to_string_pretty(&comments)?
        );
    }

    Ok(())
}

async fn fetch(client: &Client, url: &str) -> Result<Value> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?;
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read response text of {url}"))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse JSON from {url}"))
}
