//! Basic example demonstrating GET, POST, and upload requests.
//!
//! This example shows how to:
//! - Create a client with a base URL, timeout, and default header
//! - Make GET requests with query parameters
//! - Make POST requests with a JSON body
//! - Register a request interceptor
//! - Read response data and metadata
//!
//! Run with: `cargo run --example basic_call`

use courier::{Client, Error, Params, RequestContext, RequestOptions, RequestPatch};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("courier=debug,basic_call=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .timeout(Duration::from_secs(10))
        .default_header("Accept", "application/json")?
        .build()?;

    client
        .interceptors()
        .request
        .register(|mut ctx: RequestContext| async move {
            ctx.request
                .headers
                .insert("x-client", http::HeaderValue::from_static("courier-demo"));
            Ok(RequestPatch::request(ctx.request))
        });

    println!("=== GET Request Example ===");
    let response = client.get("/posts/1").await?.into_result()?;
    let post: Post = response.json()?;

    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!("Request latency: {:?}", response.latency);
    println!("Status code: {}", response.status);
    println!();

    println!("=== GET With Query Parameters ===");
    let response = client
        .get_with(
            "/posts",
            Params::new().with("userId", 1),
            RequestOptions::new(),
        )
        .await?
        .into_result()?;
    let posts: Vec<Post> = response.json()?;
    println!("User 1 has {} posts", posts.len());
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let response = client
        .post("/posts", courier::Body::json(&new_post)?)
        .await?
        .into_result()?;
    let created: Post = response.json()?;

    println!("Created post ID: {}", created.id);
    println!("Request latency: {:?}", response.latency);
    println!();

    println!("=== Accessing Response Metadata ===");
    println!("Final URL: {}", response.url);
    println!("Content-Type: {:?}", response.header("content-type"));
    println!("Was retried: {}", response.was_retried());

    Ok(())
}
