//! Example demonstrating error records, callbacks, and cancellation.
//!
//! This example shows how to:
//! - Route failures to status-specific callbacks
//! - Inspect an error record's kind, status, and response body
//! - Resolve failures as values with `suppress_errors`
//! - Retry server errors after a fixed delay
//! - Cancel outstanding requests
//!
//! Run with: `cargo run --example error_handling`

use courier::{Callbacks, Client, Error, ErrorKind, Outcome};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("courier=info")
        .init();

    let callbacks = Callbacks::new()
        .on_not_found(|e| println!("  [callback] not found: {}", e.message))
        .on_server_error(|e| println!("  [callback] server error {}", e.status))
        .on_abort(|e| println!("  [callback] aborted: {}", e.message))
        .on_error(|e| println!("  [callback] unhandled {} error: {}", e.kind(), e.message));

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .retries(2, Duration::from_millis(500))
        .error_interceptor(|record| record.with_extra("app", "error_handling demo"))
        .callbacks(callbacks.clone())
        .build()?;

    println!("=== Example 1: Handling HTTP Errors ===");
    match client.get("/posts/999999").await {
        Ok(outcome) => println!("Success: {:?}", outcome.response().map(|r| &r.data)),
        Err(Error::Request(record)) => {
            println!("Request failed!");
            println!("  Kind: {}", record.kind());
            println!("  Status: {}", record.status);
            println!("  Message: {}", record.message);
            println!("  Extras: {:?}", record.extras);
            if let Some(response) = record.response() {
                println!("  Body: {}", response.data);
            }
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 2: Suppressed Errors ===");
    let quiet = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .suppress_errors(true)
        .callbacks(callbacks)
        .build()?;

    match quiet.get("/does-not-exist").await? {
        Outcome::Success(response) => println!("Status: {}", response.status),
        Outcome::Failure(record) => {
            println!("Resolved with a failure record:");
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    println!();

    println!("=== Example 3: Network Errors ===");
    let unreachable = Client::builder()
        .base_url("http://127.0.0.1:1")?
        .build()?;

    if let Err(error) = unreachable.get("/anything").await {
        println!("Kind: {:?}", error.kind());
        println!("Retryable: {}", error.is_retryable());
    }
    println!();

    println!("=== Example 4: Cancelling Requests ===");
    let (result, cancelled) = tokio::join!(client.get("/posts"), async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        client.abort_all(Some("demo is shutting down"))
    });
    println!("Cancelled {} request(s)", cancelled);
    match result {
        Err(error) if error.kind() == Some(ErrorKind::Abort) => println!("Request was aborted"),
        Err(error) => println!("Request failed: {}", error),
        Ok(_) => println!("Request finished before it could be cancelled"),
    }

    Ok(())
}
