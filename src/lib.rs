//! # Courier - an HTTP API client with a predictable request pipeline
//!
//! Courier wraps `reqwest` with the pieces most API clients end up writing by
//! hand: layered configuration, request and response interceptors, fixed-delay
//! retries, cancellation, and a single normalized error record that is routed
//! to status-specific callbacks exactly once per request.
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier::{Callbacks, Client, Params, Token};
//! use serde::Deserialize;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), courier::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(10))
//!         .token(Token::bearer("secret"))
//!         .retries(2, Duration::from_millis(250))
//!         .callbacks(
//!             Callbacks::new()
//!                 .on_unauthorized(|e| eprintln!("session expired: {}", e.message))
//!                 .on_error(|e| eprintln!("request failed: {}", e)),
//!         )
//!         .build()?;
//!
//!     // GET with query parameters
//!     let users: Vec<User> = client
//!         .get_with("/users", Params::new().with("page", 1), Default::default())
//!         .await?
//!         .into_result()?
//!         .json()?;
//!     println!("Fetched {} users", users.len());
//!
//!     // POST a JSON body
//!     let created = client.post("/users", json!({"name": "Alice"})).await?.into_result()?;
//!     let user: User = created.json()?;
//!     println!("Created user {} in {:?}", user.id, created.latency);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is described by an [`ErrorRecord`] tagged with an
//! [`ErrorKind`]: `network`, `http`, `application`, or `abort`. The record is
//! dispatched to the matching callback, then returned:
//!
//! ```no_run
//! use courier::{Client, Error, ErrorKind};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.get("/endpoint").await {
//!     Ok(outcome) => println!("Success: {:?}", outcome.response().map(|r| &r.data)),
//!     Err(Error::Request(record)) => match record.kind() {
//!         ErrorKind::Application => eprintln!("{}: {:?}", record.message, record.code),
//!         ErrorKind::Http => eprintln!("HTTP {}: {}", record.status, record.message),
//!         ErrorKind::Network | ErrorKind::Abort => eprintln!("{}", record),
//!     },
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! With [`ClientBuilder::suppress_errors`] failures resolve as
//! [`Outcome::Failure`] instead, after the callbacks have run.
//!
//! ## Retries
//!
//! Failed attempts are retried after a fixed delay while the retry condition
//! accepts the record. Cancellation always ends the loop.
//!
//! ```no_run
//! use courier::retry::{AnyOf, RetryOnNetworkError, RetryOnStatus};
//! use courier::{Client, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), courier::Error> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .retry(
//!         RetryPolicy::new(3, Duration::from_millis(500)).condition(AnyOf::new(vec![
//!             Box::new(RetryOnNetworkError),
//!             Box::new(RetryOnStatus::new([502, 503, 504])),
//!         ])),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod abort;
mod client;
pub mod config;
mod dispatch;
pub mod endpoint;
mod error;
pub mod form;
pub mod interceptor;
mod prepare;
mod processor;
pub mod rate_limit;
pub mod record;
mod request;
mod response;
pub mod retry;
mod transport;

pub use abort::{AbortController, AbortReason, AbortSignal};
pub use client::{Client, ClientBuilder};
pub use config::{Callbacks, Config, ConfigOverrides, JsonErrorResponse, ResponseType, Token};
pub use endpoint::{build_url, default_params_serializer, Params};
pub use error::{Error, Result};
pub use form::{FilePart, FormData, FormValue};
pub use interceptor::{
    InterceptorChain, InterceptorError, InterceptorId, Interceptors, RequestContext,
    RequestPatch, ResponseContext, ResponsePatch,
};
pub use prepare::{PreparedBody, PreparedRequest};
pub use rate_limit::RateLimitInfo;
pub use record::{ErrorDetails, ErrorKind, ErrorRecord};
pub use request::{Body, Request, RequestOptions, UploadFile};
pub use response::{Outcome, Response, ResponseData, ResponseMeta};
pub use retry::{RetryCondition, RetryPolicy};
