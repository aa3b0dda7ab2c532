//! Ordered request and response interceptor chains.
//!
//! Each interceptor is a `fulfilled` function paired with an optional
//! `rejected` hook. Interceptors run sequentially in registration order; each
//! receives the current context and returns a patch whose unset fields keep
//! the input value. When a `fulfilled` function fails, its `rejected` hook is
//! called with the error and the rest of the chain is skipped.

use crate::config::Config;
use crate::prepare::PreparedRequest;
use crate::response::{ResponseData, ResponseMeta};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The error an interceptor reports to abort the chain.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct InterceptorError {
    message: String,
}

impl InterceptorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A value that flows through an interceptor chain.
pub trait Intercept: Clone + Send + 'static {
    /// A partial replacement; unset fields keep the input value.
    type Patch: Default + Send + 'static;

    /// Applies `patch` over `self`.
    fn apply(self, patch: Self::Patch) -> Self;
}

/// What request interceptors observe: the effective configuration and the
/// prepared transport request.
#[derive(Clone)]
pub struct RequestContext {
    pub config: Config,
    pub request: PreparedRequest,
}

/// A partial replacement of a [`RequestContext`].
#[derive(Default)]
pub struct RequestPatch {
    pub config: Option<Config>,
    pub request: Option<PreparedRequest>,
}

impl RequestPatch {
    /// Replaces the prepared request.
    pub fn request(request: PreparedRequest) -> Self {
        Self {
            request: Some(request),
            ..Self::default()
        }
    }

    /// Replaces the configuration.
    pub fn config(config: Config) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }
}

impl Intercept for RequestContext {
    type Patch = RequestPatch;

    fn apply(self, patch: RequestPatch) -> Self {
        Self {
            config: patch.config.unwrap_or(self.config),
            request: patch.request.unwrap_or(self.request),
        }
    }
}

/// What response interceptors observe on the success path.
#[derive(Clone)]
pub struct ResponseContext {
    pub data: ResponseData,
    pub response: ResponseMeta,
    pub config: Config,
}

/// A partial replacement of a [`ResponseContext`].
#[derive(Default)]
pub struct ResponsePatch {
    pub data: Option<ResponseData>,
    pub response: Option<ResponseMeta>,
}

impl ResponsePatch {
    /// Replaces the payload.
    pub fn data(data: ResponseData) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

impl Intercept for ResponseContext {
    type Patch = ResponsePatch;

    fn apply(self, patch: ResponsePatch) -> Self {
        Self {
            data: patch.data.unwrap_or(self.data),
            response: patch.response.unwrap_or(self.response),
            config: self.config,
        }
    }
}

/// Identifies a registered interceptor for [`InterceptorChain::eject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(usize);

type Fulfilled<C> = Arc<
    dyn Fn(C) -> BoxFuture<'static, Result<<C as Intercept>::Patch, InterceptorError>>
        + Send
        + Sync,
>;
type Rejected = Arc<dyn Fn(&InterceptorError) + Send + Sync>;

struct Entry<C: Intercept> {
    id: InterceptorId,
    fulfilled: Fulfilled<C>,
    rejected: Option<Rejected>,
}

impl<C: Intercept> Clone for Entry<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            fulfilled: Arc::clone(&self.fulfilled),
            rejected: self.rejected.clone(),
        }
    }
}

/// An ordered, mutable list of interceptors.
///
/// Ids are never reused, so ejecting one interceptor leaves every other id
/// valid.
pub struct InterceptorChain<C: Intercept> {
    next_id: AtomicUsize,
    entries: Mutex<Vec<Entry<C>>>,
}

impl<C: Intercept> InterceptorChain<C> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Appends an interceptor without a `rejected` hook.
    pub fn register<F, Fut>(&self, fulfilled: F) -> InterceptorId
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C::Patch, InterceptorError>> + Send + 'static,
    {
        self.push(boxed(fulfilled), None)
    }

    /// Appends an interceptor with a `rejected` hook, called when `fulfilled` fails.
    pub fn register_with_rejected<F, Fut, R>(&self, fulfilled: F, rejected: R) -> InterceptorId
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C::Patch, InterceptorError>> + Send + 'static,
        R: Fn(&InterceptorError) + Send + Sync + 'static,
    {
        self.push(boxed(fulfilled), Some(Arc::new(rejected)))
    }

    /// Removes the interceptor registered under `id`.
    ///
    /// Returns `false` if no such interceptor is registered.
    pub fn eject(&self, id: InterceptorId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Removes every interceptor.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs `context` through the chain.
    ///
    /// The chain is snapshotted first, so registrations made while it runs
    /// take effect on the next request.
    pub async fn apply(&self, mut context: C) -> Result<C, InterceptorError> {
        let entries = self.lock().clone();

        for entry in entries {
            match (entry.fulfilled)(context.clone()).await {
                Ok(patch) => context = context.apply(patch),
                Err(error) => {
                    tracing::warn!(error = %error, "Interceptor rejected");
                    if let Some(rejected) = &entry.rejected {
                        rejected(&error);
                    }
                    return Err(error);
                }
            }
        }

        Ok(context)
    }

    fn push(&self, fulfilled: Fulfilled<C>, rejected: Option<Rejected>) -> InterceptorId {
        let id = InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry {
            id,
            fulfilled,
            rejected,
        });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry<C>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Intercept> Default for InterceptorChain<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn boxed<C, F, Fut>(fulfilled: F) -> Fulfilled<C>
where
    C: Intercept,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C::Patch, InterceptorError>> + Send + 'static,
{
    Arc::new(move |context| Box::pin(fulfilled(context)))
}

/// The request and response chains of a client.
#[derive(Default)]
pub struct Interceptors {
    pub request: InterceptorChain<RequestContext>,
    pub response: InterceptorChain<ResponseContext>,
}
