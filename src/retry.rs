//! Retry policy and conditions for handling transient failures.
//!
//! A logical request is attempted once, then retried up to
//! [`RetryPolicy::count`] more times with a fixed [`RetryPolicy::delay`]
//! between attempts, as long as the policy's [`RetryCondition`] accepts the
//! failure. Error callbacks are dispatched once, after the loop ends.

use crate::abort::AbortSignal;
use crate::interceptor::InterceptorError;
use crate::record::{ErrorKind, ErrorRecord};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How many times, how often, and on which failures to retry.
///
/// # Examples
///
/// ```
/// use courier::retry::{RetryOnStatus, RetryPolicy};
/// use std::time::Duration;
///
/// // Two retries, 250ms apart, on 502/503/504 only.
/// let policy = RetryPolicy::new(2, Duration::from_millis(250))
///     .condition(RetryOnStatus::new([502, 503, 504]));
/// assert_eq!(policy.count, 2);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub count: usize,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Decides whether a failed attempt is retried.
    pub condition: Arc<dyn RetryCondition>,
}

impl RetryPolicy {
    /// Creates a policy retrying server errors.
    pub fn new(count: usize, delay: Duration) -> Self {
        Self {
            count,
            delay,
            condition: Arc::new(RetryOnServerError),
        }
    }

    /// Replaces the retry condition.
    pub fn condition(mut self, condition: impl RetryCondition + 'static) -> Self {
        self.condition = Arc::new(condition);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0, Duration::from_millis(1000))
    }
}

/// Trait for deciding whether a failed attempt should be retried.
///
/// Any `Fn(&ErrorRecord) -> bool` closure is a condition.
///
/// # Examples
///
/// ```
/// use courier::retry::RetryCondition;
/// use courier::{ErrorKind, ErrorRecord};
///
/// struct RetryFirstTwoNetworkFailures;
///
/// impl RetryCondition for RetryFirstTwoNetworkFailures {
///     fn should_retry(&self, error: &ErrorRecord, attempt: usize) -> bool {
///         error.kind() == ErrorKind::Network && attempt <= 2
///     }
/// }
/// ```
pub trait RetryCondition: Send + Sync {
    /// Returns `true` if the attempt that produced `error` should be retried.
    ///
    /// `attempt` is 1-indexed: `1` is the initial attempt.
    fn should_retry(&self, error: &ErrorRecord, attempt: usize) -> bool;
}

impl<F> RetryCondition for F
where
    F: Fn(&ErrorRecord) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &ErrorRecord, _attempt: usize) -> bool {
        self(error)
    }
}

/// Retry on `status >= 500`. This is the default condition.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnServerError;

impl RetryCondition for RetryOnServerError {
    fn should_retry(&self, error: &ErrorRecord, _attempt: usize) -> bool {
        error.status >= 500
    }
}

/// Retry only on `network` failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnNetworkError;

impl RetryCondition for RetryOnNetworkError {
    fn should_retry(&self, error: &ErrorRecord, _attempt: usize) -> bool {
        error.kind() == ErrorKind::Network
    }
}

/// Retry only on the listed statuses.
#[derive(Debug, Clone)]
pub struct RetryOnStatus {
    statuses: Vec<u16>,
}

impl RetryOnStatus {
    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }
}

impl RetryCondition for RetryOnStatus {
    fn should_retry(&self, error: &ErrorRecord, _attempt: usize) -> bool {
        self.statuses.contains(&error.status)
    }
}

/// Retries if ANY of the conditions returns `true`.
pub struct AnyOf {
    conditions: Vec<Box<dyn RetryCondition>>,
}

impl AnyOf {
    pub fn new(conditions: Vec<Box<dyn RetryCondition>>) -> Self {
        Self { conditions }
    }
}

impl RetryCondition for AnyOf {
    fn should_retry(&self, error: &ErrorRecord, attempt: usize) -> bool {
        self.conditions
            .iter()
            .any(|c| c.should_retry(error, attempt))
    }
}

/// Retries only if ALL of the conditions return `true`.
pub struct AllOf {
    conditions: Vec<Box<dyn RetryCondition>>,
}

impl AllOf {
    pub fn new(conditions: Vec<Box<dyn RetryCondition>>) -> Self {
        Self { conditions }
    }
}

impl RetryCondition for AllOf {
    fn should_retry(&self, error: &ErrorRecord, attempt: usize) -> bool {
        self.conditions
            .iter()
            .all(|c| c.should_retry(error, attempt))
    }
}

/// Why one attempt failed.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// A classified failure, not yet dispatched to callbacks.
    Record(Box<ErrorRecord>),
    /// An interceptor rejected the response; never retried.
    Interceptor(InterceptorError),
}

impl From<ErrorRecord> for AttemptError {
    fn from(record: ErrorRecord) -> Self {
        AttemptError::Record(Box::new(record))
    }
}

/// Runs `attempt` until it succeeds, the policy is exhausted, or the
/// condition declines. Returns the last result and the number of attempts.
///
/// Abort failures end the loop immediately, and an abort during the delay
/// ends it with an `abort` record.
pub(crate) async fn execute_with_retry<T, F, Fut>(
    mut attempt: F,
    policy: &RetryPolicy,
    signal: &AbortSignal,
) -> (Result<T, AttemptError>, usize)
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        let error = match attempt(attempts).await {
            Ok(value) => return (Ok(value), attempts),
            Err(error) => error,
        };

        let record = match &error {
            AttemptError::Record(record) => record,
            AttemptError::Interceptor(_) => return (Err(error), attempts),
        };

        tracing::warn!(
            error = %record,
            attempt = attempts,
            "Request attempt failed"
        );

        let retries_used = attempts - 1;
        if record.kind() == ErrorKind::Abort
            || retries_used >= policy.count
            || !policy.condition.should_retry(record, attempts)
        {
            return (Err(error), attempts);
        }

        tracing::info!(
            delay_ms = policy.delay.as_millis(),
            attempt = attempts,
            retries_left = policy.count - retries_used,
            "Retrying request after delay"
        );

        tokio::select! {
            reason = signal.aborted() => {
                return (Err(ErrorRecord::abort(reason).into()), attempts);
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::{AbortController, AbortReason};
    use crate::record::ResponseInfo;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn http_record(status: u16) -> ErrorRecord {
        ErrorRecord::http(
            "failed",
            "https://api.test",
            ResponseInfo {
                status,
                status_text: String::new(),
                headers: BTreeMap::new(),
                data: Value::Null,
                rate_limit: None,
            },
        )
    }

    #[test]
    fn test_default_condition_is_server_errors() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.count, 0);
        assert_eq!(policy.delay, Duration::from_millis(1000));
        assert!(policy.condition.should_retry(&http_record(503), 1));
        assert!(!policy.condition.should_retry(&http_record(404), 1));
    }

    #[test]
    fn test_combinators_and_closures() {
        let any = AnyOf::new(vec![
            Box::new(RetryOnStatus::new([429])),
            Box::new(RetryOnServerError),
        ]);
        assert!(any.should_retry(&http_record(429), 1));
        assert!(any.should_retry(&http_record(500), 1));
        assert!(!any.should_retry(&http_record(400), 1));

        let all = AllOf::new(vec![
            Box::new(RetryOnServerError),
            Box::new(|e: &ErrorRecord| e.status != 501),
        ]);
        assert!(all.should_retry(&http_record(500), 1));
        assert!(!all.should_retry(&http_record(501), 1));
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let controller = AbortController::new();

        let (result, attempts) = execute_with_retry(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AttemptError::from(http_record(503))) }
            },
            &policy,
            &controller.signal(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_declined_condition_stops_immediately() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let controller = AbortController::new();

        let (result, attempts) = execute_with_retry(
            |_| async { Err::<(), _>(AttemptError::from(http_record(400))) },
            &policy,
            &controller.signal(),
        )
        .await;

        assert!(matches!(result, Err(AttemptError::Record(r)) if r.status == 400));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_abort_records_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::ZERO).condition(|_: &ErrorRecord| true);
        let controller = AbortController::new();

        let (_, attempts) = execute_with_retry(
            |_| async { Err::<(), _>(AttemptError::from(ErrorRecord::abort(AbortReason::Timeout))) },
            &policy,
            &controller.signal(),
        )
        .await;

        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_abort_during_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        let controller = AbortController::new();
        let signal = controller.signal();
        let aborter = controller.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            aborter.abort(AbortReason::Cancelled("stop".into()));
        });

        let (result, attempts) = execute_with_retry(
            |_| async { Err::<(), _>(AttemptError::from(http_record(500))) },
            &policy,
            &signal,
        )
        .await;

        assert_eq!(attempts, 1);
        match result {
            Err(AttemptError::Record(record)) => assert_eq!(record.kind(), ErrorKind::Abort),
            other => panic!("Expected abort record, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let controller = AbortController::new();

        let (result, attempts) = execute_with_retry(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(AttemptError::from(http_record(502)))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            &policy,
            &controller.signal(),
        )
        .await;

        assert_eq!(result.ok(), Some(3));
        assert_eq!(attempts, 3);
    }
}
