//! Guaranteed release around a guarded operation.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::warn;

/// Result of the release step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Released<R> {
    /// The release action ran to completion.
    Completed(R),
    /// The release action exceeded its time limit and was dropped.
    TimedOut(Duration),
}

/// Combined result of [`run_with_release`].
#[derive(Debug)]
pub struct Guarded<T, R> {
    /// The operation's output, or the panic message if it panicked.
    pub operation: Result<T, String>,
    /// What happened to the release action.
    pub release: Released<R>,
}

/// Runs `operation`, then always runs `release`.
///
/// A panic inside `operation` is caught and reported in
/// [`Guarded::operation`] after the release has run. The release future is
/// bounded by `release_timeout` when one is given; on timeout it is dropped.
///
/// The guarantee holds for every way `operation` can finish. It cannot hold
/// if the future returned by this function is itself dropped before
/// completion, so callers must drive it to the end.
pub async fn run_with_release<T, R, F, C, CFut>(
    operation: F,
    release: C,
    release_timeout: Option<Duration>,
) -> Guarded<T, R>
where
    F: Future<Output = T>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = R>,
{
    let operation = AssertUnwindSafe(operation)
        .catch_unwind()
        .await
        .map_err(|payload| {
            let message = panic_message(payload.as_ref());
            warn!("Guarded operation panicked: {}", message);
            message
        });

    let release = match release_timeout {
        Some(limit) => match tokio::time::timeout(limit, release()).await {
            Ok(value) => Released::Completed(value),
            Err(_) => {
                warn!("Release timed out after {:?}", limit);
                Released::TimedOut(limit)
            }
        },
        None => Released::Completed(release().await),
    };

    Guarded { operation, release }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_release_runs_after_success() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();

        let guarded = run_with_release(
            async { 7 },
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .await;

        assert_eq!(guarded.operation, Ok(7));
        assert_eq!(guarded.release, Released::Completed(()));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_runs_after_panic() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();

        let guarded: Guarded<(), ()> = run_with_release(
            async { panic!("engine crashed") },
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .await;

        assert_eq!(guarded.operation, Err("engine crashed".to_string()));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_timeout() {
        let guarded = run_with_release(
            async {},
            || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
            },
            Some(Duration::from_millis(20)),
        )
        .await;

        assert_eq!(guarded.release, Released::TimedOut(Duration::from_millis(20)));
    }

    #[test]
    fn test_panic_message_formats() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
