use std::{future::Future, time::Duration};

use testing_framework_config::TimeoutPolicy;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RaceError {
    #[error("{message} (deadline {after:?})")]
    Elapsed { message: String, after: Duration },
    #[error("raced task failed: {0}")]
    Task(#[from] JoinError),
}

/// Races `pending` against a wall-clock deadline.
///
/// `pending` runs on its own task, so under [`TimeoutPolicy::Detach`] it keeps
/// running after the deadline fires and its eventual outcome is discarded.
/// Anything it holds open (a subscription, say) must be released by the
/// caller on the timeout path. [`TimeoutPolicy::Abort`] aborts the task
/// instead.
pub async fn race_with_timeout<F>(
    pending: F,
    timeout: Duration,
    on_timeout_message: impl Into<String>,
    policy: TimeoutPolicy,
) -> Result<F::Output, RaceError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut task = tokio::spawn(pending);

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(join_err)) if join_err.is_panic() => {
            std::panic::resume_unwind(join_err.into_panic())
        }
        Ok(Err(join_err)) => Err(RaceError::Task(join_err)),
        Err(_) => {
            let message = on_timeout_message.into();
            warn!(
                timeout_ms = timeout.as_millis(),
                ?policy,
                message = %message,
                "raced operation timed out"
            );
            if policy == TimeoutPolicy::Abort {
                task.abort();
            }
            Err(RaceError::Elapsed {
                message,
                after: timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use tokio::{sync::oneshot, time::sleep};

    use super::*;

    #[tokio::test]
    async fn returns_result_when_pending_finishes_first() {
        let result = race_with_timeout(
            async { 7 },
            Duration::from_secs(5),
            "never",
            TimeoutPolicy::Detach,
        )
        .await
        .unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn detached_operation_keeps_running_after_timeout() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let (done_tx, done_rx) = oneshot::channel();

        let err = race_with_timeout(
            async move {
                sleep(Duration::from_secs(10)).await;
                flag.store(true, Ordering::SeqCst);
                let _ = done_tx.send(());
            },
            Duration::from_secs(1),
            "waiting for slow operation",
            TimeoutPolicy::Detach,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            RaceError::Elapsed { ref message, .. } if message == "waiting for slow operation"
        ));
        assert!(!finished.load(Ordering::SeqCst));

        done_rx.await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_policy_cancels_the_operation() {
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let err = race_with_timeout(
            async move {
                sleep(Duration::from_secs(10)).await;
                let _ = done_tx.send(());
            },
            Duration::from_secs(1),
            "aborted",
            TimeoutPolicy::Abort,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RaceError::Elapsed { .. }));
        assert!(done_rx.await.is_err());
    }
}
