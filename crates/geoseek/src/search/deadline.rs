use std::{future::Future, time::Duration};

use geoseek_store::StoreError;
use tokio_util::sync::CancellationToken;

/// Why a bounded store call did not return rows.
#[derive(Debug)]
pub(super) enum CallError {
    Cancelled,
    Elapsed(Duration),
    Store(StoreError),
}

/// Await a store call under a per-call deadline, racing the cancellation token.
///
/// Cancellation is checked first so a cancelled search never starts another
/// backend round-trip.
pub(super) async fn call_with_deadline<T, F>(
    call: F,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<T, CallError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if cancel.is_cancelled() {
        return Err(CallError::Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CallError::Cancelled),
        outcome = tokio::time::timeout(deadline, call) => match outcome {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(err)) => Err(CallError::Store(err)),
            Err(_) => Err(CallError::Elapsed(deadline)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let cancel = CancellationToken::new();
        let outcome = call_with_deadline(
            futures::future::pending::<Result<(), StoreError>>(),
            Duration::from_secs(8),
            &cancel,
        )
        .await;
        assert!(matches!(outcome, Err(CallError::Elapsed(d)) if d == Duration::from_secs(8)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome =
            call_with_deadline(async { Ok::<_, StoreError>(1) }, Duration::from_secs(1), &cancel)
                .await;
        assert!(matches!(outcome, Err(CallError::Cancelled)));
    }

    #[tokio::test]
    async fn test_store_error_passes_through() {
        let cancel = CancellationToken::new();
        let outcome = call_with_deadline(
            async { Err::<(), _>(StoreError::new("boom")) },
            Duration::from_secs(1),
            &cancel,
        )
        .await;
        assert!(matches!(outcome, Err(CallError::Store(e)) if e.message == "boom"));
    }
}
