//! Cooperative cancellation for in-flight operations.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::{CatalogError, Result};

/// Runs `future` unless `cancel` fires first.
///
/// Cancellation wins ties, so an already-cancelled token never starts the
/// work. Dropping the losing future aborts it; for process-backed futures this
/// kills the child.
pub(crate) async fn cancellable<T, F>(
    operation: &'static str,
    cancel: &CancellationToken,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CatalogError::cancelled(operation)),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = cancellable("probe", &cancel, async { Ok(()) }).await;
        assert!(matches!(result, Err(CatalogError::Cancelled { ref operation }) if operation == "probe"));
    }

    #[tokio::test]
    async fn test_cancellable_interrupts_pending_work() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let result: Result<()> = cancellable("sleep", &cancel, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(result.is_err_and(|e| e.is_cancelled()));
    }

    #[tokio::test]
    async fn test_cancellable_passes_result_through() {
        let result = cancellable("value", &CancellationToken::new(), async { Ok(7) }).await;
        assert_eq!(result.ok(), Some(7));
    }
}
