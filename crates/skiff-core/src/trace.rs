//! Ambient trace-id propagation.
//!
//! The trace id flows through a scoped task-local: envelope construction
//! captures the ambient value, and the mailbox pump installs the
//! envelope's trace id around each handler invocation. The scope pops on
//! every exit path, including cancellation.

use std::future::Future;
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_TRACE_ID: String;
}

/// The ambient trace id, if one is installed.
pub fn current() -> Option<String> {
    CURRENT_TRACE_ID.try_with(|id| id.clone()).ok()
}

/// Capture the ambient trace id, generating a fresh one when the caller is
/// outside any trace scope.
pub fn capture_or_new() -> String {
    current().unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Run a future with the given trace id installed as the ambient value.
pub async fn scope<F>(trace_id: String, f: F) -> F::Output
where
    F: Future,
{
    CURRENT_TRACE_ID.scope(trace_id, f).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_installs_and_restores() {
        assert!(current().is_none());

        scope("outer".into(), async {
            assert_eq!(current().as_deref(), Some("outer"));

            scope("inner".into(), async {
                assert_eq!(current().as_deref(), Some("inner"));
            })
            .await;

            assert_eq!(current().as_deref(), Some("outer"));
        })
        .await;

        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_capture_generates_when_absent() {
        let fresh = capture_or_new();
        assert!(!fresh.is_empty());

        let captured = scope("t-1".into(), async { capture_or_new() }).await;
        assert_eq!(captured, "t-1");
    }
}
