//! Composing deadlines onto cancellation tokens.
//!
//! The loader has no timeout of its own; callers that want one hand it a
//! token that also fires when the deadline passes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Returns a child of `parent` that is additionally cancelled after `timeout`.
///
/// Cancelling `parent` still cancels the returned token. The timer task exits
/// as soon as either fires. Must be called from within a tokio runtime.
pub fn with_deadline(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer_token.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                log::info!("[cancellation] deadline of {:?} reached, cancelling", timeout);
                timer_token.cancel();
            }
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_timeout() {
        let parent = CancellationToken::new();
        let token = with_deadline(&parent, Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("deadline token should fire");
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let token = with_deadline(&parent, Duration::from_secs(3600));
        parent.cancel();
        assert!(token.is_cancelled());
    }
}
