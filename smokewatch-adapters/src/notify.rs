//! Out-of-band notification relay.

use async_trait::async_trait;
use tracing::info;

use crate::NotifyError;

/// Delivers plain alert text to a human.
///
/// Callers treat failures as recoverable: they log them and carry on.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Send `text` through the relay.
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// A notifier that only logs, for setups without a relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        info!(text, "notification (no relay configured)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("Food A stall alert!").await.is_ok());
    }
}
