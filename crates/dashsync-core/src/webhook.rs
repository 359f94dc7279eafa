//! Shared-secret gate for externally forced refreshes
//!
//! The gate answers whether the caller is authenticated; it never waits for
//! the refresh it starts. With no secret configured every request is
//! rejected, so forced refresh is disabled rather than open.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::coordinator::{RefreshMode, RefreshOutcome, RefreshTrigger};
use crate::error::AuthError;

/// Proof that a forced refresh was accepted
#[derive(Debug)]
pub struct WebhookReceipt {
    pub accepted_at: DateTime<Utc>,
    /// The spawned refresh. Dropping it detaches the task.
    pub refresh: JoinHandle<RefreshOutcome>,
}

/// Authenticates forced-refresh requests
pub struct WebhookGate {
    /// Hash of the configured secret; comparing hashes keeps the check
    /// constant-time regardless of token length
    secret: Option<blake3::Hash>,
    trigger: Arc<dyn RefreshTrigger>,
}

impl WebhookGate {
    /// Create a gate. An empty secret counts as not configured.
    pub fn new(secret: Option<&str>, trigger: Arc<dyn RefreshTrigger>) -> Self {
        let secret = secret
            .filter(|s| !s.is_empty())
            .map(|s| blake3::hash(s.as_bytes()));
        if secret.is_none() {
            warn!("No refresh secret configured; forced refresh is disabled");
        }
        Self { secret, trigger }
    }

    /// Whether forced refresh can ever be accepted
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check the provided token without triggering anything
    pub fn authenticate(&self, provided: Option<&str>) -> Result<(), AuthError> {
        let expected = self.secret.as_ref().ok_or(AuthError::SecretNotConfigured)?;
        let provided = provided.ok_or(AuthError::MissingToken)?;

        if blake3::hash(provided.as_bytes()) == *expected {
            Ok(())
        } else {
            Err(AuthError::TokenMismatch)
        }
    }

    /// Authenticate and, on success, start a forced refresh in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle(&self, provided: Option<&str>) -> Result<WebhookReceipt, AuthError> {
        if let Err(e) = self.authenticate(provided) {
            warn!(reason = %e, "Rejected forced refresh request");
            return Err(e);
        }

        let trigger = Arc::clone(&self.trigger);
        let refresh = tokio::spawn(async move { trigger.trigger(RefreshMode::Forced).await });

        info!("Accepted forced refresh request");
        Ok(WebhookReceipt {
            accepted_at: Utc::now(),
            refresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTrigger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RefreshTrigger for CountingTrigger {
        async fn trigger(&self, mode: RefreshMode) -> RefreshOutcome {
            assert_eq!(mode, RefreshMode::Forced);
            self.calls.fetch_add(1, Ordering::SeqCst);
            RefreshOutcome::Committed { version: 1 }
        }
    }

    #[tokio::test]
    async fn test_valid_token_triggers_forced_refresh() {
        let trigger = Arc::new(CountingTrigger::default());
        let gate = WebhookGate::new(Some("s3cret"), trigger.clone());

        let receipt = gate.handle(Some("s3cret")).unwrap();
        let outcome = receipt.refresh.await.unwrap();

        assert!(outcome.is_committed());
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_token_is_rejected() {
        let trigger = Arc::new(CountingTrigger::default());
        let gate = WebhookGate::new(Some("s3cret"), trigger.clone());

        assert_eq!(gate.handle(Some("s3cret ")).unwrap_err(), AuthError::TokenMismatch);
        assert_eq!(gate.handle(Some("")).unwrap_err(), AuthError::TokenMismatch);
        assert_eq!(gate.handle(None).unwrap_err(), AuthError::MissingToken);

        tokio::task::yield_now().await;
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_secret_fails_closed() {
        let trigger = Arc::new(CountingTrigger::default());

        for secret in [None, Some("")] {
            let gate = WebhookGate::new(secret, trigger.clone());
            assert!(!gate.is_enabled());
            assert_eq!(
                gate.handle(Some("")).unwrap_err(),
                AuthError::SecretNotConfigured
            );
            assert_eq!(gate.handle(None).unwrap_err(), AuthError::SecretNotConfigured);
        }

        tokio::task::yield_now().await;
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);
    }
}
