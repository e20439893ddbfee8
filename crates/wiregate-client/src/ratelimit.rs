//! Token-bucket rate limiting
//!
//! Two independent limiters mirror the remote service's throttling
//! rules: connection attempts (1 per 5 seconds) and outbound messages
//! (120 per 60 seconds). Waits are cancellable; cancellation aborts
//! only the attempt in progress.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use tokio_util::sync::CancellationToken;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const fn nz(value: u32) -> NonZeroU32 {
    match NonZeroU32::new(value) {
        Some(v) => v,
        None => panic!("rate limit constant must be non-zero"),
    }
}

/// Errors from rate-limited waits
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("wait cancelled by shutdown")]
    Cancelled,
}

/// A cancellable token-bucket limiter
pub struct Limiter {
    inner: DirectLimiter,
}

impl Limiter {
    /// Limiter for connection attempts: burst 1, refill every 5 seconds
    #[must_use]
    pub fn connect() -> Self {
        Self {
            inner: RateLimiter::direct(Quota::per_minute(nz(12)).allow_burst(nz(1))),
        }
    }

    /// Limiter for outbound messages: burst 120 per 60 seconds
    #[must_use]
    pub fn message() -> Self {
        Self {
            inner: RateLimiter::direct(Quota::per_minute(nz(120))),
        }
    }

    /// Wait until a token is available or the shutdown signal fires
    pub async fn wait(&self, shutdown: &CancellationToken) -> Result<(), RateLimitError> {
        tokio::select! {
            () = shutdown.cancelled() => Err(RateLimitError::Cancelled),
            () = self.inner.until_ready() => Ok(()),
        }
    }

    /// Take a token without waiting, if one is available
    pub fn try_wait(&self) -> bool {
        self.inner.check().is_ok()
    }
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_token_available_immediately() {
        let limiter = Limiter::connect();
        let shutdown = CancellationToken::new();

        assert_eq!(limiter.wait(&shutdown).await, Ok(()));
    }

    #[tokio::test]
    async fn test_connect_burst_is_one() {
        let limiter = Limiter::connect();

        assert!(limiter.try_wait());
        assert!(!limiter.try_wait());
    }

    #[tokio::test]
    async fn test_message_burst_allows_many() {
        let limiter = Limiter::message();

        for _ in 0..120 {
            assert!(limiter.try_wait());
        }
        assert!(!limiter.try_wait());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_wait() {
        let limiter = Limiter::connect();
        let shutdown = CancellationToken::new();

        // Drain the single available token so the next wait blocks
        assert!(limiter.try_wait());

        let waiter = limiter.wait(&shutdown);
        shutdown.cancel();
        assert_eq!(waiter.await, Err(RateLimitError::Cancelled));
    }
}
