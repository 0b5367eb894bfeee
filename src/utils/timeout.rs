//! Timeout constants and helpers.
//!
//! A timeout of `None` or `Duration::ZERO` means "wait forever"; every other
//! value bounds the wait and maps expiry to [`ProtocolError::Timeout`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ProtocolError, Result};

/// How long a client waits for the connection echo
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long reassembly waits for each continuation datagram
pub const FRAGMENT_TIMEOUT: Duration = Duration::from_millis(10);

/// Grace period for session workers when the listener shuts down
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalize a caller-supplied timeout: zero means unbounded
#[inline]
pub fn effective(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

/// Absolute deadline for a timeout, `None` when unbounded
#[inline]
pub fn deadline(timeout: Option<Duration>) -> Option<Instant> {
    effective(timeout).map(|t| Instant::now() + t)
}

/// Run `fut` until `deadline`, mapping expiry to [`ProtocolError::Timeout`]
pub async fn until<F, T>(deadline: Option<Instant>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ProtocolError::Timeout)?,
        None => fut.await,
    }
}

/// Run `fut` for at most `timeout`
pub async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    until(deadline(timeout), fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_unbounded() {
        assert_eq!(effective(Some(Duration::ZERO)), None);
        assert_eq!(effective(None), None);
        assert_eq!(
            effective(Some(Duration::from_millis(5))),
            Some(Duration::from_millis(5))
        );
    }

    #[tokio::test]
    async fn test_expiry_maps_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let result = with_timeout(Some(Duration::from_millis(20)), slow).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let failing = async { Err::<(), _>(ProtocolError::NotConnected) };
        let result = with_timeout(Some(Duration::from_secs(1)), failing).await;
        assert!(matches!(result, Err(ProtocolError::NotConnected)));
    }
}
