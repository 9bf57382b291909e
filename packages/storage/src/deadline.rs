//! Caller-supplied deadlines for substrate I/O.
//!
//! A [`Deadline`] is created by whoever owns the unit of work (an HTTP
//! request, a collector tick) and passed down. When it lapses the in-flight
//! future is dropped, which cancels the underlying list/get, and the caller
//! gets [`StorageError::DeadlineExceeded`]. There is no retry here.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::StorageError;

/// An optional point in time after which storage calls fail fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never lapses.
    #[must_use]
    pub const fn none() -> Self {
        Self { at: None }
    }

    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
        }
    }

    /// Time left before the deadline, or `None` if unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Runs `fut`, failing with [`StorageError::DeadlineExceeded`] if the
    /// deadline lapses first.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, or `DeadlineExceeded`.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match self.at {
            None => fut.await,
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| StorageError::DeadlineExceeded { operation })?,
        }
    }
}
