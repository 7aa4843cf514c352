//! Deadlines and cancellation for public operations
//!
//! Dropping the in-flight future aborts any outstanding HTTP or chain call, so
//! an interrupted operation never yields a partial result. Nothing is
//! resumable: retry the whole operation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Fires the signal of every [`Cancellation`] created from it
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn cancellation(&self) -> Cancellation {
        Cancellation {
            deadline: None,
            signal: Some(self.sender.subscribe()),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// An optional deadline plus an optional cancel signal
///
/// The default never interrupts.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    signal: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail immediately if already cancelled or past the deadline
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.signal.as_ref().is_some_and(|s| *s.borrow()) {
            return Err(Interrupted::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Interrupted::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `future` to completion unless interrupted first
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let mut signal = self.signal.clone();
        let cancelled = async {
            match signal.as_mut() {
                Some(receiver) => {
                    let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
                    // a dropped handle can never fire
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            output = future => Ok(output),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            _ = cancelled => Err(Interrupted::Cancelled),
        }
    }
}
