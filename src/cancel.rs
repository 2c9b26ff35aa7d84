//! Cooperative cancellation
//!
//! [`CancellationToken`] wraps [`tokio_util::sync::CancellationToken`] and adds
//! an optional deadline. Child tokens observe their parent, so cancelling the
//! run token reaches every task, while a child with a deadline times out on its
//! own without touching its siblings. The token is only ever polled, so no
//! async runtime is needed.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken as SignalToken;

/// Cheaply cloneable cancellation signal
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    signal: SignalToken,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled whenever `self` is
    pub fn child(&self) -> Self {
        Self {
            signal: self.signal.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child token that also cancels itself after `timeout`.
    ///
    /// An earlier deadline inherited from `self` still applies.
    pub fn child_with_timeout(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            signal: self.signal.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// True once this token, any ancestor, or a deadline has fired
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled() || self.deadline_passed()
    }

    /// True if the deadline fired while nothing cancelled the token explicitly
    pub fn is_timed_out(&self) -> bool {
        !self.signal.is_cancelled() && self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
