//! Cancellation and deadline tracking for one unit of work.

use super::state::Interrupt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub(crate) struct Watch {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Watch {
    /// Starts watching; the deadline is counted from now.
    pub(crate) fn start(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|limit| (Instant::now() + limit, limit)),
        }
    }

    /// Polls for an interruption without waiting.
    pub(crate) fn check(&self) -> Option<Interrupt> {
        if self.token.is_cancelled() {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some((deadline, limit)) if Instant::now() >= deadline => {
                Some(Interrupt::TimedOut(limit))
            }
            _ => None,
        }
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub(crate) async fn interrupted(&self) -> Interrupt {
        match self.deadline {
            Some((deadline, limit)) => tokio::select! {
                biased;
                () = self.token.cancelled() => Interrupt::Cancelled,
                () = tokio::time::sleep_until(deadline) => Interrupt::TimedOut(limit),
            },
            None => {
                self.token.cancelled().await;
                Interrupt::Cancelled
            }
        }
    }
}
