//! A single, cloneable abort signal threaded through every suspension point:
//! agent → tool context; workflow → node context → nested agents. Preferred
//! over ad-hoc cancellation flags.

use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, Default)]
pub struct AbortSignal(CancellationToken);

impl AbortSignal {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }

    pub fn abort(&self) {
        self.0.cancel();
    }

    /// A child signal that is cancelled when either it or its parent is
    /// cancelled — used to scope cancellation to a nested agent/node while
    /// still observing the parent's abort.
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}
