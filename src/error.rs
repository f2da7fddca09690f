use thiserror::Error;

use crate::driver::Handle;

/// Failures the operator is told about
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no target window found; start the assistant, then /scan")]
    NoTarget,

    #[error("target {0} is gone")]
    TargetGone(Handle),

    #[error("could not deliver input to {0}; the window may have closed")]
    InjectionFailure(Handle),

    #[error("delivery queue is full ({capacity} messages)")]
    QueueFull { capacity: usize },
}
