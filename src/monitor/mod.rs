//! Operator-driven supervision of one target.
//!
//! At most one session runs at a time. Starting a new one cancels the old
//! session and waits for its teardown before the new task is spawned.

mod machine;
mod session;

pub use machine::{Machine, Step, Thresholds};
pub use session::{Outcome, SessionConfig, SessionContext};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::operator::notify;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct ActiveMonitor {
    slot: Mutex<Option<Running>>,
}

impl ActiveMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever session is running with a new one for `ctx`
    pub async fn start(&self, ctx: SessionContext) {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            tracing::info!("cancelling previous monitor session");
            previous.cancel.cancel();
            let _ = previous.task.await;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(ctx, cancel.clone()));
        *slot = Some(Running { cancel, task });
    }

    /// Cancel the running session. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.slot.lock().await.take() else {
            return false;
        };
        let was_live = !running.task.is_finished();
        running.cancel.cancel();
        let _ = running.task.await;
        was_live
    }

    pub async fn is_running(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }
}

/// Run one session on its own task so a panic inside a tick ends only that
/// session.
async fn supervise(ctx: SessionContext, cancel: CancellationToken) {
    let channel = ctx.channel.clone();
    let handle = ctx.handle.clone();

    let inner = tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled,
            outcome = session::run(&ctx) => outcome,
        }
    });

    match inner.await {
        Ok(outcome) => tracing::info!(handle = %handle, ?outcome, "monitor session ended"),
        Err(e) if e.is_panic() => {
            tracing::error!(handle = %handle, error = %e, "monitor session panicked");
            notify(channel.as_ref(), "⚠️ monitor stopped unexpectedly");
        }
        Err(e) => tracing::warn!(handle = %handle, error = %e, "monitor task aborted"),
    }
}
