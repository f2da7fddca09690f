use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::machine::{Machine, Step, Thresholds};
use crate::detect::{classify, detect};
use crate::driver::Handle;
use crate::error::RelayError;
use crate::operator::{
    deliver_text, format_elapsed, notify, send_photo, truncate_chars, FollowUp, OperatorChannel,
    StatusLine,
};
use crate::queue::DeliveryQueue;
use crate::targets::TargetRegistry;
use crate::transcript;

/// Responses this short are noise (a bare prompt, a spinner frame)
const MIN_RESPONSE_CHARS: usize = 10;
const QUEUED_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    /// Zero disables the ambient feed
    pub screenshot_interval: Duration,
    pub max_duration: Duration,
    pub thresholds: Thresholds,
}

/// Everything one session needs, passed in rather than looked up globally
pub struct SessionContext {
    pub handle: Handle,
    pub label: String,
    pub channel: Arc<dyn OperatorChannel>,
    pub queue: Arc<DeliveryQueue>,
    pub targets: Arc<TargetRegistry>,
    /// Root of the assistant's session transcripts
    pub transcripts: Option<PathBuf>,
    pub config: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Finished with nothing left in the queue
    Completed,
    /// Grace ran out without the target ever starting
    NeverStarted,
    /// Stopped to let the operator answer a prompt
    PromptShown,
    TimedOut,
    TargetGone,
    /// A queued message could not be delivered
    InjectionFailed,
    Cancelled,
}

/// Periodic screenshots while the target works, skipped when nothing changed
struct ShotFeed {
    interval: Duration,
    last: Instant,
}

impl ShotFeed {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    async fn tick(&mut self, ctx: &SessionContext) {
        if self.interval.is_zero() || self.last.elapsed() < self.interval {
            return;
        }
        self.last = Instant::now();

        let Some(shot) = ctx.targets.driver().capture_screenshot(&ctx.handle).await else {
            return;
        };
        if ctx.targets.last_hash(&ctx.handle).as_deref() == Some(shot.hash.as_str()) {
            tracing::debug!(handle = %ctx.handle, "screen unchanged, skipping shot");
            return;
        }
        send_photo(ctx.channel.as_ref(), &shot, None);
        ctx.targets.set_last_hash(&ctx.handle, shot.hash);
    }
}

/// Drive one session until it reaches a terminal outcome.
///
/// Dropping the returned future at any await point deletes the live status
/// message.
pub async fn run(ctx: &SessionContext) -> Outcome {
    let driver = ctx.targets.driver();
    let cfg = ctx.config;

    let mut status = StatusLine::new(ctx.channel.clone());
    let mut machine = Machine::active(cfg.thresholds);
    let mut feed = ShotFeed::new(cfg.screenshot_interval);
    let mut started = Instant::now();
    let mut first = true;

    tracing::info!(handle = %ctx.handle, label = %ctx.label, "monitor session started");

    loop {
        if started.elapsed() >= cfg.max_duration {
            status.clear();
            notify(
                ctx.channel.as_ref(),
                &format!(
                    "⏰ {}: stopped watching after {}",
                    ctx.label,
                    format_elapsed(cfg.max_duration)
                ),
            );
            return Outcome::TimedOut;
        }

        let title = driver.read_title(&ctx.handle).await;
        if title.is_empty() {
            return target_gone(ctx, &mut status);
        }
        let reading = classify(&title);
        let step = if first {
            first = false;
            machine.start(reading)
        } else {
            machine.observe(reading)
        };
        tracing::debug!(
            handle = %ctx.handle,
            status = ?reading,
            phase = ?machine.phase(),
            idle = machine.idle_count(),
            ?step,
            "tick"
        );

        match step {
            Step::Hold | Step::Completed | Step::Resumed => {}
            Step::NeverStarted => {
                status.clear();
                final_shot(ctx, None).await;
                return Outcome::NeverStarted;
            }
            Step::Started | Step::Busy => {
                status.upsert(&busy_line(ctx, "thinking...", started));
                if show_prompt(ctx, &mut status).await {
                    return Outcome::PromptShown;
                }
            }
            Step::Verify => {
                let title = driver.read_title(&ctx.handle).await;
                if title.is_empty() {
                    return target_gone(ctx, &mut status);
                }
                match machine.verify(classify(&title)) {
                    Step::Completed => {
                        if let Some(outcome) = complete(ctx, &mut status, started).await {
                            return outcome;
                        }
                        machine.restart();
                        started = Instant::now();
                        feed = ShotFeed::new(cfg.screenshot_interval);
                    }
                    _ => {
                        tracing::debug!(handle = %ctx.handle, "idle flicker, still working");
                        status.upsert(&busy_line(ctx, "continuing...", started));
                    }
                }
            }
        }

        if machine.was_thinking() {
            feed.tick(ctx).await;
        }

        tokio::time::sleep(cfg.poll_interval).await;
    }
}

fn busy_line(ctx: &SessionContext, what: &str, started: Instant) -> String {
    let mut line = format!(
        "⏳ {} {} ({})",
        ctx.label,
        what,
        format_elapsed(started.elapsed())
    );
    if let Some(preview) = ctx.queue.preview() {
        line.push('\n');
        line.push_str(&preview);
    }
    line
}

fn target_gone(ctx: &SessionContext, status: &mut StatusLine) -> Outcome {
    status.clear();
    ctx.targets.invalidate(&ctx.handle);
    tracing::warn!(handle = %ctx.handle, "target disappeared during monitoring");
    notify(
        ctx.channel.as_ref(),
        &format!("⚠️ {}", RelayError::TargetGone(ctx.handle.clone())),
    );
    Outcome::TargetGone
}

/// Push a screenshot and the quick replies if the target is waiting on a choice
async fn show_prompt(ctx: &SessionContext, status: &mut StatusLine) -> bool {
    let text = ctx.targets.driver().read_text(&ctx.handle).await;
    let Some(prompt) = detect(&text) else {
        return false;
    };

    tracing::info!(
        handle = %ctx.handle,
        replies = prompt.replies.len(),
        "interactive prompt detected"
    );
    status.clear();
    final_shot(ctx, Some("🔔 waiting for your choice")).await;
    let body = format!("🔔 {} needs input:\n{}", ctx.label, prompt.text);
    if let Err(e) = ctx.channel.send_prompt(&body, &prompt.replies) {
        tracing::warn!(error = %e, "prompt not delivered");
    }
    true
}

/// Screenshot that bypasses the unchanged-screen check
async fn final_shot(ctx: &SessionContext, caption: Option<&str>) {
    ctx.targets.forget_hash(&ctx.handle);
    if let Some(shot) = ctx.targets.driver().capture_screenshot(&ctx.handle).await {
        send_photo(ctx.channel.as_ref(), &shot, caption);
        ctx.targets.set_last_hash(&ctx.handle, shot.hash);
    }
}

/// Report a confirmed completion and serve the next queued message.
/// `None` means a queued message went in and the session goes on.
async fn complete(
    ctx: &SessionContext,
    status: &mut StatusLine,
    started: Instant,
) -> Option<Outcome> {
    status.clear();
    let elapsed = format_elapsed(started.elapsed());
    tracing::info!(handle = %ctx.handle, %elapsed, "target finished");

    final_shot(ctx, None).await;
    let response = fetch_response(ctx).await;
    if meaningful(&response) {
        deliver_text(ctx.channel.as_ref(), &response);
    }

    let Some(next) = ctx.queue.dequeue_front() else {
        let text = format!("✅ {} finished ({})", ctx.label, elapsed);
        if let Err(e) = ctx.channel.send_follow_ups(&text, &FollowUp::ALL) {
            tracing::warn!(error = %e, "follow-up actions not delivered");
        }
        return Some(Outcome::Completed);
    };

    notify(
        ctx.channel.as_ref(),
        &format!("✅ {} finished ({})", ctx.label, elapsed),
    );
    let mut line = format!(
        "📤 sending queued message:\n{}",
        truncate_chars(&next, QUEUED_PREVIEW_CHARS)
    );
    if let Some(preview) = ctx.queue.preview() {
        line.push('\n');
        line.push_str(&preview);
    }
    status.upsert(&line);

    let in_flight = InFlight::new(ctx.channel.as_ref(), &next);
    let delivered = deliver_queued(ctx, &next).await;
    in_flight.settle();

    if delivered {
        ctx.targets.remember_payload(&ctx.handle, &next);
        return None;
    }

    status.clear();
    ctx.targets.invalidate(&ctx.handle);
    notify(
        ctx.channel.as_ref(),
        &format!(
            "❌ {}\nqueued message dropped: {}",
            RelayError::InjectionFailure(ctx.handle.clone()),
            truncate_chars(&next, QUEUED_PREVIEW_CHARS)
        ),
    );
    Some(Outcome::InjectionFailed)
}

/// A dequeued message whose delivery has not finished. If the session is
/// cancelled before [`InFlight::settle`], the operator is told the message
/// may not have gone in. It is not put back: the injection may still land.
struct InFlight<'a> {
    channel: &'a dyn OperatorChannel,
    payload: Option<&'a str>,
}

impl<'a> InFlight<'a> {
    fn new(channel: &'a dyn OperatorChannel, payload: &'a str) -> Self {
        Self {
            channel,
            payload: Some(payload),
        }
    }

    fn settle(mut self) {
        self.payload = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            tracing::warn!("session cancelled while delivering a queued message");
            notify(
                self.channel,
                &format!(
                    "⚠️ monitor stopped before the queued message was confirmed: {}",
                    truncate_chars(payload, QUEUED_PREVIEW_CHARS)
                ),
            );
        }
    }
}

/// Inject into the session's target, re-checking it once before a retry
async fn deliver_queued(ctx: &SessionContext, payload: &str) -> bool {
    let driver = ctx.targets.driver();
    if driver.inject(&ctx.handle, payload).await {
        return true;
    }
    if driver.read_title(&ctx.handle).await.is_empty() {
        return false;
    }
    tracing::warn!(handle = %ctx.handle, "retrying queued message");
    driver.inject(&ctx.handle, payload).await
}

/// The newest transcript answer, else whatever text the window shows
async fn fetch_response(ctx: &SessionContext) -> String {
    if let Some(root) = ctx.transcripts.clone() {
        let logged = tokio::task::spawn_blocking(move || transcript::latest_response(&root))
            .await
            .ok()
            .flatten();
        if let Some(text) = logged.filter(|t| meaningful(t)) {
            return text;
        }
    }
    ctx.targets.driver().read_text(&ctx.handle).await
}

fn meaningful(text: &str) -> bool {
    text.trim().chars().count() > MIN_RESPONSE_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::QuickReply;
    use crate::driver::{DriverTiming, InputDriver};
    use crate::testing::{FakeSurface, Outbound, RecordingChannel, BUSY, IDLE, SHELL};
    use std::collections::HashMap;

    const ANSWER: &str = "All tests pass and the build is green.";

    struct Rig {
        surface: Arc<FakeSurface>,
        channel: Arc<RecordingChannel>,
        ctx: SessionContext,
    }

    fn rig(titles: &[&str]) -> Rig {
        rig_with_timing(
            titles,
            DriverTiming {
                settle: Duration::ZERO,
                key_pause: Duration::ZERO,
            },
        )
    }

    fn rig_with_timing(titles: &[&str], timing: DriverTiming) -> Rig {
        let surface = Arc::new(FakeSurface::new(titles));
        surface.set_text(ANSWER);
        let channel = Arc::new(RecordingChannel::default());
        let driver = InputDriver::new(surface.clone(), timing);
        let ctx = SessionContext {
            handle: surface.handle(),
            label: "main".to_string(),
            channel: channel.clone(),
            queue: Arc::new(DeliveryQueue::new()),
            targets: Arc::new(TargetRegistry::new(driver, HashMap::new())),
            transcripts: None,
            config: SessionConfig {
                poll_interval: Duration::from_millis(2),
                screenshot_interval: Duration::from_secs(60),
                max_duration: Duration::from_secs(30),
                thresholds: Thresholds::default(),
            },
        };
        Rig {
            surface,
            channel,
            ctx,
        }
    }

    #[tokio::test]
    async fn test_completion_reports_once() {
        let rig = rig(&[SHELL, BUSY, BUSY, IDLE, IDLE]);

        assert_eq!(run(&rig.ctx).await, Outcome::Completed);
        assert_eq!(rig.channel.follow_ups(), 1);
        assert_eq!(rig.channel.photos(), 1);
        assert_eq!(
            rig.channel.texts().iter().filter(|t| *t == ANSWER).count(),
            1
        );
        // the busy line was sent once, edited, then removed
        assert_eq!(rig.channel.deletes(), 1);
    }

    #[tokio::test]
    async fn test_idle_flicker_does_not_complete() {
        let mut rig = rig(&[BUSY, IDLE, IDLE, BUSY]);
        rig.ctx.config.max_duration = Duration::from_millis(150);

        assert_eq!(run(&rig.ctx).await, Outcome::TimedOut);
        assert_eq!(rig.channel.follow_ups(), 0);
        assert!(rig.channel.events().iter().any(|e| matches!(
            e,
            Outbound::Edit { text, .. } if text.contains("continuing...")
        )));
        assert!(rig.channel.texts().iter().any(|t| t.starts_with("⏰ main")));
    }

    #[tokio::test]
    async fn test_completion_drains_only_front_of_queue() {
        let rig = rig(&[BUSY, IDLE, IDLE]);
        for msg in ["one", "two", "three"] {
            rig.ctx.queue.enqueue(msg.to_string()).unwrap();
        }

        // the drained message never starts work, so grace runs out
        assert_eq!(run(&rig.ctx).await, Outcome::NeverStarted);
        assert_eq!(rig.surface.submitted(), vec!["one"]);
        assert_eq!(rig.ctx.queue.snapshot(), vec!["two", "three"]);
        assert_eq!(rig.channel.follow_ups(), 0);
        assert_eq!(
            rig.ctx.targets.last_payload(&rig.ctx.handle).as_deref(),
            Some("one")
        );
    }

    #[tokio::test]
    async fn test_prompt_short_circuits() {
        let rig = rig(&[BUSY]);
        rig.surface
            .set_text("Edit src/main.rs?\nDo you want to make this edit?\n(y/n)");

        assert_eq!(run(&rig.ctx).await, Outcome::PromptShown);
        let prompts = rig.channel.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1, vec![QuickReply::Confirm, QuickReply::Decline]);
        assert_eq!(rig.channel.photos(), 1);
        assert_eq!(rig.channel.deletes(), 1);
    }

    #[tokio::test]
    async fn test_target_gone_invalidates_handle() {
        let rig = rig(&[BUSY]);
        rig.ctx.targets.select(rig.surface.handle());
        rig.surface.close();

        assert_eq!(run(&rig.ctx).await, Outcome::TargetGone);
        assert_eq!(rig.ctx.targets.selected(), None);
        assert!(rig.channel.texts()[0].contains("is gone"));
        assert_eq!(rig.channel.photos(), 0);
    }

    #[tokio::test]
    async fn test_never_started_sends_final_shot() {
        let rig = rig(&[IDLE]);

        assert_eq!(run(&rig.ctx).await, Outcome::NeverStarted);
        assert_eq!(rig.channel.photos(), 1);
        assert_eq!(rig.channel.follow_ups(), 0);
    }

    #[tokio::test]
    async fn test_short_response_is_not_delivered() {
        let rig = rig(&[BUSY, IDLE, IDLE]);
        rig.surface.set_text(">");

        assert_eq!(run(&rig.ctx).await, Outcome::Completed);
        assert!(rig.channel.texts().iter().all(|t| t != ">"));
    }

    #[tokio::test]
    async fn test_ambient_feed_dedups_unchanged_screen() {
        let mut rig = rig(&[BUSY]);
        rig.ctx.config.screenshot_interval = Duration::from_millis(5);
        rig.ctx.config.max_duration = Duration::from_millis(100);

        assert_eq!(run(&rig.ctx).await, Outcome::TimedOut);
        // the fake always captures the same frame
        assert_eq!(rig.channel.photos(), 1);
    }

    #[tokio::test]
    async fn test_failed_queued_delivery_is_reported() {
        let rig = rig(&[BUSY, IDLE, IDLE]);
        rig.ctx.queue.enqueue("next".to_string()).unwrap();
        rig.ctx.targets.select(rig.surface.handle());
        rig.surface.fail_typing(true);
        rig.surface.fail_paste(true);

        assert_eq!(run(&rig.ctx).await, Outcome::InjectionFailed);
        assert!(rig.ctx.queue.is_empty());
        assert_eq!(rig.ctx.targets.selected(), None);
        assert!(rig
            .channel
            .texts()
            .iter()
            .any(|t| t.contains("queued message dropped: next")));
    }

    #[tokio::test]
    async fn test_cancel_during_queued_delivery_is_reported() {
        // activation settles slowly, so the session is still injecting when dropped
        let rig = rig_with_timing(
            &[BUSY, IDLE, IDLE],
            DriverTiming {
                settle: Duration::from_millis(300),
                key_pause: Duration::ZERO,
            },
        );
        rig.ctx.queue.enqueue("next".to_string()).unwrap();

        let cut_short = tokio::time::timeout(Duration::from_millis(100), run(&rig.ctx)).await;
        assert!(cut_short.is_err());

        assert!(rig.ctx.queue.is_empty());
        assert!(rig.channel.texts().iter().any(|t| {
            t == "⚠️ monitor stopped before the queued message was confirmed: next"
        }));
        // the status line went with the session
        assert_eq!(rig.channel.deletes(), 2);
    }

    #[test]
    fn test_settled_delivery_says_nothing() {
        let channel = RecordingChannel::default();
        InFlight::new(&channel, "next").settle();
        assert!(channel.events().is_empty());
    }
}
