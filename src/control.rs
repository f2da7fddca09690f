//! Operator commands and their execution against the core.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::detect::{classify, QuickReply, Status};
use crate::driver::Handle;
use crate::error::RelayError;
use crate::keys::{format_tokens, parse_tokens, KeyToken};
use crate::monitor::{ActiveMonitor, SessionConfig, SessionContext};
use crate::operator::{
    deliver_text, format_elapsed, notify, send_photo, truncate_chars, FollowUp, OperatorChannel,
    Presence,
};
use crate::payload::PayloadStore;
use crate::queue::DeliveryQueue;
use crate::targets::{Target, TargetRegistry};

const ALTERNATE_PROMPT: &str =
    "That approach did not work. Please step back and try a different approach.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Free text for the target
    Send(String),
    Keys(Vec<KeyToken>),
    Reply(QuickReply),
    FollowUp(FollowUp),
    Watch,
    Stop,
    /// Ambient screenshot interval in seconds, 0 turns it off
    Delay(u64),
    ToggleAuto,
    ShowQueue,
    ClearQueue,
    /// 1-based position, as shown by the last `ShowQueue`
    RemoveQueued(usize),
    Shot,
    Grab,
    Select(Handle),
    Scan,
    /// Snapshot of the relay's own state
    Status,
}

impl Command {
    /// Parse one input line. Lines starting with `/` are commands.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let cmd = match name {
            "keys" | "k" => {
                if arg.is_empty() {
                    bail!("usage: /keys <tokens>, e.g. /keys down enter");
                }
                Command::Keys(parse_tokens(arg))
            }
            "watch" => Command::Watch,
            "stop" => Command::Stop,
            "delay" => Command::Delay(arg.parse().context("usage: /delay <seconds>")?),
            "auto" => Command::ToggleAuto,
            "queue" | "q" => Command::ShowQueue,
            "clear" => Command::ClearQueue,
            "rm" => Command::RemoveQueued(
                arg.parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .context("usage: /rm <n>")?,
            ),
            "shot" => Command::Shot,
            "grab" => Command::Grab,
            "scan" => Command::Scan,
            "status" => Command::Status,
            "retry" => Command::FollowUp(FollowUp::Retry),
            other => bail!("unknown command /{}", other),
        };
        Ok(cmd)
    }
}

pub fn status_badge(status: Status) -> &'static str {
    match status {
        Status::Thinking => "⏳",
        Status::Idle => "🟢",
        Status::Unknown => "❔",
    }
}

/// Executes operator commands. Every outcome, good or bad, is reported on the
/// operator channel.
pub struct Controller {
    targets: Arc<TargetRegistry>,
    queue: Arc<DeliveryQueue>,
    channel: Arc<dyn OperatorChannel>,
    active: Arc<ActiveMonitor>,
    presence: Arc<Presence>,
    payloads: PayloadStore,
    transcripts: Option<PathBuf>,
    session: Mutex<SessionConfig>,
    auto_monitor: AtomicBool,
    /// Queue contents as last shown to the operator
    shown_queue: Mutex<Vec<String>>,
    started: Instant,
}

impl Controller {
    pub fn new(
        config: &Config,
        targets: Arc<TargetRegistry>,
        queue: Arc<DeliveryQueue>,
        channel: Arc<dyn OperatorChannel>,
        active: Arc<ActiveMonitor>,
        presence: Arc<Presence>,
        transcripts: Option<PathBuf>,
    ) -> Self {
        let session = SessionConfig {
            poll_interval: config.monitor.poll_interval(),
            screenshot_interval: config.monitor.screenshot_interval(),
            max_duration: config.monitor.max_session(),
            thresholds: config.monitor.thresholds(),
        };
        Self {
            targets,
            queue,
            channel,
            active,
            presence,
            payloads: PayloadStore::new(config.payload_dir(), config.payload.max_inline_chars),
            transcripts,
            session: Mutex::new(session),
            auto_monitor: AtomicBool::new(config.monitor.auto_monitor),
            shown_queue: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    pub fn auto_monitor(&self) -> bool {
        self.auto_monitor.load(Ordering::SeqCst)
    }

    pub async fn execute(&self, cmd: Command) {
        self.presence.touch();
        tracing::debug!(?cmd, "operator command");

        let result = match cmd {
            Command::Send(text) => self.send(&text).await,
            Command::Keys(tokens) => self.keys(tokens).await,
            Command::Reply(reply) => self.keys(reply.keys()).await,
            Command::FollowUp(action) => self.follow_up(action).await,
            Command::Watch => self.watch().await,
            Command::Stop => {
                let stopped = self.active.stop().await;
                self.say(if stopped {
                    "⏹ monitor stopped"
                } else {
                    "no monitor running"
                });
                Ok(())
            }
            Command::Delay(secs) => {
                self.lock_session().screenshot_interval = Duration::from_secs(secs);
                if secs == 0 {
                    self.say("📷 periodic screenshots off");
                } else {
                    self.say(&format!("📷 screenshot every {}s while busy", secs));
                }
                Ok(())
            }
            Command::ToggleAuto => {
                let on = !self.auto_monitor.fetch_xor(true, Ordering::SeqCst);
                self.say(if on {
                    "auto-monitor on"
                } else {
                    "auto-monitor off"
                });
                Ok(())
            }
            Command::ShowQueue => {
                self.show_queue();
                Ok(())
            }
            Command::ClearQueue => {
                let n = self.queue.clear();
                self.say(&format!("🗑 cleared {} queued message(s)", n));
                Ok(())
            }
            Command::RemoveQueued(n) => self.remove_queued(n),
            Command::Shot => self.shot().await,
            Command::Grab => self.grab().await,
            Command::Select(handle) => {
                let name = self.targets.display_name(&handle);
                self.targets.select(handle);
                self.say(&format!("🎯 talking to {}", name));
                Ok(())
            }
            Command::Scan => {
                let targets = self.targets.scan().await;
                self.say(&describe_targets(&targets));
                Ok(())
            }
            Command::Status => {
                let report = self.status_report().await;
                self.say(&report);
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "command failed");
            self.say(&format!("❌ {:#}", e));
        }
    }

    fn say(&self, text: &str) {
        notify(self.channel.as_ref(), text);
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, SessionConfig> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn target(&self) -> Result<Handle, RelayError> {
        self.targets.resolve().await.ok_or(RelayError::NoTarget)
    }

    async fn send(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let handle = self.target().await?;
        let payload = self.payloads.materialize(text)?;
        self.deliver(handle, payload).await
    }

    /// Queue behind a busy target, otherwise inject now
    async fn deliver(&self, handle: Handle, payload: String) -> Result<()> {
        let title = self.targets.driver().read_title(&handle).await;
        if classify(&title) == Status::Thinking {
            let position = self.queue.enqueue(payload)?;
            let mut text = format!("📥 target busy, queued as #{}", position);
            if let Some(preview) = self.queue.preview() {
                text.push('\n');
                text.push_str(&preview);
            }
            self.say(&text);
            if !self.active.is_running().await {
                self.start_monitor(handle).await;
            }
            return Ok(());
        }

        let handle = self
            .targets
            .inject_with_retry(&handle, &payload)
            .await
            .map_err(|e| anyhow::anyhow!("{}; /scan to rediscover targets", e))?;
        self.say(&format!(
            "✉️ sent to {}: {}",
            self.targets.display_name(&handle),
            truncate_chars(&payload, 60)
        ));
        if self.auto_monitor() {
            self.start_monitor(handle).await;
        }
        Ok(())
    }

    async fn keys(&self, tokens: Vec<KeyToken>) -> Result<()> {
        let handle = self.target().await?;
        let shown = format_tokens(&tokens);
        if !self.targets.driver().inject_raw_keys(&handle, tokens).await {
            self.targets.invalidate(&handle);
            return Err(RelayError::InjectionFailure(handle).into());
        }
        self.say(&format!("⌨️ {}", shown));
        if self.auto_monitor() {
            self.start_monitor(handle).await;
        }
        Ok(())
    }

    async fn follow_up(&self, action: FollowUp) -> Result<()> {
        match action {
            FollowUp::Retry => {
                let handle = self.target().await?;
                let Some(last) = self.targets.last_payload(&handle) else {
                    bail!("nothing to retry on {}", self.targets.display_name(&handle));
                };
                self.deliver(handle, last).await
            }
            FollowUp::Alternate => self.send(ALTERNATE_PROMPT).await,
            FollowUp::Done => {
                self.say("👍");
                Ok(())
            }
            FollowUp::NeedsSelection => {
                self.shot().await?;
                self.say("answer with /keys, e.g. /keys down enter");
                Ok(())
            }
        }
    }

    async fn watch(&self) -> Result<()> {
        let handle = self.target().await?;
        self.say(&format!("👀 watching {}", self.targets.display_name(&handle)));
        self.start_monitor(handle).await;
        Ok(())
    }

    async fn start_monitor(&self, handle: Handle) {
        let config = *self.lock_session();
        let ctx = SessionContext {
            label: self.targets.display_name(&handle),
            handle,
            channel: self.channel.clone(),
            queue: self.queue.clone(),
            targets: self.targets.clone(),
            transcripts: self.transcripts.clone(),
            config,
        };
        self.active.start(ctx).await;
    }

    fn show_queue(&self) {
        let guard = self.queue.lock();
        let items: Vec<String> = guard.items().cloned().collect();
        drop(guard);

        if items.is_empty() {
            self.say("📋 queue is empty");
        } else {
            let lines: Vec<String> = items
                .iter()
                .enumerate()
                .map(|(i, m)| format!("[{}] {}", i + 1, truncate_chars(m, 80)))
                .collect();
            self.say(&format!(
                "📋 {}/{} queued (/rm N to remove)\n{}",
                items.len(),
                self.queue.capacity(),
                lines.join("\n")
            ));
        }
        *self.shown_queue.lock().unwrap_or_else(PoisonError::into_inner) = items;
    }

    fn remove_queued(&self, position: usize) -> Result<()> {
        let index = position.saturating_sub(1);
        let shown = self
            .shown_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned();
        let (Some(expected), true) = (shown, position > 0) else {
            bail!("no item #{}; /queue to list", position);
        };
        match self.queue.remove_expected(index, &expected) {
            Some(removed) => {
                self.say(&format!("🗑 removed: {}", truncate_chars(&removed, 60)));
                self.show_queue();
                Ok(())
            }
            None => bail!("queue changed since it was shown; /queue to list again"),
        }
    }

    async fn status_report(&self) -> String {
        let target = self
            .targets
            .selected()
            .map(|h| self.targets.display_name(&h))
            .unwrap_or_else(|| "none".to_string());
        let monitor = if self.active.is_running().await {
            "running"
        } else {
            "idle"
        };
        format!(
            "📊 target: {}\nauto-monitor: {}\nmonitor: {}\nqueue: {}/{}\nuptime: {}",
            target,
            if self.auto_monitor() { "on" } else { "off" },
            monitor,
            self.queue.len(),
            self.queue.capacity(),
            format_elapsed(self.started.elapsed())
        )
    }

    async fn shot(&self) -> Result<()> {
        let handle = self.target().await?;
        let Some(shot) = self.targets.driver().capture_screenshot(&handle).await else {
            bail!("screenshot failed, try again");
        };
        let caption = self.targets.display_name(&handle);
        send_photo(self.channel.as_ref(), &shot, Some(&caption));
        self.targets.set_last_hash(&handle, shot.hash);
        Ok(())
    }

    async fn grab(&self) -> Result<()> {
        let handle = self.target().await?;
        let text = self.targets.driver().read_text(&handle).await;
        deliver_text(self.channel.as_ref(), &text);
        Ok(())
    }
}

fn describe_targets(targets: &[Target]) -> String {
    if targets.is_empty() {
        return RelayError::NoTarget.to_string();
    }
    let lines: Vec<String> = targets
        .iter()
        .map(|t| format!("{} {}  {}", status_badge(t.status), t.display_name(), t.title))
        .collect();
    format!("🔎 {} target(s)\n{}", targets.len(), lines.join("\n"))
}
