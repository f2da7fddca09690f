//! Background completion notices for every target, while no operator session
//! is watching.

use chrono::{Local, Timelike};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::PassiveSettings;
use crate::detect::classify;
use crate::driver::Handle;
use crate::monitor::{ActiveMonitor, Machine, Step, Thresholds};
use crate::operator::{notify, OperatorChannel, Presence};
use crate::targets::TargetRegistry;

/// Hours during which notices are held back. `start > end` wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl QuietHours {
    /// Both ends must be valid hours and differ, otherwise there is no window
    pub fn new(start: Option<u32>, end: Option<u32>) -> Option<Self> {
        let (Some(start), Some(end)) = (start, end) else {
            return None;
        };
        if start > 23 || end > 23 || start == end {
            tracing::warn!(start, end, "ignoring invalid quiet hours");
            return None;
        }
        Some(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start < self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

pub struct PassiveMonitor {
    targets: Arc<TargetRegistry>,
    channel: Arc<dyn OperatorChannel>,
    active: Arc<ActiveMonitor>,
    presence: Arc<Presence>,
    quiet: Option<QuietHours>,
    presence_window: Duration,
    interval: Duration,
    thresholds: Thresholds,
    records: HashMap<Handle, Machine>,
}

impl PassiveMonitor {
    pub fn new(
        settings: &PassiveSettings,
        thresholds: Thresholds,
        targets: Arc<TargetRegistry>,
        channel: Arc<dyn OperatorChannel>,
        active: Arc<ActiveMonitor>,
        presence: Arc<Presence>,
    ) -> Self {
        Self {
            targets,
            channel,
            active,
            presence,
            quiet: QuietHours::new(settings.quiet_start, settings.quiet_end),
            presence_window: settings.presence_window(),
            interval: settings.interval(),
            thresholds,
            records: HashMap::new(),
        }
    }

    /// Number of targets currently tracked
    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(interval = ?self.interval, "passive monitor started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("passive monitor stopped");
    }

    pub async fn tick(&mut self) -> Vec<Handle> {
        self.tick_at(Local::now().hour()).await
    }

    /// One pass over all targets. Returns the targets a notice was sent for.
    pub async fn tick_at(&mut self, hour: u32) -> Vec<Handle> {
        if self.active.is_running().await {
            if !self.records.is_empty() {
                tracing::debug!("operator session running, dropping passive records");
                self.records.clear();
            }
            return Vec::new();
        }

        let targets = self.targets.scan().await;
        let seen: HashSet<&Handle> = targets.iter().map(|t| &t.handle).collect();
        self.records.retain(|h, _| seen.contains(h));

        let allowed = self.allowed(hour);
        let driver = self.targets.driver();
        let mut notified = Vec::new();

        for target in &targets {
            let machine = self
                .records
                .entry(target.handle.clone())
                .or_insert_with(|| Machine::passive(self.thresholds));

            if machine.observe(target.status) != Step::Verify {
                continue;
            }

            let title = driver.read_title(&target.handle).await;
            if title.is_empty() {
                self.records.remove(&target.handle);
                continue;
            }
            if machine.verify(classify(&title)) != Step::Completed {
                continue;
            }

            tracing::info!(
                handle = %target.handle,
                notify = allowed,
                "target finished in background"
            );
            if allowed {
                notify(
                    self.channel.as_ref(),
                    &format!("✅ {} finished", target.display_name()),
                );
                notified.push(target.handle.clone());
            }
        }

        tracing::debug!(tracked = self.tracked(), notified = notified.len(), "passive pass done");
        notified
    }

    /// Quiet hours hold notices back, and so does an operator who has not
    /// used the channel lately.
    fn allowed(&self, hour: u32) -> bool {
        if self.quiet.is_some_and(|q| q.contains(hour)) {
            return false;
        }
        self.presence.seen_within(self.presence_window)
    }
}
