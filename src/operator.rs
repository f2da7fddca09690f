//! The operator side: what the core can say back to the human.
//!
//! Transport is someone else's problem. An [`OperatorChannel`] hands each
//! message to its transport without waiting on the network, which is what
//! lets the status line clean itself up from `Drop`.

use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::detect::QuickReply;
use crate::driver::Screenshot;

/// Longest chunk sent in one message
pub const MAX_CHUNK_CHARS: usize = 3500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

/// Actions offered once a target finished and nothing is queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Re-send the last payload
    Retry,
    /// Ask for a different approach
    Alternate,
    Done,
    /// The target is waiting on a choice the detector missed
    NeedsSelection,
}

impl FollowUp {
    pub const ALL: [FollowUp; 4] = [
        FollowUp::Retry,
        FollowUp::Alternate,
        FollowUp::Done,
        FollowUp::NeedsSelection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FollowUp::Retry => "🔁 Retry",
            FollowUp::Alternate => "🔀 Alternate",
            FollowUp::Done => "✅ Done",
            FollowUp::NeedsSelection => "🔘 Needs selection",
        }
    }
}

pub trait OperatorChannel: Send + Sync {
    fn send_text(&self, text: &str) -> Result<MessageId>;
    fn edit_text(&self, id: MessageId, text: &str) -> Result<()>;
    fn delete(&self, id: MessageId) -> Result<()>;
    fn send_photo(&self, shot: &Screenshot, caption: Option<&str>) -> Result<()>;
    fn send_prompt(&self, text: &str, replies: &[QuickReply]) -> Result<()>;
    fn send_follow_ups(&self, text: &str, actions: &[FollowUp]) -> Result<()>;
}

/// Send a notice, logging instead of failing
pub fn notify(channel: &dyn OperatorChannel, text: &str) {
    if let Err(e) = channel.send_text(text) {
        tracing::warn!(error = %e, "operator notice not delivered");
    }
}

pub fn send_photo(channel: &dyn OperatorChannel, shot: &Screenshot, caption: Option<&str>) {
    if let Err(e) = channel.send_photo(shot, caption) {
        tracing::warn!(error = %e, "screenshot not delivered");
    }
}

/// The one live status message of a session, edited in place.
/// Dropping it deletes the message.
pub struct StatusLine {
    channel: Arc<dyn OperatorChannel>,
    current: Option<MessageId>,
}

impl StatusLine {
    pub fn new(channel: Arc<dyn OperatorChannel>) -> Self {
        Self {
            channel,
            current: None,
        }
    }

    pub fn upsert(&mut self, text: &str) {
        if let Some(id) = self.current {
            match self.channel.edit_text(id, text) {
                Ok(()) => return,
                Err(e) => tracing::debug!(error = %e, "status edit failed, sending fresh"),
            }
        }
        match self.channel.send_text(text) {
            Ok(id) => self.current = Some(id),
            Err(e) => {
                self.current = None;
                tracing::warn!(error = %e, "status message not delivered");
            }
        }
    }

    pub fn clear(&mut self) {
        if let Some(id) = self.current.take() {
            if let Err(e) = self.channel.delete(id) {
                tracing::debug!(error = %e, "status delete failed");
            }
        }
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        self.clear();
    }
}

/// When the operator last sent anything through the channel
#[derive(Debug, Default)]
pub struct Presence {
    last_seen: Mutex<Option<Instant>>,
}

impl Presence {
    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn seen_within(&self, window: Duration) -> bool {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|t| t.elapsed() <= window)
    }
}

/// First `max` characters of `s`
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `42s` or `3m 7s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Split text into chunks of at most `max` characters, preferring to break
/// at a newline
pub fn split_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max {
        let window = truncate_chars(rest, max);
        let cut = match window.rfind('\n') {
            Some(idx) if idx > 0 => idx,
            _ => window.len(),
        };
        chunks.push(rest[..cut].to_string());
        // drop only the newline the cut landed on
        let tail = &rest[cut..];
        rest = tail.strip_prefix('\n').unwrap_or(tail);
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Deliver a long text as numbered parts
pub fn deliver_text(channel: &dyn OperatorChannel, text: &str) {
    let text = if text.trim().is_empty() {
        "(empty output)"
    } else {
        text
    };

    let chunks = split_text(text, MAX_CHUNK_CHARS);
    let total = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        let body = if total > 1 {
            format!("[{}/{}]\n{}", i + 1, total, chunk)
        } else {
            chunk.clone()
        };
        notify(channel, &body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Outbound, RecordingChannel};

    #[test]
    fn test_split_prefers_newlines() {
        let text = format!("{}\n{}", "a".repeat(6), "b".repeat(6));
        assert_eq!(split_text(&text, 10), vec!["aaaaaa", "bbbbbb"]);
    }

    #[test]
    fn test_split_keeps_blank_lines_at_boundary() {
        assert_eq!(split_text("aaaa\n\nbbbb", 5), vec!["aaaa", "\nbbbb"]);
    }

    #[test]
    fn test_split_hard_cuts_long_lines() {
        let chunks = split_text(&"x".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "xxxxx");
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let chunks = split_text(&"思".repeat(12), 10);
        assert_eq!(chunks, vec!["思".repeat(10), "思".repeat(2)]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(split_text("hi", 10), vec!["hi"]);
        assert_eq!(split_text("", 10), vec![""]);
    }

    #[test]
    fn test_deliver_adds_ordinals_for_multipart() {
        let channel = RecordingChannel::default();
        let text = format!("{}\n{}", "a".repeat(MAX_CHUNK_CHARS), "tail");
        deliver_text(&channel, &text);

        let texts = channel.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("[1/2]\n"));
        assert_eq!(texts[1], "[2/2]\ntail");
    }

    #[test]
    fn test_deliver_empty() {
        let channel = RecordingChannel::default();
        deliver_text(&channel, "  \n");
        assert_eq!(channel.texts(), vec!["(empty output)"]);
    }

    #[test]
    fn test_status_line_edits_then_deletes_on_drop() {
        let channel = Arc::new(RecordingChannel::default());
        {
            let mut status = StatusLine::new(channel.clone());
            status.upsert("one");
            status.upsert("two");
        }
        let events = channel.events();
        assert!(matches!(events[0], Outbound::Text { ref text, .. } if text == "one"));
        assert!(matches!(events[1], Outbound::Edit { ref text, .. } if text == "two"));
        assert!(matches!(events[2], Outbound::Delete(_)));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_elapsed_format() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(187)), "3m 7s");
    }

    #[test]
    fn test_presence_window() {
        let presence = Presence::default();
        assert!(!presence.seen_within(Duration::from_secs(60)));
        presence.touch();
        assert!(presence.seen_within(Duration::from_secs(60)));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
