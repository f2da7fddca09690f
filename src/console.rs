//! Local terminal stand-in for the remote messaging transport.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;

use crate::actions::{Action, Button, Outbound};
use crate::detect::QuickReply;
use crate::driver::Screenshot;
use crate::operator::{FollowUp, MessageId, OperatorChannel};

/// CSI / OSC escape sequences in a captured pane
static RE_ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(\x07|\x1b\\)|[@-Z\\-_])").unwrap()
});

pub fn strip_ansi(raw: &str) -> String {
    RE_ANSI.replace_all(raw, "").into_owned()
}

/// Operator channel that feeds the console's event loop
pub struct ConsoleChannel {
    tx: UnboundedSender<Action>,
    next_id: AtomicU64,
}

impl ConsoleChannel {
    pub fn new(tx: UnboundedSender<Action>) -> Self {
        Self {
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    fn push(&self, msg: Outbound) -> Result<()> {
        self.tx
            .send(Action::Outbound(msg))
            .ok()
            .context("console is gone")
    }
}

impl OperatorChannel for ConsoleChannel {
    fn send_text(&self, text: &str) -> Result<MessageId> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.push(Outbound::Text {
            id,
            text: text.to_string(),
        })?;
        Ok(id)
    }

    fn edit_text(&self, id: MessageId, text: &str) -> Result<()> {
        self.push(Outbound::Edit {
            id,
            text: text.to_string(),
        })
    }

    fn delete(&self, id: MessageId) -> Result<()> {
        self.push(Outbound::Delete(id))
    }

    fn send_photo(&self, shot: &Screenshot, caption: Option<&str>) -> Result<()> {
        self.push(Outbound::Screen {
            frame: strip_ansi(&String::from_utf8_lossy(&shot.bytes)),
            caption: caption.map(str::to_string),
        })
    }

    fn send_prompt(&self, text: &str, replies: &[QuickReply]) -> Result<()> {
        self.push(Outbound::Buttons {
            text: text.to_string(),
            buttons: replies.iter().copied().map(Button::Reply).collect(),
        })
    }

    fn send_follow_ups(&self, text: &str, actions: &[FollowUp]) -> Result<()> {
        self.push(Outbound::Buttons {
            text: text.to_string(),
            buttons: actions.iter().copied().map(Button::FollowUp).collect(),
        })
    }
}
