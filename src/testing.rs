//! Scripted surface and recording channel for driving the monitors in tests.

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::detect::QuickReply;
use crate::driver::{Handle, Screenshot, Surface, WindowInfo};
use crate::keys::Key;
use crate::operator::{FollowUp, MessageId, OperatorChannel};

pub const BUSY: &str = "⠋ Claude Code";
pub const IDLE: &str = "✳ Claude Code";
pub const SHELL: &str = "bash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Typed {
    Text(String),
    Pasted(String),
    Key(Key),
    Char(char),
}

/// One target whose title follows a script. The last scripted title repeats.
pub struct FakeSurface {
    handle: Handle,
    titles: Mutex<VecDeque<String>>,
    text: Mutex<String>,
    typed: Mutex<Vec<Typed>>,
    clipboard: Mutex<String>,
    activations: AtomicUsize,
    foreground: AtomicBool,
    fail_typing: AtomicBool,
    fail_paste: AtomicBool,
    gone: AtomicBool,
}

impl FakeSurface {
    pub fn new(titles: &[&str]) -> Self {
        Self {
            handle: Handle::new("%1"),
            titles: Mutex::new(titles.iter().map(|t| t.to_string()).collect()),
            text: Mutex::new(String::new()),
            typed: Mutex::new(Vec::new()),
            clipboard: Mutex::new(String::new()),
            activations: AtomicUsize::new(0),
            foreground: AtomicBool::new(true),
            fail_typing: AtomicBool::new(false),
            fail_paste: AtomicBool::new(false),
            gone: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }

    pub fn set_foreground(&self, on: bool) {
        self.foreground.store(on, Ordering::SeqCst);
    }

    pub fn fail_typing(&self, on: bool) {
        self.fail_typing.store(on, Ordering::SeqCst);
    }

    pub fn fail_paste(&self, on: bool) {
        self.fail_paste.store(on, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }

    pub fn typed(&self) -> Vec<Typed> {
        self.typed.lock().unwrap().clone()
    }

    /// Payloads submitted through either channel
    pub fn submitted(&self) -> Vec<String> {
        self.typed()
            .into_iter()
            .filter_map(|t| match t {
                Typed::Text(s) | Typed::Pasted(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    fn next_title(&self) -> String {
        let mut titles = self.titles.lock().unwrap();
        if titles.len() > 1 {
            titles.pop_front().unwrap_or_default()
        } else {
            titles.front().cloned().unwrap_or_default()
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.gone.load(Ordering::SeqCst) {
            bail!("window {} closed", self.handle);
        }
        Ok(())
    }
}

impl Surface for FakeSurface {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        if self.gone.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![WindowInfo {
            handle: self.handle.clone(),
            title: self.next_title(),
        }])
    }

    fn window_title(&self, _handle: &Handle) -> Result<String> {
        self.check_alive()?;
        Ok(self.next_title())
    }

    fn window_text(&self, _handle: &Handle) -> Result<String> {
        self.check_alive()?;
        Ok(self.text.lock().unwrap().clone())
    }

    fn capture(&self, _handle: &Handle) -> Result<Vec<u8>> {
        self.check_alive()?;
        Ok(b"frame".to_vec())
    }

    fn activate(&self, _handle: &Handle) -> Result<()> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        self.check_alive()
    }

    fn is_foreground(&self, _handle: &Handle) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    fn type_text(&self, _handle: &Handle, text: &str) -> Result<()> {
        self.check_alive()?;
        if self.fail_typing.load(Ordering::SeqCst) {
            bail!("typing channel unavailable");
        }
        self.typed.lock().unwrap().push(Typed::Text(text.to_string()));
        Ok(())
    }

    fn set_clipboard(&self, text: &str) -> Result<()> {
        *self.clipboard.lock().unwrap() = text.to_string();
        Ok(())
    }

    fn paste(&self, _handle: &Handle) -> Result<()> {
        self.check_alive()?;
        if self.fail_paste.load(Ordering::SeqCst) {
            bail!("paste unavailable");
        }
        let text = self.clipboard.lock().unwrap().clone();
        self.typed.lock().unwrap().push(Typed::Pasted(text));
        Ok(())
    }

    fn send_key(&self, _handle: &Handle, key: Key) -> Result<()> {
        self.check_alive()?;
        self.typed.lock().unwrap().push(Typed::Key(key));
        Ok(())
    }

    fn send_char(&self, _handle: &Handle, ch: char) -> Result<()> {
        self.check_alive()?;
        self.typed.lock().unwrap().push(Typed::Char(ch));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text { id: MessageId, text: String },
    Edit { id: MessageId, text: String },
    Delete(MessageId),
    Photo { hash: String, caption: Option<String> },
    Prompt { text: String, replies: Vec<QuickReply> },
    FollowUps { text: String, actions: Vec<FollowUp> },
}

/// Operator channel that remembers everything it was asked to send
#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<Outbound>>,
    next_id: AtomicU64,
}

impl RecordingChannel {
    pub fn events(&self) -> Vec<Outbound> {
        self.events.lock().unwrap().clone()
    }

    /// Plain messages (not status edits)
    pub fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Outbound::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn photos(&self) -> usize {
        self.count(|e| matches!(e, Outbound::Photo { .. }))
    }

    pub fn prompts(&self) -> Vec<(String, Vec<QuickReply>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Outbound::Prompt { text, replies } => Some((text, replies)),
                _ => None,
            })
            .collect()
    }

    pub fn follow_ups(&self) -> usize {
        self.count(|e| matches!(e, Outbound::FollowUps { .. }))
    }

    pub fn deletes(&self) -> usize {
        self.count(|e| matches!(e, Outbound::Delete(_)))
    }

    fn count(&self, pred: impl Fn(&Outbound) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Outbound) {
        self.events.lock().unwrap().push(event);
    }
}

impl OperatorChannel for RecordingChannel {
    fn send_text(&self, text: &str) -> Result<MessageId> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.push(Outbound::Text {
            id,
            text: text.to_string(),
        });
        Ok(id)
    }

    fn edit_text(&self, id: MessageId, text: &str) -> Result<()> {
        self.push(Outbound::Edit {
            id,
            text: text.to_string(),
        });
        Ok(())
    }

    fn delete(&self, id: MessageId) -> Result<()> {
        self.push(Outbound::Delete(id));
        Ok(())
    }

    fn send_photo(&self, shot: &Screenshot, caption: Option<&str>) -> Result<()> {
        self.push(Outbound::Photo {
            hash: shot.hash.clone(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    fn send_prompt(&self, text: &str, replies: &[QuickReply]) -> Result<()> {
        self.push(Outbound::Prompt {
            text: text.to_string(),
            replies: replies.to_vec(),
        });
        Ok(())
    }

    fn send_follow_ups(&self, text: &str, actions: &[FollowUp]) -> Result<()> {
        self.push(Outbound::FollowUps {
            text: text.to_string(),
            actions: actions.to_vec(),
        });
        Ok(())
    }
}
