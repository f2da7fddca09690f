//! Input driver: everything the monitors do to a target goes through here.
//!
//! The OS automation surface is synchronous and may block, so every call is
//! run on tokio's blocking pool and awaited. Failures to read are folded into
//! empty values; the callers decide what an empty title or a missing capture
//! means.

mod inject;

pub use inject::{ClipboardPaste, InjectStrategy, TypeKeys};

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::keys::{Key, KeyToken};

/// Opaque identifier of one target window (a tmux pane id such as `%3`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A window as reported by a discovery scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: Handle,
    pub title: String,
}

/// A captured frame plus its content digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub hash: String,
}

impl Screenshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        let hash = format!("{:x}", Sha256::digest(&bytes));
        Self { bytes, hash }
    }
}

/// Blocking automation primitives of the host that runs the targets
pub trait Surface: Send + Sync + 'static {
    fn list_windows(&self) -> Result<Vec<WindowInfo>>;
    fn window_title(&self, handle: &Handle) -> Result<String>;
    fn window_text(&self, handle: &Handle) -> Result<String>;
    /// Capture the window without activating it
    fn capture(&self, handle: &Handle) -> Result<Vec<u8>>;
    fn activate(&self, handle: &Handle) -> Result<()>;
    fn is_foreground(&self, handle: &Handle) -> bool;
    /// High-level typing channel
    fn type_text(&self, handle: &Handle, text: &str) -> Result<()>;
    fn set_clipboard(&self, text: &str) -> Result<()>;
    /// Paste the clipboard into the window
    fn paste(&self, handle: &Handle) -> Result<()>;
    /// Low-level key event
    fn send_key(&self, handle: &Handle, key: Key) -> Result<()>;
    fn send_char(&self, handle: &Handle, ch: char) -> Result<()>;
}

/// Timing knobs for activation and key pacing
#[derive(Debug, Clone, Copy)]
pub struct DriverTiming {
    /// Wait after an activation request before checking the foreground
    pub settle: Duration,
    /// Pause between raw key tokens
    pub key_pause: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            key_pause: Duration::from_millis(50),
        }
    }
}

#[derive(Clone)]
pub struct InputDriver {
    surface: Arc<dyn Surface>,
    strategies: Arc<[Box<dyn InjectStrategy>]>,
    timing: DriverTiming,
}

impl InputDriver {
    /// Driver with the default channel order: typing, then clipboard paste
    pub fn new(surface: Arc<dyn Surface>, timing: DriverTiming) -> Self {
        Self::with_strategies(
            surface,
            vec![Box::new(TypeKeys), Box::new(ClipboardPaste)],
            timing,
        )
    }

    pub fn with_strategies(
        surface: Arc<dyn Surface>,
        strategies: Vec<Box<dyn InjectStrategy>>,
        timing: DriverTiming,
    ) -> Self {
        Self {
            surface,
            strategies: strategies.into(),
            timing,
        }
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Surface) -> T + Send + 'static,
    {
        let surface = self.surface.clone();
        match tokio::task::spawn_blocking(move || f(surface.as_ref())).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(op, error = %e, "surface call did not complete");
                None
            }
        }
    }

    pub async fn discover(&self) -> Vec<WindowInfo> {
        let windows = self.blocking("discover", |s| s.list_windows()).await;
        match windows {
            Some(Ok(windows)) => windows,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "window scan failed");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Capture a frame. `None` is transient: skip this tick and retry later.
    pub async fn capture_screenshot(&self, handle: &Handle) -> Option<Screenshot> {
        let h = handle.clone();
        match self.blocking("capture", move |s| s.capture(&h)).await? {
            Ok(bytes) if !bytes.is_empty() => Some(Screenshot::new(bytes)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(handle = %handle, error = %e, "capture failed");
                None
            }
        }
    }

    /// Current title; empty means the target is gone.
    pub async fn read_title(&self, handle: &Handle) -> String {
        let h = handle.clone();
        match self.blocking("title", move |s| s.window_title(&h)).await {
            Some(Ok(title)) => title,
            Some(Err(e)) => {
                tracing::debug!(handle = %handle, error = %e, "title read failed");
                String::new()
            }
            None => String::new(),
        }
    }

    /// Best-effort text read; empty just means nothing was available.
    pub async fn read_text(&self, handle: &Handle) -> String {
        let h = handle.clone();
        match self.blocking("text", move |s| s.window_text(&h)).await {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                tracing::debug!(handle = %handle, error = %e, "text read failed");
                String::new()
            }
            None => String::new(),
        }
    }

    /// Type `payload` and submit it. `false` only when every channel failed.
    pub async fn inject(&self, handle: &Handle, payload: &str) -> bool {
        let h = handle.clone();
        let payload = payload.to_string();
        let strategies = self.strategies.clone();
        let timing = self.timing;
        self.blocking("inject", move |s| {
            inject::run_chain(s, &strategies, &h, &payload, timing)
        })
        .await
        .unwrap_or(false)
    }

    /// Press keys / type literal tokens. No submit is added.
    pub async fn inject_raw_keys(&self, handle: &Handle, tokens: Vec<KeyToken>) -> bool {
        let h = handle.clone();
        let timing = self.timing;
        self.blocking("keys", move |s| inject::send_tokens(s, &h, &tokens, timing))
            .await
            .unwrap_or(false)
    }
}
