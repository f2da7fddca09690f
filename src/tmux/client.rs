use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Output, Stdio};

use super::{key_name, parse_pane_line};
use crate::config::TmuxSettings;
use crate::detect::{classify, Status};
use crate::driver::{Handle, Surface, WindowInfo};
use crate::keys::Key;

/// Named paste buffer so we never clobber the user's own buffers
const BUFFER_NAME: &str = "agent-relay";

/// Drives panes through the tmux CLI. Every call blocks until tmux returns.
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
    /// Lowercased substring a pane title must contain to count as a target
    title_filter: String,
    history_lines: u32,
}

impl TmuxClient {
    pub fn new(settings: &TmuxSettings) -> Self {
        Self {
            tmux_path: settings.program.clone(),
            title_filter: settings.title_filter.to_lowercase(),
            history_lines: settings.history_lines,
        }
    }

    /// Check if tmux server is running
    pub fn is_server_running(&self) -> bool {
        Command::new(&self.tmux_path)
            .arg("list-sessions")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new(&self.tmux_path)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute tmux {}", args[0]))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux {} failed: {}", args[0], stderr.trim());
        }
        Ok(output)
    }

    fn run_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// The assistant retitles its pane with the task summary, so a status
    /// glyph counts as a match too
    fn matches_filter(&self, title: &str) -> bool {
        self.title_filter.is_empty()
            || classify(title) != Status::Unknown
            || title.to_lowercase().contains(&self.title_filter)
    }
}

impl Surface for TmuxClient {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let output = Command::new(&self.tmux_path)
            .args(["list-panes", "-a", "-F", "#{pane_id}|#{pane_title}"])
            .output()
            .context("Failed to execute tmux list-panes")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-panes failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(parse_pane_line)
            .filter(|w| self.matches_filter(&w.title))
            .collect())
    }

    fn window_title(&self, handle: &Handle) -> Result<String> {
        let title = self.run_stdout(&[
            "display-message",
            "-p",
            "-t",
            handle.as_str(),
            "#{pane_title}",
        ])?;
        Ok(title.trim_end_matches('\n').to_string())
    }

    fn window_text(&self, handle: &Handle) -> Result<String> {
        let start = format!("-{}", self.history_lines);
        self.run_stdout(&[
            "capture-pane",
            "-p",
            "-J",
            "-S",
            start.as_str(),
            "-t",
            handle.as_str(),
        ])
    }

    fn capture(&self, handle: &Handle) -> Result<Vec<u8>> {
        let output = self.run(&["capture-pane", "-p", "-e", "-t", handle.as_str()])?;
        Ok(output.stdout)
    }

    fn activate(&self, handle: &Handle) -> Result<()> {
        self.run(&["select-window", "-t", handle.as_str()])?;
        self.run(&["select-pane", "-t", handle.as_str()])?;
        Ok(())
    }

    fn is_foreground(&self, handle: &Handle) -> bool {
        self.run_stdout(&[
            "display-message",
            "-p",
            "-t",
            handle.as_str(),
            "#{window_active}#{pane_active}",
        ])
        .map(|s| s.trim() == "11")
        .unwrap_or(false)
    }

    fn type_text(&self, handle: &Handle, text: &str) -> Result<()> {
        self.run(&["send-keys", "-t", handle.as_str(), "-l", "--", text])?;
        Ok(())
    }

    fn set_clipboard(&self, text: &str) -> Result<()> {
        let mut child = Command::new(&self.tmux_path)
            .args(["load-buffer", "-b", BUFFER_NAME, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to execute tmux load-buffer")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .context("Failed to write paste buffer")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to wait for tmux load-buffer")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux load-buffer failed: {}", stderr.trim());
        }
        Ok(())
    }

    fn paste(&self, handle: &Handle) -> Result<()> {
        self.run(&["paste-buffer", "-d", "-b", BUFFER_NAME, "-t", handle.as_str()])?;
        Ok(())
    }

    fn send_key(&self, handle: &Handle, key: Key) -> Result<()> {
        self.run(&["send-keys", "-t", handle.as_str(), key_name(key)])?;
        Ok(())
    }

    fn send_char(&self, handle: &Handle, ch: char) -> Result<()> {
        let mut buf = [0u8; 4];
        let ch: &str = ch.encode_utf8(&mut buf);
        self.run(&["send-keys", "-t", handle.as_str(), "-l", "--", ch])?;
        Ok(())
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new(&TmuxSettings::default())
    }
}
