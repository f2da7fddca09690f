//! tmux backend: each pane running the assistant is one target.

mod client;

pub use client::TmuxClient;

use crate::driver::{Handle, WindowInfo};
use crate::keys::Key;

/// Parse one line of `list-panes -F '#{pane_id}|#{pane_title}'`.
/// Titles may themselves contain `|`.
pub fn parse_pane_line(line: &str) -> Option<WindowInfo> {
    let (id, title) = line.split_once('|')?;
    if !id.starts_with('%') {
        return None;
    }
    Some(WindowInfo {
        handle: Handle::new(id),
        title: title.to_string(),
    })
}

/// Key name as understood by `send-keys`
pub fn key_name(key: Key) -> &'static str {
    match key {
        Key::Up => "Up",
        Key::Down => "Down",
        Key::Left => "Left",
        Key::Right => "Right",
        Key::Enter => "Enter",
        Key::Escape => "Escape",
        Key::Tab => "Tab",
        Key::Space => "Space",
        Key::Backspace => "BSpace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pane_line() {
        let info = parse_pane_line("%12|✳ Claude Code").unwrap();
        assert_eq!(info.handle, Handle::new("%12"));
        assert_eq!(info.title, "✳ Claude Code");
    }

    #[test]
    fn test_parse_title_with_separator() {
        let info = parse_pane_line("%3|a|b").unwrap();
        assert_eq!(info.title, "a|b");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_pane_line("").is_none());
        assert!(parse_pane_line("no separator").is_none());
        assert!(parse_pane_line("$0|session").is_none());
    }

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(Key::Backspace), "BSpace");
        assert_eq!(key_name(Key::Escape), "Escape");
    }
}
