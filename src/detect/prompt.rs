use once_cell::sync::Lazy;
use regex::Regex;

use crate::keys::{Key, KeyToken};

/// Only the bottom of the terminal is relevant for a pending prompt
const TAIL_LINES: usize = 30;

/// Markers of an interactive choice, matched case-sensitively
const PROMPT_MARKERS: &[&str] = &[
    "Select an option",
    "Choose",
    "approve",
    "deny",
    "Yes",
    "allowedPrompts",
    "Do you want",
    "(y/n)",
    "(Y/n)",
    "❯",
    "◯",
    "◉",
    "☐",
    "☑",
];

const SELECTOR_CURSOR: char = '❯';

/// Numbered options at the start of a line: `1)`, `[2]`, `(3)`
static RE_NUMBERED_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[\[(]?(\d+)[\])]").unwrap());

/// A suggested answer for a detected prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickReply {
    Confirm,
    Decline,
    Up,
    Down,
    Select,
    /// Numbered option, 1 through 9
    Option(u8),
}

impl QuickReply {
    pub fn label(&self) -> String {
        match self {
            QuickReply::Confirm => "✅ Yes".to_string(),
            QuickReply::Decline => "❌ No".to_string(),
            QuickReply::Up => "↑".to_string(),
            QuickReply::Down => "↓".to_string(),
            QuickReply::Select => "✓ Confirm".to_string(),
            QuickReply::Option(n) => n.to_string(),
        }
    }

    pub fn keys(&self) -> Vec<KeyToken> {
        match self {
            QuickReply::Confirm => vec![KeyToken::text("y"), KeyToken::Key(Key::Enter)],
            QuickReply::Decline => vec![KeyToken::text("n"), KeyToken::Key(Key::Enter)],
            QuickReply::Up => vec![KeyToken::Key(Key::Up)],
            QuickReply::Down => vec![KeyToken::Key(Key::Down)],
            QuickReply::Select => vec![KeyToken::Key(Key::Enter)],
            QuickReply::Option(n) => vec![KeyToken::Text(n.to_string()), KeyToken::Key(Key::Enter)],
        }
    }
}

/// An interactive prompt found in the terminal tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// The tail of the terminal text the prompt was found in
    pub text: String,
    /// Suggested replies; empty when the prompt shape is not recognised
    pub replies: Vec<QuickReply>,
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}

/// Look for an interactive prompt in extracted terminal text
pub fn detect(text: &str) -> Option<Prompt> {
    if text.trim().is_empty() {
        return None;
    }

    let recent = tail(text);
    if !PROMPT_MARKERS.iter().any(|m| recent.contains(m)) {
        return None;
    }

    let replies = classify_prompt(&recent);
    Some(Prompt {
        text: recent,
        replies,
    })
}

/// Map a prompt to quick replies. First matching rule wins:
/// yes/no, then selector cursor, then numbered options.
pub fn classify_prompt(text: &str) -> Vec<QuickReply> {
    let lower = text.to_lowercase();
    if lower.contains("(y/n)") || lower.contains("yes/no") {
        return vec![QuickReply::Confirm, QuickReply::Decline];
    }

    if text.contains(SELECTOR_CURSOR) {
        return vec![QuickReply::Up, QuickReply::Down, QuickReply::Select];
    }

    let mut options: Vec<u8> = RE_NUMBERED_OPTION
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u8>().ok())
        .filter(|n| (1..=9).contains(n))
        .collect();
    options.sort_unstable();
    options.dedup();

    options.into_iter().map(QuickReply::Option).collect()
}
