/// Named keys the driver can press through the low-level key primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
}

/// One unit of a raw key sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    /// A named key
    Key(Key),
    /// Literal text, typed one character at a time
    Text(String),
}

impl KeyToken {
    pub fn text(s: impl Into<String>) -> Self {
        KeyToken::Text(s.into())
    }
}

impl std::fmt::Display for KeyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyToken::Key(key) => write!(f, "{}", key_alias(*key)),
            KeyToken::Text(text) => write!(f, "{}", text),
        }
    }
}

fn lookup_alias(token: &str) -> Option<Key> {
    let key = match token.to_lowercase().as_str() {
        "up" | "上" | "↑" => Key::Up,
        "down" | "下" | "↓" => Key::Down,
        "left" | "左" | "←" => Key::Left,
        "right" | "右" | "→" => Key::Right,
        "enter" | "回车" => Key::Enter,
        "tab" => Key::Tab,
        "backspace" | "退格" => Key::Backspace,
        "esc" | "escape" | "取消" => Key::Escape,
        "space" | "空格" => Key::Space,
        _ => return None,
    };
    Some(key)
}

/// Canonical alias used when echoing a sequence back to the operator
pub fn key_alias(key: Key) -> &'static str {
    match key {
        Key::Up => "up",
        Key::Down => "down",
        Key::Left => "left",
        Key::Right => "right",
        Key::Enter => "enter",
        Key::Escape => "esc",
        Key::Tab => "tab",
        Key::Space => "space",
        Key::Backspace => "backspace",
    }
}

pub fn parse_token(token: &str) -> KeyToken {
    match lookup_alias(token) {
        Some(key) => KeyToken::Key(key),
        None => KeyToken::Text(token.to_string()),
    }
}

/// Split an operator key string (`"2 enter"`, `"↓ ↓ 回车"`) into tokens
pub fn parse_tokens(input: &str) -> Vec<KeyToken> {
    input.split_whitespace().map(parse_token).collect()
}

pub fn format_tokens(tokens: &[KeyToken]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
