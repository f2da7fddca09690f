/// Braille spinner frames the assistant prepends to its title while busy
const SPINNER_GLYPHS: &str = "⠂⠃⠄⠆⠇⠋⠙⠸⠴⠤⠐⠈⠁⠉⠊⠒⠓⠔⠕⠖⠗⠘⠚⠛⠜⠝⠞⠟⠠⠡⠢⠣⠥⠦⠧⠨⠩⠪⠫⠬⠭⠮⠯⠰⠱⠲⠳⠵⠶⠷⠹⠺⠻⠼⠽⠾⠿";

/// Title prefix shown while the assistant waits at its prompt
const READY_GLYPH: char = '✳';

const NAME_TOKEN: &str = "Claude";

/// Activity state of a target, derived from its window title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Spinner in the title: the assistant is working
    Thinking,
    /// Ready glyph or bare application title
    Idle,
    /// Empty or unrecognised title
    #[default]
    Unknown,
}

impl Status {
    /// Ordering used when listing targets: idle first
    pub fn rank(self) -> u8 {
        match self {
            Status::Idle => 0,
            Status::Thinking => 1,
            Status::Unknown => 2,
        }
    }
}

/// Classify a window title. The busy check runs first, so a spinner title
/// that also names the application is still `Thinking`.
pub fn classify(title: &str) -> Status {
    let Some(first) = title.chars().next() else {
        return Status::Unknown;
    };

    if SPINNER_GLYPHS.contains(first) {
        return Status::Thinking;
    }

    if first == READY_GLYPH || title.contains(NAME_TOKEN) {
        return Status::Idle;
    }

    Status::Unknown
}
