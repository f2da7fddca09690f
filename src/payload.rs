use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Characters that the typing channel mangles or the shell would interpret
const UNSAFE_CHARS: &[char] = &['{', '}', '"', '$', '\\'];

/// Turns operator text into something safe to type into the target.
///
/// Long or awkward payloads are written to a file and replaced by an
/// instruction to read it.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    dir: PathBuf,
    max_inline: usize,
}

impl PayloadStore {
    pub fn new(dir: PathBuf, max_inline: usize) -> Self {
        Self { dir, max_inline }
    }

    pub fn needs_file(&self, text: &str) -> bool {
        text.chars().count() > self.max_inline || text.contains(UNSAFE_CHARS)
    }

    /// The form of `text` that actually gets injected
    pub fn materialize(&self, text: &str) -> Result<String> {
        if !self.needs_file(text) {
            return Ok(text.to_string());
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = self.dir.join(format!("msg_{}.md", stamp));
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            chars = text.chars().count(),
            "payload written to file"
        );
        Ok(format!(
            "Please read this file and follow its instructions: {}",
            path.display()
        ))
    }
}
