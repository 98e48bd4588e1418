//! Shell prompt detection.
//!
//! Prompts are recognized heuristically from screen text. A `:` inside
//! unrelated output can be mistaken for the directory separator.

use regex::Regex;

/// Characters that end a typical shell prompt.
pub const PROMPT_TERMINATORS: [char; 4] = ['>', '$', '%', '#'];

/// A prompt found in a line of terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMatch {
    /// Working directory shown in the prompt (`~` already substituted).
    pub remote_directory: String,

    /// Byte offset where the prompt terminator starts.
    pub offset: usize,

    /// Byte length of the terminator plus its optional trailing whitespace.
    pub len: usize,
}

impl PromptMatch {
    /// Byte offset of the first character typed after the prompt.
    pub fn command_start(&self) -> usize {
        self.offset + self.len
    }

    /// The text typed after the prompt.
    pub fn command<'a>(&self, line: &'a str) -> &'a str {
        line.get(self.command_start()..).unwrap_or("")
    }
}

/// Strategy for recognizing a shell prompt in a line of output.
pub trait PromptDetector: Send + Sync {
    /// Returns the prompt match, or `None` if the line holds no prompt.
    fn detect(&self, line: &str) -> Option<PromptMatch>;
}

/// Default detector: first occurrence of one of [`PROMPT_TERMINATORS`],
/// optionally followed by one whitespace character.
#[derive(Debug, Clone)]
pub struct TerminatorPrompt {
    home_substitute: String,
}

impl TerminatorPrompt {
    /// `home_substitute` replaces a directory of exactly `~`.
    pub fn new(home_substitute: impl Into<String>) -> Self {
        Self {
            home_substitute: home_substitute.into(),
        }
    }
}

impl PromptDetector for TerminatorPrompt {
    fn detect(&self, line: &str) -> Option<PromptMatch> {
        let (offset, terminator) = line.char_indices().find(|(_, c)| PROMPT_TERMINATORS.contains(c))?;
        let mut len = terminator.len_utf8();
        if let Some(next) = line[offset + len..].chars().next().filter(|c| c.is_whitespace()) {
            len += next.len_utf8();
        }

        Some(PromptMatch {
            remote_directory: extract_directory(line, offset, &self.home_substitute),
            offset,
            len,
        })
    }
}

/// Regex-based detector for prompts the terminator scan does not fit.
#[derive(Debug, Clone)]
pub struct RegexPrompt {
    pattern: Regex,
    home_substitute: String,
}

impl RegexPrompt {
    /// Compile a detector; the first match of `pattern` is the prompt.
    pub fn new(pattern: &str, home_substitute: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            home_substitute: home_substitute.into(),
        })
    }
}

impl PromptDetector for RegexPrompt {
    fn detect(&self, line: &str) -> Option<PromptMatch> {
        let m = self.pattern.find(line)?;
        Some(PromptMatch {
            remote_directory: extract_directory(line, m.start(), &self.home_substitute),
            offset: m.start(),
            len: m.len(),
        })
    }
}

/// Text between the last `:` before `offset` and `offset`, trimmed.
fn extract_directory(line: &str, offset: usize, home_substitute: &str) -> String {
    let head = &line[..offset];
    let start = head.rfind(':').map(|i| i + 1).unwrap_or(0);
    let directory = head[start..].trim();
    if directory == "~" {
        home_substitute.to_string()
    } else {
        directory.to_string()
    }
}
