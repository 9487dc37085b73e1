//! PlantUML collaborator: text encoding, the rendering server client and
//! structured diagram templates.

pub mod client;
pub mod encoding;
pub mod templates;

pub use client::{OutputFormat, PlantUmlClient, RenderOutcome, SyntaxError, Validation};

/// Diagram source ready to send, plus how it maps back to what the caller wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    pub text: String,
    /// Lines added in front of the caller's text.
    line_offset: usize,
    /// Line count of the caller's text.
    input_lines: usize,
}

impl PreparedSource {
    /// Wrap bare diagram bodies in `@startuml` / `@enduml`.
    pub fn new(source: &str) -> Self {
        let input_lines = source.lines().count().max(1);
        let trimmed = source.trim_start();
        if trimmed.starts_with("@start") {
            return Self {
                text: source.to_string(),
                line_offset: 0,
                input_lines,
            };
        }
        Self {
            text: format!("@startuml\n{}\n@enduml", source.trim_end()),
            line_offset: 1,
            input_lines,
        }
    }

    /// Map a server-reported line back into the caller's text, clamped to it.
    pub fn caller_line(&self, server_line: usize) -> usize {
        server_line
            .saturating_sub(self.line_offset)
            .clamp(1, self.input_lines)
    }
}

/// Text of a 1-based line in `source`, if present and not blank.
pub fn line_at(source: &str, line: usize) -> Option<String> {
    source
        .lines()
        .nth(line.checked_sub(1)?)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}
