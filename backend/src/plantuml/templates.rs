//! Structured diagram descriptions turned into PlantUML source.
//!
//! Inputs are validated with `garde` before any text is produced, so the
//! builders only ever see non-empty names and identifiers.

use garde::Validate;
use serde::Deserialize;
use std::collections::HashSet;

use super::client::OutputFormat;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("{0}")]
    Invalid(#[from] garde::Report),

    #[error("Connection references unknown node '{0}'")]
    UnknownNode(String),

    #[error("Duplicate node id '{0}'")]
    DuplicateNode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    #[default]
    Participant,
    Actor,
    Boundary,
    Control,
    Entity,
    Database,
    Collections,
    Queue,
}

impl ParticipantKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Actor => "actor",
            Self::Boundary => "boundary",
            Self::Control => "control",
            Self::Entity => "entity",
            Self::Database => "database",
            Self::Collections => "collections",
            Self::Queue => "queue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowStyle {
    #[default]
    Sync,
    Async,
    Reply,
}

impl ArrowStyle {
    fn arrow(self) -> &'static str {
        match self {
            Self::Sync => "->",
            Self::Async => "->>",
            Self::Reply => "-->",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Participant {
    #[garde(length(min = 1))]
    pub name: String,
    #[serde(default)]
    #[garde(skip)]
    pub kind: ParticipantKind,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Step {
    #[garde(length(min = 1))]
    pub from: String,
    #[garde(length(min = 1))]
    pub to: String,
    #[serde(default)]
    #[garde(skip)]
    pub message: String,
    #[serde(default)]
    #[garde(skip)]
    pub style: ArrowStyle,
}

/// Arguments of `generate_sequence_diagram`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SequenceDiagram {
    #[serde(default)]
    #[garde(skip)]
    pub title: Option<String>,
    #[garde(length(min = 1), dive)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    #[garde(dive)]
    pub steps: Vec<Step>,
    #[serde(default)]
    #[garde(skip)]
    pub output_format: OutputFormat,
}

impl SequenceDiagram {
    pub fn to_plantuml(&self) -> Result<String, TemplateError> {
        self.validate()?;

        let mut lines = vec!["@startuml".to_string()];
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            lines.push(format!("title {}", escape(title)));
        }
        for participant in &self.participants {
            lines.push(format!(
                "{} \"{}\" as {}",
                participant.kind.keyword(),
                escape_quoted(&participant.name),
                alias(&participant.name)
            ));
        }
        for step in &self.steps {
            let mut line = format!(
                "{} {} {}",
                alias(&step.from),
                step.style.arrow(),
                alias(&step.to)
            );
            if !step.message.trim().is_empty() {
                line.push_str(" : ");
                line.push_str(&escape(&step.message));
            }
            lines.push(line);
        }
        lines.push("@enduml".to_string());
        Ok(lines.join("\n"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Component,
    Database,
    Queue,
    Cloud,
    Node,
    Actor,
    Interface,
    Storage,
}

impl NodeKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Database => "database",
            Self::Queue => "queue",
            Self::Cloud => "cloud",
            Self::Node => "node",
            Self::Actor => "actor",
            Self::Interface => "interface",
            Self::Storage => "storage",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Node {
    #[garde(length(min = 1))]
    pub id: String,
    #[serde(default)]
    #[garde(skip)]
    pub label: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NodeGroup {
    #[garde(length(min = 1))]
    pub name: String,
    #[garde(length(min = 1), dive)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Connection {
    #[garde(length(min = 1))]
    pub from: String,
    #[garde(length(min = 1))]
    pub to: String,
    #[serde(default)]
    #[garde(skip)]
    pub label: Option<String>,
}

/// Arguments of `generate_architecture_diagram`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ArchitectureDiagram {
    #[serde(default)]
    #[garde(skip)]
    pub title: Option<String>,
    #[garde(length(min = 1), dive)]
    pub groups: Vec<NodeGroup>,
    #[serde(default)]
    #[garde(dive)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    #[garde(skip)]
    pub output_format: OutputFormat,
}

impl ArchitectureDiagram {
    pub fn to_plantuml(&self) -> Result<String, TemplateError> {
        self.validate()?;

        let mut ids = HashSet::new();
        for node in self.groups.iter().flat_map(|g| &g.nodes) {
            if !ids.insert(node.id.as_str()) {
                return Err(TemplateError::DuplicateNode(node.id.clone()));
            }
        }
        for connection in &self.connections {
            for end in [&connection.from, &connection.to] {
                if !ids.contains(end.as_str()) {
                    return Err(TemplateError::UnknownNode(end.clone()));
                }
            }
        }

        let mut lines = vec!["@startuml".to_string()];
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            lines.push(format!("title {}", escape(title)));
        }
        for group in &self.groups {
            lines.push(format!("package \"{}\" {{", escape_quoted(&group.name)));
            for node in &group.nodes {
                let label = node.label.as_deref().unwrap_or(&node.id);
                lines.push(format!(
                    "  {} \"{}\" as {}",
                    node.kind.keyword(),
                    escape_quoted(label),
                    alias(&node.id)
                ));
            }
            lines.push("}".to_string());
        }
        for connection in &self.connections {
            let mut line = format!("{} --> {}", alias(&connection.from), alias(&connection.to));
            if let Some(label) = connection.label.as_deref().filter(|l| !l.trim().is_empty()) {
                line.push_str(" : ");
                line.push_str(&escape(label));
            }
            lines.push(line);
        }
        lines.push("@enduml".to_string());
        Ok(lines.join("\n"))
    }
}

/// PlantUML identifier for a free-form name.
fn alias(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Keep a label on one line; PlantUML renders `\n` as a line break.
fn escape(text: &str) -> String {
    text.replace("\r\n", "\\n").replace('\n', "\\n")
}

fn escape_quoted(text: &str) -> String {
    escape(text).replace('"', "'")
}
