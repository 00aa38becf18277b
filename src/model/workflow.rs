use serde::{Deserialize, Serialize};

use super::image::SourceFile;
use super::outcome::{EditOutcome, Progress};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Edit,
    Analyze,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edit" => Some(Mode::Edit),
            "analyze" | "analyse" => Some(Mode::Analyze),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ImageView {
    pub index: usize,
    pub id: String,
    pub data_url: String,
    #[serde(flatten)]
    pub source: SourceFile,
}

/// Snapshot of the controller handed to the front end.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct WorkflowView {
    pub mode: Mode,
    pub run_state: RunState,
    pub prompt: String,
    pub images: Vec<ImageView>,
    pub outcomes: Vec<EditOutcome>,
    pub analysis: Option<String>,
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub can_generate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!(Mode::parse("Edit"), Some(Mode::Edit));
        assert_eq!(Mode::parse(" analyze "), Some(Mode::Analyze));
        assert_eq!(Mode::parse("draw"), None);
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(serde_json::to_value(Mode::Analyze).unwrap(), "analyze");
        assert_eq!(serde_json::to_value(RunState::Done).unwrap(), "done");
    }
}
