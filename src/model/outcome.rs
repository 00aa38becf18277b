use serde::{Deserialize, Serialize};

/// Result of editing one selected image.
///
/// Exactly one of `edited` / `error` is set once the item has been processed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub original: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EditOutcome {
    pub fn success(original: impl Into<String>, edited: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            edited: Some(edited.into()),
            error: None,
        }
    }

    pub fn failure(original: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            edited: None,
            error: Some(error.into()),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.edited.is_some() != self.error.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }
}
