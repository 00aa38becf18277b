use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
}

/// One image in the current selection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    /// Content fingerprint, lets the UI track tiles across updates.
    pub id: String,

    /// Full file content as a `data:` URL.
    pub data_url: String,

    pub source: SourceFile,
}
