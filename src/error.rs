use std::path::PathBuf;

use thiserror::Error;

/// Shown when a remote failure carries no usable message.
pub const GENERIC_SERVICE_FAILURE: &str = "Failed to communicate with the AI model.";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a supported image file")]
    UnsupportedType(String),

    #[error("malformed data URL")]
    MalformedDataUrl,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("API key is not configured")]
    MissingApiKey,

    #[error("{0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("invalid AI response: {0}")]
    InvalidResponse(String),

    #[error("the model did not return an image{}", text_suffix(.0))]
    NoImage(Option<String>),

    /// Opaque failure reported by the service, carried verbatim.
    #[error("{0}")]
    Remote(String),
}

fn text_suffix(text: &Option<String>) -> String {
    match text.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => format!(": {t}"),
        _ => String::new(),
    }
}

impl ServiceError {
    /// Display-ready message for a result tile or the error banner.
    pub fn user_message(&self) -> String {
        let msg = self.to_string();
        if msg.trim().is_empty() {
            GENERIC_SERVICE_FAILURE.to_string()
        } else {
            msg
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[cfg(test)]
    #[error("storage quota exceeded ({needed} bytes, {quota} available)")]
    QuotaExceeded { needed: usize, quota: usize },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("result has no edited image")]
    NoImage,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Precondition(String),

    #[error("no item at index {index} (have {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error(transparent)]
    Service(#[from] ServiceError),
}
