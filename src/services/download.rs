use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::info;

use crate::error::DownloadError;
use crate::model::outcome::EditOutcome;
use crate::services::media;

const EDITED_SUFFIX: &str = "_edited";
const FALLBACK_EXT: &str = "png";

/// `photo.final.jpg` + `image/png` -> `photo.final_edited.png`.
pub fn file_name(source_name: &str, mime_type: &str) -> String {
    let stem = match source_name.rfind('.') {
        Some(pos) if pos > 0 => &source_name[..pos],
        _ => source_name,
    };

    let stem = if stem.trim().is_empty() { "image" } else { stem };

    let ext = ImageFormat::from_mime_type(mime_type)
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or(FALLBACK_EXT);

    format!("{stem}{EDITED_SUFFIX}.{ext}")
}

/// Writes the edited image of `outcome` into `dir` and returns its path.
pub fn save_outcome(outcome: &EditOutcome, source_name: &str, dir: &Path) -> Result<PathBuf, DownloadError> {
    let edited = outcome.edited.as_deref().ok_or(DownloadError::NoImage)?;
    let (mime, bytes) = media::decode_data_url(edited)?;

    let path = dir.join(file_name(source_name, &mime));

    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, &bytes))
        .map_err(|source| DownloadError::Write {
            path: path.clone(),
            source,
        })?;

    info!(path = %path.display(), bytes = bytes.len(), "saved edited image");
    Ok(path)
}
