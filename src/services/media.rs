use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::MediaError;
use crate::model::image::{SelectedImage, SourceFile};

const ID_LEN: usize = 16;

fn data_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^data:([A-Za-z0-9!#$&^_.+-]+/[A-Za-z0-9!#$&^_.+-]+)(?:;[^,;]+=[^,;]*)*;base64,(.*)$")
            .expect("data URL pattern is valid")
    })
}

pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Splits a base64 `data:` URL into `(mime_type, payload)`.
pub fn split_data_url(data_url: &str) -> Option<(&str, &str)> {
    let caps = data_url_re().captures(data_url)?;
    let mime = caps.get(1)?.as_str();
    let payload = caps.get(2)?.as_str();
    Some((mime, payload))
}

pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), MediaError> {
    let (mime, payload) = split_data_url(data_url).ok_or(MediaError::MalformedDataUrl)?;
    let bytes = STANDARD.decode(payload.trim())?;
    Ok((mime.to_string(), bytes))
}

pub fn encode_file(path: &Path) -> Result<SelectedImage, MediaError> {
    let bytes = fs::read(path).map_err(|source| MediaError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let mime_type = detect_mime(path, &bytes).ok_or_else(|| MediaError::UnsupportedType(name.clone()))?;

    Ok(encode_bytes(name, mime_type, &bytes))
}

pub fn encode_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> SelectedImage {
    let mime_type = mime_type.into();

    SelectedImage {
        id: content_id(bytes),
        data_url: to_data_url(&mime_type, bytes),
        source: SourceFile {
            name: name.into(),
            mime_type,
        },
    }
}

/// Encodes every file in order. The first unreadable or non-image file
/// aborts the whole batch.
pub fn encode_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SelectedImage>, MediaError> {
    paths.iter().map(|p| encode_file(p.as_ref())).collect()
}

fn detect_mime(path: &Path, bytes: &[u8]) -> Option<String> {
    ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(bytes))
        .ok()
        .map(|f| f.to_mime_type().to_string())
}

fn content_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    id
}
