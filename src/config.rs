use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_ANALYZE_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: usize = 3;
/// Upper bound on attempts per remote call.
pub const MAX_RETRIES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub edit_model: String,
    pub analyze_model: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            analyze_model: DEFAULT_ANALYZE_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            data_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Defaults, then `settings.json` in the data directory, then environment.
    pub fn load() -> Self {
        let data_dir = data_dir_from_env();
        let mut cfg = read_settings(&data_dir.join(SETTINGS_FILE)).unwrap_or_default();
        cfg.data_dir = data_dir;
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.clamp_limits();
        cfg
    }

    fn clamp_limits(&mut self) {
        let clamped = self.max_retries.clamp(1, MAX_RETRIES);
        if clamped != self.max_retries {
            warn!(max_retries = self.max_retries, clamped, "max_retries out of range");
            self.max_retries = clamped;
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |k: &str| var(k).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("PHOTO_PROMPT_API_KEY").or_else(|| non_empty("GEMINI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(base) = non_empty("PHOTO_PROMPT_API_BASE") {
            self.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(m) = non_empty("PHOTO_PROMPT_EDIT_MODEL") {
            self.edit_model = m;
        }
        if let Some(m) = non_empty("PHOTO_PROMPT_ANALYZE_MODEL") {
            self.analyze_model = m;
        }
        if let Some(v) = non_empty("PHOTO_PROMPT_TIMEOUT_SECS") {
            match v.trim().parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => warn!(value = %v, "ignoring invalid PHOTO_PROMPT_TIMEOUT_SECS"),
            }
        }
        if let Some(v) = non_empty("PHOTO_PROMPT_MAX_RETRIES") {
            match v.trim().parse::<usize>() {
                Ok(n) => self.max_retries = n,
                Err(_) => warn!(value = %v, "ignoring invalid PHOTO_PROMPT_MAX_RETRIES"),
            }
        }
    }
}

fn data_dir_from_env() -> PathBuf {
    if let Ok(dir) = std::env::var("PHOTO_PROMPT_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        return PathBuf::from(local).join("PhotoPrompt");
    }
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join("PhotoPrompt");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("PhotoPrompt")
}

fn read_settings(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }

    let data = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read settings");
            return None;
        }
    };

    match serde_json::from_str::<Config>(&data) {
        Ok(mut cfg) => {
            cfg.clamp_limits();
            Some(cfg)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse settings");
            None
        }
    }
}
