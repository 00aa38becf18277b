use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::CoreError;
use crate::model::outcome::{EditOutcome, Progress};
use crate::model::workflow::Mode;
use crate::services::ai::GeminiClient;
use crate::services::ai_types::RemoteService;
use crate::services::result_store::{FileResultStore, ResultStore};
use crate::services::workflow::Controller;
use crate::services::{download, prompts};

mod command;
pub use command::Command;

fn get_cmd(req: &Value) -> &str {
    req.get("cmd").and_then(|v| v.as_str()).unwrap_or("")
}

fn get_id(req: &Value) -> Value {
    req.get("id").cloned().unwrap_or(Value::Null)
}

fn get_payload(req: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    req.get("payload").unwrap_or(&EMPTY)
}

fn get_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(|v| v.as_str())
}

fn get_index(payload: &Value) -> Result<usize, String> {
    payload
        .get("index")
        .and_then(|v| v.as_u64())
        .map(|i| i as usize)
        .ok_or_else(|| "payload.index must be a non-negative integer".to_string())
}

fn ok(id: Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "ok",
        "payload": payload
    })
    .to_string()
}

fn err(id: Value, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "status": "error",
        "message": message.into()
    })
    .to_string()
}

fn progress_frame(id: &Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "progress",
        "payload": payload
    })
    .to_string()
}

/// One front-end connection: configuration plus the workflow controller.
pub struct Session {
    config: Config,
    controller: Controller,
}

impl Session {
    /// Wires the Gemini client and the on-disk result store from `config`.
    pub fn new(config: Config) -> Result<Self, CoreError> {
        let service = GeminiClient::new(&config)?;
        let store = FileResultStore::new(&config.data_dir);
        Ok(Self::with_parts(config, Box::new(service), Box::new(store)))
    }

    pub fn with_parts(config: Config, service: Box<dyn RemoteService>, store: Box<dyn ResultStore>) -> Self {
        Self {
            config,
            controller: Controller::new(service, store),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    fn view(&self) -> Value {
        serde_json::to_value(self.controller.view()).unwrap_or(Value::Null)
    }

    /// Handles one request line. `emit` receives intermediate frames
    /// (progress during generate) before the returned final response.
    pub fn handle(&mut self, input: &str, emit: &mut dyn FnMut(String)) -> String {
        let req: Value = match serde_json::from_str(input) {
            Ok(v) => v,
            Err(_) => {
                return json!({
                    "status": "error",
                    "message": "invalid json"
                })
                .to_string();
            }
        };

        let id = get_id(&req);
        let cmd_str = get_cmd(&req);
        let payload = get_payload(&req);

        debug!(cmd = cmd_str, "request");

        match Command::from(cmd_str) {
            Command::Ping => ok(id, json!({ "message": "photo-prompt-core alive" })),

            Command::State => ok(id, self.view()),

            Command::SetMode => {
                let Some(mode) = get_str(payload, "mode").and_then(Mode::parse) else {
                    return err(id, "payload.mode must be \"edit\" or \"analyze\"");
                };
                self.controller.set_mode(mode);
                ok(id, self.view())
            }

            Command::SetPrompt => {
                let prompt = get_str(payload, "prompt").unwrap_or("");
                self.controller.set_prompt(prompt);
                ok(id, self.view())
            }

            Command::SuggestedPrompts => {
                let mode = match get_str(payload, "mode") {
                    Some(m) => match Mode::parse(m) {
                        Some(mode) => mode,
                        None => return err(id, "payload.mode must be \"edit\" or \"analyze\""),
                    },
                    None => self.controller.mode(),
                };
                ok(id, json!({ "mode": mode, "prompts": prompts::suggested(mode) }))
            }

            Command::AddImages => {
                let Some(arr) = payload.get("paths").and_then(|v| v.as_array()) else {
                    return err(id, "payload.paths must be an array");
                };

                let mut paths: Vec<PathBuf> = Vec::with_capacity(arr.len());
                for (i, v) in arr.iter().enumerate() {
                    match v.as_str() {
                        Some(p) if !p.trim().is_empty() => paths.push(PathBuf::from(p)),
                        _ => return err(id, format!("invalid path at index {i}")),
                    }
                }

                match self.controller.select_files(&paths[..]) {
                    Ok(()) => ok(id, self.view()),
                    Err(e) => err(id, e.to_string()),
                }
            }

            Command::RemoveImage => {
                let index = match get_index(payload) {
                    Ok(i) => i,
                    Err(e) => return err(id, e),
                };
                match self.controller.remove_image(index) {
                    Ok(_) => ok(id, self.view()),
                    Err(e) => err(id, e.to_string()),
                }
            }

            Command::ClearImages => {
                self.controller.clear_images();
                ok(id, self.view())
            }

            Command::DismissError => {
                self.controller.dismiss_error();
                ok(id, self.view())
            }

            Command::Generate => {
                let mut on_progress = |progress: &Progress, outcomes: &[EditOutcome]| {
                    emit(progress_frame(
                        &id,
                        json!({
                            "completed": progress.completed,
                            "total": progress.total,
                            "outcomes": outcomes,
                        }),
                    ));
                };

                match self.controller.generate(&mut on_progress) {
                    Ok(()) => ok(id, self.view()),
                    Err(e) => err(id, e.to_string()),
                }
            }

            Command::Download => {
                let index = match get_index(payload) {
                    Ok(i) => i,
                    Err(e) => return err(id, e),
                };
                let Some(dir) = get_str(payload, "dir").filter(|d| !d.trim().is_empty()) else {
                    return err(id, "payload.dir is required");
                };

                let outcomes = self.controller.outcomes();
                let Some(outcome) = outcomes.get(index) else {
                    return err(
                        id,
                        CoreError::InvalidIndex {
                            index,
                            len: outcomes.len(),
                        }
                        .to_string(),
                    );
                };

                // results restored from a previous session have no source file
                let source_name = self
                    .controller
                    .images()
                    .get(index)
                    .map(|img| img.source.name.as_str())
                    .unwrap_or("image");

                match download::save_outcome(outcome, source_name, &PathBuf::from(dir)) {
                    Ok(path) => ok(id, json!({ "path": path.to_string_lossy() })),
                    Err(e) => err(id, e.to_string()),
                }
            }

            Command::SetConfig => {
                if let Some(key) = get_str(payload, "api_key") {
                    self.config.api_key = Some(key.trim().to_string()).filter(|k| !k.is_empty());
                }
                if let Some(m) = get_str(payload, "edit_model").filter(|m| !m.trim().is_empty()) {
                    self.config.edit_model = m.trim().to_string();
                }
                if let Some(m) = get_str(payload, "analyze_model").filter(|m| !m.trim().is_empty()) {
                    self.config.analyze_model = m.trim().to_string();
                }

                match GeminiClient::new(&self.config) {
                    Ok(client) => {
                        self.controller.set_service(Box::new(client));
                        ok(id, json!({ "configured": self.config.has_api_key() }))
                    }
                    Err(e) => {
                        error!(error = %e, "failed to rebuild AI client");
                        err(id, e.to_string())
                    }
                }
            }

            Command::Unknown => err(id, "unknown command"),
        }
    }
}
