use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::{CoreError, MediaError};
use crate::model::image::SelectedImage;
use crate::model::outcome::{EditOutcome, Progress};
use crate::model::workflow::{ImageView, Mode, RunState, WorkflowView};
use crate::services::ai_types::RemoteService;
use crate::services::media;
use crate::services::result_store::ResultStore;

pub const MISSING_IMAGE: &str = "Please upload at least one image.";
pub const MISSING_PROMPT: &str = "Please enter a prompt.";
pub const RUN_ABORTED: &str = "Generation stopped unexpectedly.";

/// Owns the selection, prompt and results, and drives generate runs.
pub struct Controller {
    mode: Mode,
    run_state: RunState,
    prompt: String,
    images: Vec<SelectedImage>,
    outcomes: Vec<EditOutcome>,
    analysis: Option<String>,
    progress: Option<Progress>,
    error: Option<String>,

    service: Box<dyn RemoteService>,
    store: Box<dyn ResultStore>,
}

impl Controller {
    /// Starts in edit mode with whatever the store still holds from the
    /// previous session.
    pub fn new(service: Box<dyn RemoteService>, mut store: Box<dyn ResultStore>) -> Self {
        let outcomes = store.load();

        Self {
            mode: Mode::Edit,
            run_state: RunState::Idle,
            prompt: String::new(),
            images: Vec::new(),
            outcomes,
            analysis: None,
            progress: None,
            error: None,
            service,
            store,
        }
    }

    pub fn set_service(&mut self, service: Box<dyn RemoteService>) {
        self.service = service;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn images(&self) -> &[SelectedImage] {
        &self.images
    }

    pub fn outcomes(&self) -> &[EditOutcome] {
        &self.outcomes
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }

        info!(?mode, "switching mode");

        self.mode = mode;
        self.prompt.clear();
        self.images.clear();
        self.reset_results();
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Encodes and adds files. Nothing changes if any file fails to encode.
    pub fn select_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<(), MediaError> {
        match media::encode_files(paths) {
            Ok(images) => {
                self.add_images(images);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to read selected files");
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Edit mode appends; analyze mode keeps only the first new image.
    pub fn add_images(&mut self, images: Vec<SelectedImage>) {
        if images.is_empty() {
            return;
        }

        match self.mode {
            Mode::Edit => self.images.extend(images),
            Mode::Analyze => {
                self.images = images.into_iter().take(1).collect();
            }
        }

        self.reset_results();
    }

    pub fn remove_image(&mut self, index: usize) -> Result<SelectedImage, CoreError> {
        if index >= self.images.len() {
            return Err(CoreError::InvalidIndex {
                index,
                len: self.images.len(),
            });
        }

        let removed = self.images.remove(index);
        self.reset_results();
        Ok(removed)
    }

    pub fn clear_images(&mut self) {
        self.images.clear();
        self.reset_results();
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn can_generate(&self) -> bool {
        self.run_state != RunState::Running && !self.prompt.trim().is_empty() && !self.images.is_empty()
    }

    /// Runs the current mode. Only precondition failures are returned as
    /// errors; remote failures end up in the outcomes or the error banner.
    pub fn generate(&mut self, on_progress: &mut dyn FnMut(&Progress, &[EditOutcome])) -> Result<(), CoreError> {
        if let Some(msg) = self.precondition_error() {
            self.error = Some(msg.to_string());
            return Err(CoreError::Precondition(msg.to_string()));
        }

        self.run_state = RunState::Running;
        self.error = None;
        self.analysis = None;
        self.outcomes.clear();
        self.progress = None;

        let run = panic::catch_unwind(AssertUnwindSafe(|| match self.mode {
            Mode::Edit => self.run_edit(on_progress),
            Mode::Analyze => self.run_analyze(),
        }));

        // Running never outlives this call
        if run.is_err() {
            error!(mode = ?self.mode, "generate panicked");
            self.error = Some(RUN_ABORTED.to_string());
        }

        self.run_state = RunState::Done;
        Ok(())
    }

    fn precondition_error(&self) -> Option<&'static str> {
        if self.run_state == RunState::Running {
            Some("A generation is already running.")
        } else if self.images.is_empty() {
            Some(MISSING_IMAGE)
        } else if self.prompt.trim().is_empty() {
            Some(MISSING_PROMPT)
        } else {
            None
        }
    }

    fn run_edit(&mut self, on_progress: &mut dyn FnMut(&Progress, &[EditOutcome])) {
        let total = self.images.len();
        let mut progress = Progress { completed: 0, total };
        self.progress = Some(progress);

        info!(total, "starting edit batch");

        // one request in flight at a time, results in input order
        for (i, img) in self.images.iter().enumerate() {
            let outcome = edit_one(self.service.as_ref(), img, &self.prompt);

            if let Some(err) = &outcome.error {
                warn!(index = i, name = %img.source.name, error = %err, "edit failed");
            }

            self.outcomes.push(outcome);
            progress.completed += 1;
            self.progress = Some(progress);
            on_progress(&progress, &self.outcomes);
        }

        let failed = self.outcomes.iter().filter(|o| o.error.is_some()).count();
        info!(total, failed, "edit batch finished");

        if !self.outcomes.is_empty() {
            if let Err(e) = self.store.save(&self.outcomes) {
                warn!(error = %e, "failed to persist edit results");
            }
        }
    }

    fn run_analyze(&mut self) {
        let Some(img) = self.images.first() else {
            return;
        };

        let result = match media::split_data_url(&img.data_url) {
            Some((_, payload)) => self
                .service
                .analyze(payload, &img.source.mime_type, &self.prompt)
                .map_err(|e| e.user_message()),
            None => Err(MediaError::MalformedDataUrl.to_string()),
        };

        match result {
            Ok(text) => self.analysis = Some(text),
            Err(msg) => {
                warn!(error = %msg, "analysis failed");
                self.error = Some(msg);
            }
        }
    }

    fn reset_results(&mut self) {
        self.run_state = RunState::Idle;
        self.outcomes.clear();
        self.analysis = None;
        self.progress = None;
        self.error = None;

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear stored results");
        }
    }

    pub fn view(&self) -> WorkflowView {
        WorkflowView {
            mode: self.mode,
            run_state: self.run_state,
            prompt: self.prompt.clone(),
            images: self
                .images
                .iter()
                .enumerate()
                .map(|(index, img)| ImageView {
                    index,
                    id: img.id.clone(),
                    data_url: img.data_url.clone(),
                    source: img.source.clone(),
                })
                .collect(),
            outcomes: self.outcomes.clone(),
            analysis: self.analysis.clone(),
            progress: self.progress,
            error: self.error.clone(),
            can_generate: self.can_generate(),
        }
    }
}

fn edit_one(service: &dyn RemoteService, img: &SelectedImage, prompt: &str) -> EditOutcome {
    let Some((_, payload)) = media::split_data_url(&img.data_url) else {
        return EditOutcome::failure(&img.data_url, MediaError::MalformedDataUrl.to_string());
    };

    let mime = &img.source.mime_type;

    match service.edit(payload, mime, prompt) {
        Ok(edited) => EditOutcome::success(&img.data_url, format!("data:{mime};base64,{edited}")),
        Err(e) => EditOutcome::failure(&img.data_url, e.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::result_store::MemoryResultStore;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Scripted {
        replies: Rc<RefCell<VecDeque<Result<String, ServiceError>>>>,
        calls: Rc<RefCell<Vec<(String, String, String)>>>,
    }

    impl Scripted {
        fn reply(self, r: Result<&str, &str>) -> Self {
            self.replies
                .borrow_mut()
                .push_back(r.map(str::to_string).map_err(|e| ServiceError::Remote(e.to_string())));
            self
        }

        fn next(&self, image: &str, mime: &str, prompt: &str) -> Result<String, ServiceError> {
            self.calls
                .borrow_mut()
                .push((image.to_string(), mime.to_string(), prompt.to_string()));
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Remote(String::new())))
        }
    }

    impl RemoteService for Scripted {
        fn edit(&self, image: &str, mime: &str, prompt: &str) -> Result<String, ServiceError> {
            self.next(image, mime, prompt)
        }

        fn analyze(&self, image: &str, mime: &str, prompt: &str) -> Result<String, ServiceError> {
            self.next(image, mime, prompt)
        }
    }

    fn image(name: &str, bytes: &[u8]) -> SelectedImage {
        media::encode_bytes(name, "image/png", bytes)
    }

    fn controller(service: &Scripted, store: &MemoryResultStore) -> Controller {
        Controller::new(Box::new(service.clone()), Box::new(store.clone()))
    }

    fn no_progress() -> impl FnMut(&Progress, &[EditOutcome]) {
        |_, _| {}
    }

    #[test]
    fn starts_with_persisted_results() {
        let stored = vec![EditOutcome::success("data:image/png;base64,AA==", "data:image/png;base64,AQ==")];
        let mut store = MemoryResultStore::new();
        store.save(&stored).unwrap();

        let c = controller(&Scripted::default(), &store);
        assert_eq!(c.outcomes(), stored.as_slice());
        assert_eq!(c.mode(), Mode::Edit);
        assert_eq!(c.run_state(), RunState::Idle);
    }

    #[test]
    fn analyze_mode_keeps_only_first_image() {
        let mut c = controller(&Scripted::default(), &MemoryResultStore::new());
        c.set_mode(Mode::Analyze);
        c.add_images(vec![image("a.png", b"a"), image("b.png", b"b")]);
        c.add_images(vec![image("c.png", b"c")]);

        let names: Vec<_> = c.images().iter().map(|i| i.source.name.as_str()).collect();
        assert_eq!(names, ["c.png"]);
    }

    #[test]
    fn edit_mode_appends() {
        let mut c = controller(&Scripted::default(), &MemoryResultStore::new());
        c.add_images(vec![image("a.png", b"a")]);
        c.add_images(vec![image("b.png", b"b"), image("c.png", b"c")]);
        assert_eq!(c.images().len(), 3);
    }

    #[test]
    fn edit_sends_payload_without_prefix() {
        let service = Scripted::default().reply(Ok("RURJVA=="));
        let store = MemoryResultStore::new();
        let mut c = controller(&service, &store);

        let img = image("a.png", b"abc");
        c.add_images(vec![img.clone()]);
        c.set_prompt("Make it brighter");
        c.generate(&mut no_progress()).unwrap();

        let calls = service.calls.borrow();
        assert_eq!(
            calls.as_slice(),
            [("YWJj".to_string(), "image/png".to_string(), "Make it brighter".to_string())]
        );
        assert_eq!(
            c.outcomes(),
            [EditOutcome::success(img.data_url, "data:image/png;base64,RURJVA==")]
        );
        assert_eq!(c.run_state(), RunState::Done);
    }

    #[test]
    fn missing_prompt_blocks_generate() {
        let service = Scripted::default();
        let mut c = controller(&service, &MemoryResultStore::new());
        c.add_images(vec![image("a.png", b"a")]);
        c.set_prompt("   ");

        assert!(!c.can_generate());
        let err = c.generate(&mut no_progress()).unwrap_err();
        assert!(matches!(err, CoreError::Precondition(ref m) if m == MISSING_PROMPT));
        assert_eq!(c.error(), Some(MISSING_PROMPT));
        assert_eq!(c.run_state(), RunState::Idle);
        assert!(service.calls.borrow().is_empty());
    }

    #[test]
    fn analyze_failure_goes_to_banner() {
        let service = Scripted::default().reply(Err("quota exhausted"));
        let store = MemoryResultStore::new();
        let mut c = controller(&service, &store);
        c.set_mode(Mode::Analyze);
        c.add_images(vec![image("a.png", b"a")]);
        c.set_prompt("Describe this image in detail");

        c.generate(&mut no_progress()).unwrap();

        assert_eq!(c.analysis(), None);
        assert_eq!(c.error(), Some("quota exhausted"));
        assert_eq!(c.run_state(), RunState::Done);
        assert_eq!(store.raw(), None);

        c.dismiss_error();
        assert_eq!(c.error(), None);
    }

    #[test]
    fn opaque_failure_uses_generic_message() {
        // no scripted reply: the fake fails with an empty message
        let service = Scripted::default();
        let mut c = controller(&service, &MemoryResultStore::new());
        c.add_images(vec![image("a.png", b"a")]);
        c.set_prompt("x");
        c.generate(&mut no_progress()).unwrap();

        assert_eq!(
            c.outcomes()[0].error.as_deref(),
            Some(crate::error::GENERIC_SERVICE_FAILURE)
        );
    }

    #[test]
    fn selection_changes_invalidate_results() {
        let service = Scripted::default().reply(Ok("AQ==")).reply(Ok("Ag=="));
        let store = MemoryResultStore::new();
        let mut c = controller(&service, &store);
        c.add_images(vec![image("a.png", b"a"), image("b.png", b"b")]);
        c.set_prompt("x");
        c.generate(&mut no_progress()).unwrap();
        assert!(store.raw().is_some());

        let removed = c.remove_image(0).unwrap();
        assert_eq!(removed.source.name, "a.png");
        assert!(c.outcomes().is_empty());
        assert_eq!(c.progress(), None);
        assert_eq!(c.run_state(), RunState::Idle);
        assert_eq!(store.raw(), None);
        assert_eq!(c.prompt(), "x");
    }

    #[test]
    fn remove_out_of_range_changes_nothing() {
        let mut c = controller(&Scripted::default(), &MemoryResultStore::new());
        c.add_images(vec![image("a.png", b"a")]);
        let err = c.remove_image(3).unwrap_err();
        assert!(matches!(err, CoreError::InvalidIndex { index: 3, len: 1 }));
        assert_eq!(c.images().len(), 1);
    }

    #[test]
    fn same_mode_is_a_no_op() {
        let mut c = controller(&Scripted::default(), &MemoryResultStore::new());
        c.add_images(vec![image("a.png", b"a")]);
        c.set_prompt("keep me");
        c.set_mode(Mode::Edit);
        assert_eq!(c.images().len(), 1);
        assert_eq!(c.prompt(), "keep me");
    }

    #[test]
    fn failed_selection_keeps_previous_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        std::fs::write(&good, b"png").unwrap();

        let mut c = controller(&Scripted::default(), &MemoryResultStore::new());
        c.select_files(&[&good]).unwrap();
        assert_eq!(c.images().len(), 1);

        let missing = dir.path().join("missing.png");
        assert!(c.select_files(&[&good, &missing]).is_err());
        assert_eq!(c.images().len(), 1);
        assert!(c.error().is_some());
    }

    #[test]
    fn view_reflects_state() {
        let mut c = controller(&Scripted::default(), &MemoryResultStore::new());
        c.add_images(vec![image("a.png", b"a")]);
        c.set_prompt("x");

        let view = c.view();
        assert!(view.can_generate);
        assert_eq!(view.images[0].index, 0);
        assert_eq!(view.images[0].source.name, "a.png");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["images"][0]["name"], "a.png");
        assert_eq!(json["images"][0]["mime_type"], "image/png");
        assert_eq!(json["mode"], "edit");
    }

    struct Panicking;

    impl RemoteService for Panicking {
        fn edit(&self, _: &str, _: &str, _: &str) -> Result<String, ServiceError> {
            panic!("service blew up");
        }

        fn analyze(&self, _: &str, _: &str, _: &str) -> Result<String, ServiceError> {
            panic!("service blew up");
        }
    }

    #[test]
    fn panicking_service_does_not_leave_run_stuck() {
        let mut c = Controller::new(Box::new(Panicking), Box::new(MemoryResultStore::new()));
        c.add_images(vec![image("a.png", b"a")]);
        c.set_prompt("x");

        c.generate(&mut no_progress()).unwrap();
        assert_eq!(c.run_state(), RunState::Done);
        assert_eq!(c.error(), Some(RUN_ABORTED));
        assert!(c.can_generate());

        let service = Scripted::default().reply(Ok("AQ=="));
        c.set_service(Box::new(service.clone()));
        c.generate(&mut no_progress()).unwrap();

        assert_eq!(c.run_state(), RunState::Done);
        assert_eq!(c.error(), None);
        assert_eq!(c.outcomes().len(), 1);
        assert!(c.outcomes()[0].edited.is_some());
    }

    #[test]
    fn persistence_failure_is_swallowed() {
        let store = MemoryResultStore::new().with_quota(8);
        let mut c = controller(&Scripted::default().reply(Ok("AQ==")), &store);
        c.add_images(vec![image("large.png", b"large")]);
        c.set_prompt("x");

        c.generate(&mut no_progress()).unwrap();

        assert_eq!(c.outcomes().len(), 1);
        assert_eq!(c.error(), None);
        assert_eq!(store.raw(), None);
    }
}
