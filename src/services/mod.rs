pub mod ai;
pub mod ai_types;
pub mod download;
pub mod media;
pub mod prompts;
pub mod result_store;
pub mod workflow;
