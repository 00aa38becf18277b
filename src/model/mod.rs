pub mod image;
pub mod outcome;
pub mod workflow;
