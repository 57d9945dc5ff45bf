pub mod events;
pub mod files;
pub mod frames;
pub mod progress;
pub mod samples;
pub mod streaming;
pub mod submission;
