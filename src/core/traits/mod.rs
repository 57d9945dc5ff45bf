pub mod exam_api;
pub mod executor;
pub mod runtime;
pub mod transport;
