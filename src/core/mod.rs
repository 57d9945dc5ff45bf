pub mod domain;
pub mod errors;
pub mod executor;
pub mod loader;
pub mod pipeline;
pub mod traits;
