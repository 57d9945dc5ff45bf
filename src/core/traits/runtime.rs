use std::sync::Arc;

use crate::core::errors::{RunCodeError, RuntimeLoadError};

/// Receives one batch (line) of guest output.
pub type OutputHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Pulled by the guest on every read-line call; `None` means EOF.
pub type StdinSource = Box<dyn FnMut() -> Option<String> + Send>;

/// A loaded language runtime. Single interpreter instance, not reentrant.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Runtime: std::fmt::Debug + Send + Sync {
    fn set_stdout(&self, handler: OutputHandler);

    fn set_stderr(&self, handler: OutputHandler);

    fn set_stdin(&self, source: Option<StdinSource>);

    async fn write_file(&self, path: &str, content: &str) -> Result<(), RunCodeError>;

    async fn run_code(&self, code: &str) -> Result<(), RunCodeError>;
}

/// The place a runtime is bootstrapped into (a page, a process, a worker).
#[mockall::automock]
#[async_trait::async_trait]
pub trait RuntimeHost: std::fmt::Debug + Send + Sync {
    /// Whether the bootstrap entrypoint has already been brought in.
    fn entrypoint_present(&self) -> bool;

    async fn inject_loader(&self, loader: &str) -> Result<(), RuntimeLoadError>;

    async fn initialize(&self, index: &str) -> Result<Arc<dyn Runtime>, RuntimeLoadError>;
}
