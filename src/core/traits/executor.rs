use crate::core::domain::{ExecutionRequest, ExecutionResult};

/// Runs one piece of guest code. Guest faults come back in
/// `ExecutionResult::error_text`, never as an `Err`.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    async fn run(&self, request: &ExecutionRequest) -> ExecutionResult;
}
