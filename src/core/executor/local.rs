use std::sync::Arc;

use crate::{
    constants::{RUNTIME_NOT_LOADED, STDERR_PREFIX},
    core::{
        domain::{ExecutionRequest, ExecutionResult},
        executor::output::{LineFeed, OutputBuffer},
        loader::{RuntimeHandle, RuntimeLoader},
        traits::executor::Executor,
    },
};

/// Runs guest code inside the loaded runtime of the current session.
///
/// Executors sharing a loader also share the runtime's run lock.
#[derive(Debug)]
pub struct LocalExecutor {
    loader: Arc<RuntimeLoader>,
}

impl LocalExecutor {
    pub fn new(loader: Arc<RuntimeLoader>) -> Self {
        Self { loader }
    }

    async fn execute(runtime: &RuntimeHandle, request: &ExecutionRequest) -> ExecutionResult {
        let buffer = OutputBuffer::new();
        runtime.set_stdout(buffer.sink(None));
        runtime.set_stderr(buffer.sink(Some(STDERR_PREFIX)));
        runtime.set_stdin(
            (!request.stdin.is_empty()).then(|| LineFeed::new(&request.stdin).into_source()),
        );

        let mut error_text = None;
        for (path, content) in &request.files {
            if let Err(err) = runtime.write_file(path, content).await {
                tracing::warn!("Failed to write virtual file {}: {}", path, err);
                error_text = Some(err.to_string());
                break;
            }
        }

        if error_text.is_none() {
            if let Err(err) = runtime.run_code(&request.code).await {
                tracing::debug!("Guest code failed: {}", err);
                error_text = Some(err.to_string());
            }
        }

        if let Some(text) = &error_text {
            buffer.push(text.clone());
        }
        runtime.set_stdin(None);

        ExecutionResult {
            output_lines: buffer.take(),
            error_text,
        }
    }
}

#[async_trait::async_trait]
impl Executor for LocalExecutor {
    #[tracing::instrument(skip(self))]
    async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        let Some(runtime) = self.loader.current() else {
            tracing::warn!("Execution requested before the runtime was loaded");
            return ExecutionResult::failed(RUNTIME_NOT_LOADED);
        };

        let _guard = runtime.exclusive().await;
        Self::execute(&runtime, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;
    use crate::{
        core::{
            domain::{FileAssets, RuntimeDistribution},
            errors::RunCodeError,
            traits::runtime::{MockRuntime, Runtime},
        },
        stubs::runtime::{RuntimeHostStub, RuntimeStub},
    };

    async fn loaded(runtime: Arc<dyn Runtime>) -> Arc<RuntimeLoader> {
        let host = RuntimeHostStub::new(runtime, Duration::ZERO);
        let loader = Arc::new(RuntimeLoader::new(
            Arc::new(host),
            RuntimeDistribution {
                loader: "stub".to_string(),
                index: "stub".to_string(),
                version: None,
            },
        ));
        loader.ensure_ready().await.unwrap();
        loader
    }

    #[tokio::test]
    async fn test_not_loaded_fails_immediately() {
        let host = RuntimeHostStub::new(Arc::new(RuntimeStub::new()), Duration::from_secs(60));
        let loader = Arc::new(RuntimeLoader::new(
            Arc::new(host),
            RuntimeDistribution {
                loader: "stub".to_string(),
                index: "stub".to_string(),
                version: None,
            },
        ));
        let executor = LocalExecutor::new(loader);

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            executor.run(&ExecutionRequest::new("print hi")),
        )
        .await
        .expect("run must not wait for the runtime");

        assert!(result.output_lines.is_empty());
        assert_eq!(result.error_text.as_deref(), Some("runtime not loaded"));
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_keep_their_order() {
        let executor = LocalExecutor::new(loaded(Arc::new(RuntimeStub::new())).await);

        let result = executor
            .run(&ExecutionRequest::new("print one\neprint warning\nprint two"))
            .await;

        assert_eq!(result.output_lines, vec!["one", "Error: warning", "two"]);
        assert_eq!(result.error_text, None);
    }

    #[tokio::test]
    async fn test_output_does_not_leak_between_runs() {
        let executor = LocalExecutor::new(loaded(Arc::new(RuntimeStub::new())).await);

        let first = executor
            .run(&ExecutionRequest::new("print from-first\nraise Boom"))
            .await;
        let second = executor
            .run(&ExecutionRequest::new("print from-second"))
            .await;

        assert_eq!(first.output_lines, vec!["from-first", "Boom"]);
        assert_eq!(first.error_text.as_deref(), Some("Boom"));
        assert_eq!(second.output_lines, vec!["from-second"]);
        assert_eq!(second.error_text, None);
    }

    #[tokio::test]
    async fn test_stdin_exhaustion_is_eof() {
        let executor = LocalExecutor::new(loaded(Arc::new(RuntimeStub::new())).await);

        let result = executor
            .run(&ExecutionRequest::new("echo\necho\necho").with_stdin("a\nb"))
            .await;

        assert_eq!(result.output_lines[..2], ["a", "b"]);
        assert_eq!(
            result.error_text.as_deref(),
            Some("EOFError: EOF when reading a line")
        );
    }

    #[tokio::test]
    async fn test_empty_stdin_installs_no_source() {
        let executor = LocalExecutor::new(loaded(Arc::new(RuntimeStub::new())).await);

        let result = executor
            .run(&ExecutionRequest::new("echo").with_stdin(""))
            .await;

        assert!(result.error_text.unwrap().starts_with("EOFError"));
    }

    #[tokio::test]
    async fn test_files_are_written_before_running() {
        let runtime = Arc::new(RuntimeStub::new());
        let executor = LocalExecutor::new(loaded(runtime.clone()).await);
        let files = FileAssets::from([("data.txt".to_string(), "1 2\n3 4".to_string())]);

        let result = executor
            .run(&ExecutionRequest::new("cat data.txt").with_files(files))
            .await;

        assert_eq!(result.output_lines, vec!["1 2", "3 4"]);
        assert_eq!(runtime.file("data.txt").as_deref(), Some("1 2\n3 4"));
    }

    #[tokio::test]
    async fn test_failed_file_write_skips_execution() {
        let mut runtime = MockRuntime::new();
        runtime.expect_set_stdout().return_const(());
        runtime.expect_set_stderr().return_const(());
        runtime.expect_set_stdin().return_const(());
        runtime
            .expect_write_file()
            .returning(|_, _| Err(RunCodeError::Host("disk full".to_string())));
        runtime.expect_run_code().never();
        let executor = LocalExecutor::new(loaded(Arc::new(runtime)).await);
        let files = FileAssets::from([("a.txt".to_string(), "x".to_string())]);

        let result = executor
            .run(&ExecutionRequest::new("print x").with_files(files))
            .await;

        assert_eq!(
            result.error_text.as_deref(),
            Some("runtime failure: disk full")
        );
        assert_eq!(result.output_lines, vec!["runtime failure: disk full"]);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_serialized() {
        let runtime = Arc::new(RuntimeStub::new());
        let executor = Arc::new(LocalExecutor::new(loaded(runtime.clone()).await));

        let results = join_all((0..4).map(|i| {
            let executor = executor.clone();
            async move {
                executor
                    .run(&ExecutionRequest::new(&format!("sleep 10\nprint {}", i)))
                    .await
            }
        }))
        .await;

        assert!(!runtime.overlapped());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.output_lines, vec![i.to_string()]);
        }
    }

    #[tokio::test]
    async fn test_executors_sharing_a_runtime_never_overlap() {
        let runtime = Arc::new(RuntimeStub::new());
        let loader = loaded(runtime.clone()).await;
        let first = LocalExecutor::new(loader.clone());
        let second = LocalExecutor::new(loader);

        let request_a = ExecutionRequest::new("sleep 20\nprint A");
        let request_b = ExecutionRequest::new("print B");
        let (a, b) = tokio::join!(first.run(&request_a), second.run(&request_b));

        assert!(!runtime.overlapped());
        assert_eq!(a.output_lines, vec!["A"]);
        assert_eq!(b.output_lines, vec!["B"]);
    }
}
