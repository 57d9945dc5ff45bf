use std::sync::Arc;

use tokio::sync::{
    mpsc::{Receiver, Sender, channel},
    oneshot,
};

use crate::{
    constants::WORKER_STOPPED,
    core::{
        domain::{ExecutionRequest, ExecutionResult},
        traits::executor::Executor,
    },
};

#[derive(Debug)]
struct Job {
    request: ExecutionRequest,
    reply_tx: oneshot::Sender<ExecutionResult>,
}

/// Hosts an executor behind a worker task.
///
/// All communication is message passing; jobs are handled one at a time in
/// the order they were sent.
#[derive(Clone, Debug)]
pub struct WorkerExecutor {
    job_tx: Sender<Job>,
}

impl WorkerExecutor {
    pub fn spawn(inner: Arc<dyn Executor>) -> Self {
        let (job_tx, job_rx) = channel::<Job>(32);
        handle_jobs(job_rx, inner);
        Self { job_tx }
    }
}

#[tracing::instrument]
fn handle_jobs(mut job_rx: Receiver<Job>, inner: Arc<dyn Executor>) {
    tokio::spawn(async move {
        while let Some(job) = job_rx.recv().await {
            let result = inner.run(&job.request).await;
            if job.reply_tx.send(result).is_err() {
                tracing::debug!("Caller went away before the job finished");
            }
        }
        tracing::debug!("Worker job channel closed");
    });
}

#[async_trait::async_trait]
impl Executor for WorkerExecutor {
    #[tracing::instrument(skip(self))]
    async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            request: request.clone(),
            reply_tx,
        };

        if self.job_tx.send(job).await.is_err() {
            tracing::error!("Worker is not accepting jobs");
            return ExecutionResult::failed(WORKER_STOPPED);
        }

        reply_rx.await.unwrap_or_else(|_| {
            tracing::error!("Worker dropped the job without replying");
            ExecutionResult::failed(WORKER_STOPPED)
        })
    }
}
