use std::{str::FromStr, sync::Arc};

use crate::core::{
    executor::{local::LocalExecutor, worker::WorkerExecutor},
    loader::RuntimeLoader,
    traits::executor::Executor,
};

pub mod local;
pub mod output;
pub mod worker;

/// How the runtime is hosted relative to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutorKind {
    #[default]
    InPage,
    Worker,
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inpage" | "in-page" | "local" => Ok(ExecutorKind::InPage),
            "worker" => Ok(ExecutorKind::Worker),
            other => Err(format!("unknown executor kind: {}", other)),
        }
    }
}

pub fn build_executor(kind: ExecutorKind, loader: Arc<RuntimeLoader>) -> Arc<dyn Executor> {
    let local = Arc::new(LocalExecutor::new(loader));
    match kind {
        ExecutorKind::InPage => local,
        ExecutorKind::Worker => Arc::new(WorkerExecutor::spawn(local)),
    }
}
