use clap::Parser;

use crate::{
    constants::{DEFAULT_BACKEND_URL, DEFAULT_INTERPRETER, DEFAULT_RUNTIME_VERSION},
    core::{domain::RuntimeDistribution, executor::ExecutorKind},
};

/// Process configuration. Every field is a flag with an `EXAM_*` env fallback.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Execution backend URL
    #[arg(long, env = "EXAM_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    /// Python interpreter used for local runs
    #[arg(long, env = "EXAM_PYTHON", default_value = DEFAULT_INTERPRETER)]
    pub interpreter: String,

    /// Version prefix the interpreter must report; empty disables the check
    #[arg(long, env = "EXAM_RUNTIME_VERSION", default_value = DEFAULT_RUNTIME_VERSION)]
    pub runtime_version: String,

    /// Root for runtime scratch directories [default: <tmp>/exam-runner]
    #[arg(long, env = "EXAM_RUNTIME_DIR")]
    pub runtime_dir: Option<String>,

    /// Executor hosting: inpage or worker
    #[arg(long, env = "EXAM_EXECUTOR", default_value = "inpage")]
    pub executor: ExecutorKind,
}

impl Config {
    pub fn distribution(&self) -> RuntimeDistribution {
        let index = self.runtime_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir()
                .join("exam-runner")
                .to_string_lossy()
                .into_owned()
        });
        RuntimeDistribution {
            loader: self.interpreter.clone(),
            index,
            version: Some(self.runtime_version.clone()).filter(|v| !v.is_empty()),
        }
    }
}
