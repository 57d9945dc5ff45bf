use std::collections::BTreeMap;
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use crate::core::{
    errors::{RunCodeError, RuntimeLoadError},
    traits::runtime::{OutputHandler, Runtime, RuntimeHost, StdinSource},
};

/// A toy guest language, one command per line:
///
/// * `print <text>` / `eprint <text>` write to stdout / stderr
/// * `echo` reads a line and prints it
/// * `sum` reads a line of integers and prints their sum
/// * `cat <file>` prints a file from the virtual filesystem
/// * `raise <message>` aborts with a guest error
/// * `sleep <ms>` yields for a while
///
/// Reading past the end of stdin raises `EOFError`, the way an interpreter does.
#[derive(Default)]
pub struct RuntimeStub {
    stdout: Mutex<Option<OutputHandler>>,
    stderr: Mutex<Option<OutputHandler>>,
    stdin: Mutex<Option<StdinSource>>,
    files: Mutex<BTreeMap<String, String>>,
    running: AtomicBool,
    overlapped: AtomicBool,
}

impl std::fmt::Debug for RuntimeStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeStub")
            .field("files", &*lock(&self.files))
            .finish_non_exhaustive()
    }
}

impl RuntimeStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        lock(&self.files).get(path).cloned()
    }

    /// Whether two evaluations ever ran at the same time.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn emit(&self, slot: &Mutex<Option<OutputHandler>>, line: &str) {
        let handler = lock(slot).clone();
        if let Some(handler) = handler {
            handler(line);
        }
    }

    fn read_line(&self) -> Result<String, RunCodeError> {
        let mut stdin = lock(&self.stdin);
        stdin
            .as_mut()
            .and_then(|source| source())
            .ok_or_else(|| RunCodeError::Guest("EOFError: EOF when reading a line".to_string()))
    }

    async fn exec_line(&self, line: &str) -> Result<(), RunCodeError> {
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "print" => self.emit(&self.stdout, arg),
            "eprint" => self.emit(&self.stderr, arg),
            "echo" => {
                let line = self.read_line()?;
                self.emit(&self.stdout, &line);
            }
            "sum" => {
                let line = self.read_line()?;
                let sum = line
                    .split_whitespace()
                    .map(|n| n.parse::<i64>())
                    .sum::<Result<i64, _>>()
                    .map_err(|e| RunCodeError::Guest(format!("ValueError: {}", e)))?;
                self.emit(&self.stdout, &sum.to_string());
            }
            "cat" => {
                let content = self.file(arg).ok_or_else(|| {
                    RunCodeError::Guest(format!(
                        "FileNotFoundError: No such file or directory: '{}'",
                        arg
                    ))
                })?;
                for line in content.lines() {
                    self.emit(&self.stdout, line);
                }
            }
            "raise" => return Err(RunCodeError::Guest(arg.to_string())),
            "sleep" => {
                let ms = arg.parse().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            other => {
                return Err(RunCodeError::Guest(format!(
                    "SyntaxError: unknown command '{}'",
                    other
                )));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Runtime for RuntimeStub {
    fn set_stdout(&self, handler: OutputHandler) {
        *lock(&self.stdout) = Some(handler);
    }

    fn set_stderr(&self, handler: OutputHandler) {
        *lock(&self.stderr) = Some(handler);
    }

    fn set_stdin(&self, source: Option<StdinSource>) {
        *lock(&self.stdin) = source;
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), RunCodeError> {
        lock(&self.files).insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn run_code(&self, code: &str) -> Result<(), RunCodeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let mut result = Ok(());
        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            result = self.exec_line(line).await;
            if result.is_err() {
                break;
            }
        }
        self.running.store(false, Ordering::SeqCst);
        result
    }
}

/// Hands out a prepared runtime after a delay and counts bootstrap steps.
#[derive(Debug)]
pub struct RuntimeHostStub {
    runtime: Arc<dyn Runtime>,
    delay: Duration,
    entrypoint: AtomicBool,
    injected: AtomicUsize,
    initialized: AtomicUsize,
}

impl RuntimeHostStub {
    pub fn new(runtime: Arc<dyn Runtime>, delay: Duration) -> Self {
        Self {
            runtime,
            delay,
            entrypoint: AtomicBool::new(false),
            injected: AtomicUsize::new(0),
            initialized: AtomicUsize::new(0),
        }
    }

    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RuntimeHost for RuntimeHostStub {
    fn entrypoint_present(&self) -> bool {
        self.entrypoint.load(Ordering::SeqCst)
    }

    #[tracing::instrument]
    async fn inject_loader(&self, loader: &str) -> Result<(), RuntimeLoadError> {
        self.injected.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.entrypoint.store(true, Ordering::SeqCst);
        Ok(())
    }

    #[tracing::instrument]
    async fn initialize(&self, index: &str) -> Result<Arc<dyn Runtime>, RuntimeLoadError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.runtime.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
