use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    process::Command,
};
use uuid::Uuid;

use crate::core::{
    errors::{RunCodeError, RuntimeLoadError},
    traits::runtime::{OutputHandler, Runtime, RuntimeHost, StdinSource},
};

const MAIN_FILE: &str = ".exam_main.py";

const STDOUT_TAG: &str = "\u{1}o:";
const STDERR_TAG: &str = "\u{1}e:";
const TRACEBACK_TAG: &str = "\u{1}t:";

/// Runs the guest module with both streams multiplexed onto stdout.
///
/// Every complete line is written as `\x01<tag>:<line>`, where the tag is `o`
/// for stdout, `e` for stderr and `t` for the uncaught exception report, so
/// the host sees lines in the order the guest produced them. Partial lines are
/// flushed before the exception report. The driver's own frame is dropped
/// from tracebacks.
const DRIVER: &str = r#"
import sys, traceback
_out = sys.stdout

def _emit(tag, line):
    _out.write("\x01" + tag + ":" + line + "\n")
    _out.flush()

class _Tagged:
    encoding = "utf-8"
    errors = "strict"

    def __init__(self, tag):
        self._tag = tag
        self._pending = ""

    def write(self, text):
        text = str(text)
        *lines, self._pending = (self._pending + text).split("\n")
        for line in lines:
            _emit(self._tag, line)
        return len(text)

    def writelines(self, lines):
        for line in lines:
            self.write(line)

    def flush(self):
        pass

    def isatty(self):
        return False

    def close_line(self):
        if self._pending:
            _emit(self._tag, self._pending)
            self._pending = ""

_stdout = sys.stdout = _Tagged("o")
_stderr = sys.stderr = _Tagged("e")

def _finish():
    _stdout.close_line()
    _stderr.close_line()

with open(sys.argv[1], encoding="utf-8") as _f:
    _source = _f.read()
try:
    exec(compile(_source, "<exec>", "exec"), {"__name__": "__main__"})
except SystemExit as _exit:
    _finish()
    if _exit.code not in (None, 0):
        _emit("t", "SystemExit: " + str(_exit.code))
        sys.exit(1)
except BaseException as _err:
    _finish()
    _tb = _err.__traceback__.tb_next if _err.__traceback__ else None
    for _chunk in traceback.format_exception(type(_err), _err, _tb):
        for _line in _chunk.rstrip("\n").split("\n"):
            _emit("t", _line)
    sys.exit(1)
else:
    _finish()
"#;

/// Bootstraps Python runtimes backed by a local interpreter.
///
/// The loader is the interpreter command, probed once; the index is the root
/// under which every runtime gets its own scratch directory.
#[derive(Debug)]
pub struct NativeHost {
    required_version: Option<String>,
    interpreter: OnceLock<String>,
}

impl NativeHost {
    pub fn new(required_version: Option<String>) -> Self {
        Self {
            required_version,
            interpreter: OnceLock::new(),
        }
    }
}

#[async_trait::async_trait]
impl RuntimeHost for NativeHost {
    fn entrypoint_present(&self) -> bool {
        self.interpreter.get().is_some()
    }

    #[tracing::instrument(skip(self))]
    async fn inject_loader(&self, loader: &str) -> Result<(), RuntimeLoadError> {
        let out = Command::new(loader)
            .arg("--version")
            .output()
            .await
            .map_err(|e| RuntimeLoadError::Loader {
                loader: loader.to_string(),
                msg: e.to_string(),
            })?;

        if !out.status.success() {
            return Err(RuntimeLoadError::Loader {
                loader: loader.to_string(),
                msg: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        // Old interpreters print the version on stderr.
        let version = [out.stdout, out.stderr]
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .find(|text| !text.is_empty())
            .unwrap_or_default();
        if let Some(expected) = &self.required_version {
            if !version.starts_with(expected.as_str()) {
                return Err(RuntimeLoadError::VersionMismatch {
                    expected: expected.clone(),
                    found: version,
                });
            }
        }

        tracing::info!("Using interpreter {} ({})", loader, version);
        let _ = self.interpreter.set(loader.to_string());
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn initialize(&self, index: &str) -> Result<Arc<dyn Runtime>, RuntimeLoadError> {
        let interpreter = self
            .interpreter
            .get()
            .ok_or_else(|| RuntimeLoadError::Initializer {
                msg: "interpreter was not loaded".to_string(),
            })?;

        let dir = Path::new(index).join(format!("runtime_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RuntimeLoadError::Initializer { msg: e.to_string() })?;

        Ok(Arc::new(NativeRuntime::new(interpreter, dir)))
    }
}

/// One interpreter "instance": a scratch directory that acts as the virtual
/// filesystem, plus the handlers bound for the next evaluation.
#[derive(Default)]
pub struct NativeRuntime {
    interpreter: PathBuf,
    dir: PathBuf,
    stdout: Mutex<Option<OutputHandler>>,
    stderr: Mutex<Option<OutputHandler>>,
    stdin: Mutex<Option<StdinSource>>,
}

impl std::fmt::Debug for NativeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRuntime")
            .field("interpreter", &self.interpreter)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl NativeRuntime {
    pub fn new<T, U>(interpreter: T, dir: U) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        NativeRuntime {
            interpreter: interpreter.as_ref().into(),
            dir: dir.as_ref().into(),
            ..Default::default()
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pulls the whole line feed up front; the guest sees EOF after the last line.
    fn drain_stdin(&self) -> String {
        let mut text = String::new();
        if let Some(source) = lock(&self.stdin).as_mut() {
            while let Some(line) = source() {
                text.push_str(&line);
                text.push('\n');
            }
        }
        text
    }

    fn emit(slot: &Mutex<Option<OutputHandler>>, line: &str) {
        let handler = lock(slot).clone();
        if let Some(handler) = handler {
            handler(line);
        }
    }
}

#[async_trait::async_trait]
impl Runtime for NativeRuntime {
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
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RunCodeError::Host(format!("invalid file path: {}", path)));
        }
        let target = self.dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RunCodeError::Host(e.to_string()))?;
        }
        fs::write(&target, content)
            .await
            .map_err(|e| RunCodeError::Host(e.to_string()))
    }

    #[tracing::instrument(skip(self, code))]
    async fn run_code(&self, code: &str) -> Result<(), RunCodeError> {
        let main_path = self.dir.join(MAIN_FILE);
        fs::write(&main_path, code)
            .await
            .map_err(|e| RunCodeError::Host(e.to_string()))?;

        let mut child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(DRIVER)
            .arg(&main_path)
            .current_dir(&self.dir)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunCodeError::Host(format!("failed to spawn interpreter: {}", e)))?;

        let stdin_text = self.drain_stdin();
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                // A guest that exits without reading closes the pipe; that is fine.
                if let Err(e) = stdin.write_all(stdin_text.as_bytes()).await {
                    tracing::debug!("Guest stopped reading stdin: {}", e);
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunCodeError::Host("no stdout pipe".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunCodeError::Host("no stderr pipe".to_string()))?;
        // Only interpreter-level failures land on the real stderr.
        let interpreter_stderr = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut traceback = Vec::new();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read guest output: {}", e);
                    break;
                }
            };
            match GuestLine::parse(&line) {
                GuestLine::Stdout(text) => Self::emit(&self.stdout, text),
                GuestLine::Stderr(text) => Self::emit(&self.stderr, text),
                GuestLine::Traceback(text) => traceback.push(text.to_string()),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| RunCodeError::Host(e.to_string()))?;
        let interpreter_stderr = interpreter_stderr.await.unwrap_or_default();

        if !traceback.is_empty() {
            return Err(RunCodeError::Guest(traceback.join("\n").trim_end().to_string()));
        }
        if !status.success() {
            return Err(RunCodeError::Host(format!(
                "interpreter exited with {}: {}",
                status,
                interpreter_stderr.trim()
            )));
        }
        Ok(())
    }
}

/// One line of the driver's multiplexed output.
#[derive(Debug, PartialEq, Eq)]
enum GuestLine<'a> {
    Stdout(&'a str),
    Stderr(&'a str),
    Traceback(&'a str),
}

impl<'a> GuestLine<'a> {
    /// Untagged lines come from writes that bypassed `sys.stdout`.
    fn parse(line: &'a str) -> Self {
        if let Some(text) = line.strip_prefix(STDOUT_TAG) {
            GuestLine::Stdout(text)
        } else if let Some(text) = line.strip_prefix(STDERR_TAG) {
            GuestLine::Stderr(text)
        } else if let Some(text) = line.strip_prefix(TRACEBACK_TAG) {
            GuestLine::Traceback(text)
        } else {
            GuestLine::Stdout(line)
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
