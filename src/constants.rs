pub const RUN_ENDPOINT: &str = "/execution/stream";
pub const SUBMIT_ENDPOINT: &str = "/execution/submit-stream";
pub const ANSWERS_ENDPOINT: &str = "/answers";
pub const QUESTIONS_ENDPOINT: &str = "/questions";

pub const STDERR_PREFIX: &str = "Error: ";
pub const RUNTIME_NOT_LOADED: &str = "runtime not loaded";
pub const WORKER_STOPPED: &str = "execution worker stopped";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_RUNTIME_VERSION: &str = "Python 3.";
