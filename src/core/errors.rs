use thiserror::Error;

/// Bootstrap failures. A failed load is terminal for the loader that saw it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeLoadError {
    #[error("failed to load runtime from {loader}: {msg}")]
    Loader { loader: String, msg: String },
    #[error("runtime initializer failed: {msg}")]
    Initializer { msg: String },
    #[error("runtime version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

/// Failures raised by the guest evaluator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunCodeError {
    /// The guest program raised (syntax error, uncaught exception, non-zero exit).
    #[error("{0}")]
    Guest(String),
    /// The host could not drive the evaluator at all.
    #[error("runtime failure: {0}")]
    Host(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Server Error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Network Error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("another stream is already in flight on this client")]
    Busy,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}
