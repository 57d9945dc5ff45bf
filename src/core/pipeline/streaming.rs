use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde_json::json;
use tokio::sync::watch;
use tokio_stream::StreamExt;

use crate::{
    constants::{RUN_ENDPOINT, SUBMIT_ENDPOINT},
    core::{
        domain::{CaseOutcome, SubmissionOutcome},
        errors::StreamError,
        pipeline::{
            events::{CaseSignal, MessageLevel, StreamEvent, SystemMessage},
            frames::FrameDecoder,
        },
        traits::transport::StreamTransport,
    },
};

/// Submissions never echo raw output: grading output may include hidden cases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    Run,
    Submit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    pub mode: StreamMode,
    pub endpoint: String,
    pub body: serde_json::Value,
}

impl StreamRequest {
    pub fn run(code: &str, input: &str) -> Self {
        Self {
            mode: StreamMode::Run,
            endpoint: RUN_ENDPOINT.to_string(),
            body: json!({ "code": code, "input": input }),
        }
    }

    pub fn submit(code: &str, question_id: &str) -> Self {
        Self {
            mode: StreamMode::Submit,
            endpoint: SUBMIT_ENDPOINT.to_string(),
            body: json!({ "code": code, "questionId": question_id }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// A `completed` event arrived.
    Completed,
    /// The transport failed or the server sent an `error` event.
    Failed,
    /// The body ended before any terminal event.
    Incomplete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamOutcome {
    pub output: String,
    pub error: Option<String>,
    pub passed: Option<bool>,
    pub results: Option<Vec<CaseOutcome>>,
    pub completion: Completion,
}

impl StreamOutcome {
    /// The authoritative result, present only once the stream completed.
    pub fn submission(&self) -> Option<SubmissionOutcome> {
        if self.completion != Completion::Completed {
            return None;
        }
        let results = self.results.clone().unwrap_or_default();
        let passed = self
            .passed
            .unwrap_or_else(|| !results.is_empty() && results.iter().all(|r| r.passed));
        Some(SubmissionOutcome { passed, results })
    }
}

/// Consumes the backend's execution stream.
///
/// Progress is published on two watch channels while the call runs; both
/// are cleared when a new call starts. One call at a time per client.
#[derive(Debug)]
pub struct RemoteStreamClient {
    transport: Arc<dyn StreamTransport>,
    system_tx: watch::Sender<Vec<SystemMessage>>,
    output_tx: watch::Sender<Vec<String>>,
    state_tx: watch::Sender<StreamState>,
    in_flight: AtomicBool,
}

impl RemoteStreamClient {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            transport,
            system_tx: watch::channel(Vec::new()).0,
            output_tx: watch::channel(Vec::new()).0,
            state_tx: watch::channel(StreamState::Idle).0,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn system_messages(&self) -> watch::Receiver<Vec<SystemMessage>> {
        self.system_tx.subscribe()
    }

    pub fn execution_output(&self) -> watch::Receiver<Vec<String>> {
        self.output_tx.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    pub async fn run(&self, code: &str, input: &str) -> Result<StreamOutcome, StreamError> {
        self.stream(StreamRequest::run(code, input)).await
    }

    pub async fn submit(
        &self,
        code: &str,
        question_id: &str,
    ) -> Result<StreamOutcome, StreamError> {
        self.stream(StreamRequest::submit(code, question_id)).await
    }

    pub async fn stream(&self, request: StreamRequest) -> Result<StreamOutcome, StreamError> {
        Ok(self.reserve()?.stream(request).await)
    }

    /// Claims the client for one stream, failing fast if another is in flight.
    pub fn reserve(&self) -> Result<StreamSlot<'_>, StreamError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Rejected stream: another one is in flight");
            return Err(StreamError::Busy);
        }
        Ok(StreamSlot { client: self })
    }

    #[tracing::instrument(
        skip(self, request),
        fields(endpoint = %request.endpoint, mode = ?request.mode, id = %uuid::Uuid::new_v4())
    )]
    async fn run_stream(&self, request: StreamRequest) -> StreamOutcome {
        self.system_tx.send_replace(Vec::new());
        self.output_tx.send_replace(Vec::new());
        self.state_tx.send_replace(StreamState::Streaming);

        let outcome = self.consume(&request).await;

        let state = match outcome.completion {
            Completion::Failed => StreamState::Failed,
            Completion::Completed | Completion::Incomplete => StreamState::Done,
        };
        self.state_tx.send_replace(state);
        tracing::info!(
            "Stream finished: completion={:?}, passed={:?}",
            outcome.completion,
            outcome.passed
        );
        outcome
    }

    async fn consume(&self, request: &StreamRequest) -> StreamOutcome {
        let mut acc = Accumulator::new(request.mode);

        let mut body = match self.transport.open(&request.endpoint, &request.body).await {
            Ok(body) => body,
            Err(err) => {
                tracing::error!("Failed to open stream: {}", err);
                self.terminal_error(&mut acc, &err.to_string());
                return acc.finish(Completion::Failed);
            }
        };

        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::error!("Stream interrupted: {}", err);
                    self.terminal_error(&mut acc, &err.to_string());
                    return acc.finish(Completion::Failed);
                }
            };

            for payload in decoder.push(&chunk) {
                if let Some(completion) = self.handle_payload(&mut acc, &payload) {
                    return acc.finish(completion);
                }
            }
        }

        if let Some(payload) = decoder.finish() {
            if let Some(completion) = self.handle_payload(&mut acc, &payload) {
                return acc.finish(completion);
            }
        }

        tracing::warn!("Stream ended without a terminal event");
        acc.finish(Completion::Incomplete)
    }

    /// Applies one frame; returns the completion once a terminal event arrives.
    fn handle_payload(&self, acc: &mut Accumulator, payload: &str) -> Option<Completion> {
        let event = match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!("Dropping malformed frame {:?}: {}", payload, err);
                return None;
            }
        };
        tracing::debug!("Stream event: {:?}", event);

        match event {
            StreamEvent::Queued { message } => {
                self.system(SystemMessage::new(
                    message.as_deref().unwrap_or("Queued"),
                    MessageLevel::Info,
                ));
                None
            }
            StreamEvent::Processing {
                message,
                test_index,
            } => {
                let mut msg = SystemMessage::new(
                    message.as_deref().unwrap_or("Processing"),
                    MessageLevel::Info,
                );
                if let Some(index) = test_index {
                    msg = msg.with_signal(CaseSignal::Running(index));
                }
                self.system(msg);
                None
            }
            StreamEvent::TestCaseCompleted {
                message,
                test_index,
                data,
            } => {
                let index = test_index.or(data.test_index);
                let text = message.unwrap_or_else(|| match index {
                    Some(index) => format!(
                        "Test Case {} {}",
                        index + 1,
                        if data.passed { "passed" } else { "failed" }
                    ),
                    None => "Test case completed".to_string(),
                });
                let level = if data.passed {
                    MessageLevel::Success
                } else {
                    MessageLevel::Error
                };
                let mut msg = SystemMessage::new(&text, level);
                if let Some(index) = index {
                    msg = msg.with_signal(CaseSignal::Finished {
                        index,
                        passed: data.passed,
                    });
                }
                self.system(msg);
                None
            }
            StreamEvent::Completed { message, data } => {
                if let Some(output) = data.output.filter(|o| !o.is_empty()) {
                    if acc.mode == StreamMode::Run {
                        self.output_tx.send_modify(|lines| lines.push(output.clone()));
                    }
                    acc.output.push_str(&output);
                }
                acc.passed = data.passed;
                acc.results = data
                    .results
                    .map(|results| results.into_iter().map(Into::into).collect());

                if let Some(error) = data.error {
                    self.terminal_error(acc, &error);
                }
                let summary = message.unwrap_or_else(|| acc.summary());
                let level = match (&acc.error, acc.passed) {
                    (Some(_), _) | (None, Some(false)) => MessageLevel::Error,
                    _ => MessageLevel::Success,
                };
                self.system(SystemMessage::new(&summary, level));
                Some(Completion::Completed)
            }
            StreamEvent::Error { message, data } => {
                let error = message
                    .or_else(|| data.and_then(|d| d.error))
                    .unwrap_or_else(|| "Unknown error".to_string());
                self.terminal_error(acc, &error);
                Some(Completion::Failed)
            }
        }
    }

    /// Errors always reach the progress view; the console sees them only on runs.
    fn terminal_error(&self, acc: &mut Accumulator, error: &str) {
        self.system(SystemMessage::new(&format!("Error: {}", error), MessageLevel::Error));
        if acc.mode == StreamMode::Run {
            self.output_tx.send_modify(|lines| lines.push(format!("Error: {}", error)));
        }
        acc.error = Some(error.to_string());
    }

    fn system(&self, message: SystemMessage) {
        self.system_tx.send_modify(|messages| messages.push(message));
    }
}

/// Exclusive right to run one stream on a client; released on drop.
#[derive(Debug)]
pub struct StreamSlot<'a> {
    client: &'a RemoteStreamClient,
}

impl StreamSlot<'_> {
    pub async fn stream(self, request: StreamRequest) -> StreamOutcome {
        self.client.run_stream(request).await
    }
}

impl Drop for StreamSlot<'_> {
    fn drop(&mut self) {
        self.client.in_flight.store(false, Ordering::Release);
    }
}

struct Accumulator {
    mode: StreamMode,
    output: String,
    error: Option<String>,
    passed: Option<bool>,
    results: Option<Vec<CaseOutcome>>,
}

impl Accumulator {
    fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            output: String::new(),
            error: None,
            passed: None,
            results: None,
        }
    }

    fn summary(&self) -> String {
        match (self.mode, &self.results, self.passed) {
            (StreamMode::Run, _, _) => "Execution completed".to_string(),
            (StreamMode::Submit, Some(results), _) => format!(
                "Passed {}/{} test cases",
                results.iter().filter(|r| r.passed).count(),
                results.len()
            ),
            (StreamMode::Submit, None, Some(true)) => "All test cases passed".to_string(),
            (StreamMode::Submit, None, Some(false)) => "Submission failed".to_string(),
            (StreamMode::Submit, None, None) => "Submission completed".to_string(),
        }
    }

    fn finish(self, completion: Completion) -> StreamOutcome {
        StreamOutcome {
            output: self.output,
            error: self.error,
            passed: self.passed,
            results: self.results,
            completion,
        }
    }
}
