use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{
    errors::{ApiError, StreamError},
    pipeline::{
        progress::SubmissionProgress,
        streaming::{RemoteStreamClient, StreamOutcome, StreamRequest},
    },
    traits::exam_api::ExamApi,
};

#[derive(Clone, Debug)]
pub struct SubmissionRequest {
    pub question_id: String,
    pub category_id: Option<String>,
    pub code: String,
    /// Provisional number of test cases shown before results arrive.
    pub expected_cases: usize,
}

#[derive(Clone, Debug)]
pub struct SubmissionReport {
    pub outcome: StreamOutcome,
    pub progress: SubmissionProgress,
    /// `None` when the attempt was not persisted because the stream never completed.
    pub recorded: Option<Result<(), ApiError>>,
}

/// Drives one submission end to end: stream, live progress, persistence.
#[derive(Debug)]
pub struct SubmissionSession {
    client: Arc<RemoteStreamClient>,
    api: Arc<dyn ExamApi>,
    progress: Arc<Mutex<SubmissionProgress>>,
}

impl SubmissionSession {
    pub fn new(client: Arc<RemoteStreamClient>, api: Arc<dyn ExamApi>) -> Self {
        Self {
            client,
            api,
            progress: Arc::new(Mutex::new(SubmissionProgress::new())),
        }
    }

    /// Snapshot of the live progress model.
    pub fn progress(&self) -> SubmissionProgress {
        lock(&self.progress).clone()
    }

    #[tracing::instrument(skip(self, request), fields(question = %request.question_id))]
    pub async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionReport, StreamError> {
        // A busy client must not feed this session's progress.
        let slot = self.client.reserve()?;
        lock(&self.progress).begin(request.expected_cases);

        let forwarder = self.forward_messages();
        let outcome = slot
            .stream(StreamRequest::submit(&request.code, &request.question_id))
            .await;
        forwarder.abort();

        // Rebuild from the full log; the forwarder may not have seen the tail.
        {
            let messages = self.client.system_messages().borrow().clone();
            let mut progress = lock(&self.progress);
            let mut replay = SubmissionProgress::new();
            replay.begin(request.expected_cases);
            for message in &messages {
                replay.observe(message);
            }
            *progress = replay;
        }

        let submission = outcome.submission();
        let recorded = match &submission {
            Some(submission) => {
                lock(&self.progress).finish(submission.clone());
                Some(self.record(request, submission.passed).await)
            }
            None => {
                tracing::warn!(
                    "Submission ended without a final result: {:?}",
                    outcome.completion
                );
                lock(&self.progress).fail();
                None
            }
        };

        Ok(SubmissionReport {
            outcome,
            progress: self.progress(),
            recorded,
        })
    }

    async fn record(&self, request: &SubmissionRequest, passed: bool) -> Result<(), ApiError> {
        let result = self
            .api
            .submit_answer(
                &request.question_id,
                &request.code,
                passed,
                request.category_id.clone(),
            )
            .await;
        if let Err(err) = &result {
            tracing::error!("Failed to record answer: {}", err);
        }
        result
    }

    /// Applies every newly published system message to the progress model.
    fn forward_messages(&self) -> tokio::task::JoinHandle<()> {
        let mut messages_rx = self.client.system_messages();
        let progress = self.progress.clone();
        tokio::spawn(async move {
            let mut seen = 0;
            while messages_rx.changed().await.is_ok() {
                let messages = messages_rx.borrow_and_update().clone();
                if messages.len() < seen {
                    seen = 0;
                }
                let mut progress = lock(&progress);
                for message in &messages[seen..] {
                    progress.observe(message);
                }
                seen = messages.len();
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        core::{
            domain::CaseStatus, pipeline::streaming::Completion, traits::exam_api::MockExamApi,
        },
        stubs::transport::TransportStub,
    };

    fn session(chunks: &[&str], api: MockExamApi) -> SubmissionSession {
        let chunks = chunks
            .iter()
            .map(|json| format!("data: {}\n\n", json))
            .collect();
        let client = RemoteStreamClient::new(Arc::new(TransportStub::new(chunks)));
        SubmissionSession::new(Arc::new(client), Arc::new(api))
    }

    fn request() -> SubmissionRequest {
        SubmissionRequest {
            question_id: "q-7".to_string(),
            category_id: Some("basics".to_string()),
            code: "print(1)".to_string(),
            expected_cases: 2,
        }
    }

    #[tokio::test]
    async fn test_passed_submission_is_recorded() {
        let mut api = MockExamApi::new();
        api.expect_submit_answer()
            .withf(|question_id, code, passed, category_id| {
                question_id.to_string() == "q-7"
                    && code.to_string() == "print(1)"
                    && *passed
                    && category_id.as_deref() == Some("basics")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let session = session(
            &[
                r#"{"status":"processing","testIndex":0}"#,
                r#"{"status":"test_case_completed","data":{"testIndex":0,"passed":true}}"#,
                r#"{"status":"completed","data":{"passed":true,"results":[
                    {"input":"1","output":"1","expected":"1","passed":true},
                    {"input":"2","output":"2","expected":"2","passed":true}]}}"#,
            ],
            api,
        );

        let report = session.submit(&request()).await.unwrap();

        assert_eq!(report.recorded, Some(Ok(())));
        assert!(report.progress.offers_next_challenge());
        assert_eq!(
            report.progress.cases(),
            [CaseStatus::Passed, CaseStatus::Passed]
        );
    }

    #[tokio::test]
    async fn test_incomplete_stream_is_not_recorded() {
        let mut api = MockExamApi::new();
        api.expect_submit_answer().never();
        let session = session(
            &[r#"{"status":"test_case_completed","data":{"testIndex":1,"passed":false}}"#],
            api,
        );

        let report = session.submit(&request()).await.unwrap();

        assert_eq!(report.outcome.completion, Completion::Incomplete);
        assert_eq!(report.recorded, None);
        assert_eq!(
            report.progress.cases(),
            [CaseStatus::Pending, CaseStatus::Failed]
        );
        assert!(!report.progress.can_close());
    }

    #[tokio::test]
    async fn test_record_failure_is_reported() {
        let mut api = MockExamApi::new();
        api.expect_submit_answer()
            .returning(|_, _, _, _| Err(ApiError::Request("connection refused".to_string())));
        let session = session(&[r#"{"status":"completed","data":{"passed":false}}"#], api);

        let report = session.submit(&request()).await.unwrap();

        assert!(matches!(report.recorded, Some(Err(ApiError::Request(_)))));
        assert!(report.progress.all_complete());
        assert!(!report.progress.is_correct());
    }

    #[tokio::test]
    async fn test_busy_client_leaves_progress_untouched() {
        let mut api = MockExamApi::new();
        api.expect_submit_answer().never();
        let transport = TransportStub::new(
            [
                r#"{"status":"test_case_completed","data":{"testIndex":0,"passed":false}}"#,
                r#"{"status":"completed","data":{"passed":false}}"#,
            ]
            .iter()
            .map(|json| format!("data: {}\n\n", json))
            .collect(),
        )
        .with_delay(Duration::from_millis(50));
        let client = Arc::new(RemoteStreamClient::new(Arc::new(transport)));
        let session = SubmissionSession::new(client.clone(), Arc::new(api));

        let (other, ours) = tokio::join!(client.run("print(1)", ""), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.submit(&request()).await
        });

        assert!(other.is_ok());
        assert!(matches!(ours, Err(StreamError::Busy)));
        assert_eq!(session.progress(), SubmissionProgress::new());
    }
}
