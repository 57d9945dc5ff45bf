use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::core::domain::{CaseOutcome, CaseStatus};

/// One frame of the execution stream, tagged by its `status` field.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamEvent {
    Queued {
        #[serde(default)]
        message: Option<String>,
    },
    Processing {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, rename = "testIndex")]
        test_index: Option<usize>,
    },
    TestCaseCompleted {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, rename = "testIndex")]
        test_index: Option<usize>,
        #[serde(default, deserialize_with = "null_as_default")]
        data: CaseCompletion,
    },
    Completed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        data: CompletedData,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        data: Option<ErrorData>,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed { .. } | StreamEvent::Error { .. })
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CaseCompletion {
    #[serde(default, rename = "testIndex", alias = "index")]
    pub test_index: Option<usize>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub passed: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CompletedData {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub results: Option<Vec<RemoteCaseResult>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ErrorData {
    #[serde(default)]
    pub error: Option<String>,
}

/// A graded case as reported by the backend.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RemoteCaseResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub input: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expected: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub passed: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Backends send `null` for fields they have no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<RemoteCaseResult> for CaseOutcome {
    fn from(result: RemoteCaseResult) -> Self {
        let actual_output = match result.error {
            Some(error) if result.output.is_empty() => error,
            _ => result.output,
        };
        CaseOutcome {
            input: result.input,
            actual_output,
            expected_output: result.expected,
            passed: result.passed,
            status: CaseStatus::from_passed(result.passed),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Error,
}

/// Structured progress carried next to the display text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseSignal {
    Running(usize),
    Finished { index: usize, passed: bool },
}

/// A status line about the submission process itself, not program output.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemMessage {
    pub text: String,
    pub level: MessageLevel,
    pub signal: Option<CaseSignal>,
    pub received_at: DateTime<Utc>,
}

impl SystemMessage {
    pub fn new(text: &str, level: MessageLevel) -> Self {
        Self {
            text: text.to_string(),
            level,
            signal: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_signal(mut self, signal: CaseSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        let queued: StreamEvent = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(queued, StreamEvent::Queued { message: None });

        let processing: StreamEvent = serde_json::from_str(
            r#"{"status":"processing","message":"Test Case 2 Running","testIndex":1}"#,
        )
        .unwrap();
        assert_eq!(
            processing,
            StreamEvent::Processing {
                message: Some("Test Case 2 Running".to_string()),
                test_index: Some(1),
            }
        );

        let case: StreamEvent = serde_json::from_str(
            r#"{"status":"test_case_completed","data":{"index":0,"passed":false}}"#,
        )
        .unwrap();
        assert_eq!(
            case,
            StreamEvent::TestCaseCompleted {
                message: None,
                test_index: None,
                data: CaseCompletion {
                    test_index: Some(0),
                    passed: false
                },
            }
        );
    }

    #[test]
    fn test_parse_completed_results() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"status":"completed","data":{"passed":false,"results":[
                {"input":"1","output":"2","expected":"2","passed":true},
                {"input":"2","output":"","expected":"4","passed":false,"error":"Timeout"}
            ]}}"#,
        )
        .unwrap();
        let StreamEvent::Completed { data, .. } = event else {
            panic!("Expected Completed event");
        };

        let outcomes: Vec<CaseOutcome> =
            data.results.unwrap().into_iter().map(Into::into).collect();
        assert_eq!(data.passed, Some(false));
        assert_eq!(outcomes[0].status, CaseStatus::Passed);
        assert_eq!(outcomes[1].status, CaseStatus::Failed);
        assert_eq!(outcomes[1].actual_output, "Timeout");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"status":"paused"}"#).is_err());
    }

    #[test]
    fn test_null_fields_read_as_empty() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"status":"completed","data":{"passed":false,"results":[
                {"input":null,"output":null,"expected":"4","passed":null,"error":"Timeout"}
            ]}}"#,
        )
        .unwrap();
        let StreamEvent::Completed { data, .. } = event else {
            panic!("Expected Completed event");
        };
        let outcome: CaseOutcome = data.results.unwrap().remove(0).into();

        assert_eq!(outcome.input, "");
        assert_eq!(outcome.actual_output, "Timeout");
        assert!(!outcome.passed);

        let event: StreamEvent =
            serde_json::from_str(r#"{"status":"completed","data":null}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Completed {
                message: None,
                data: CompletedData::default(),
            }
        );
    }
}
