use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Virtual files keyed by file name.
pub type FileAssets = BTreeMap<String, String>;

/// Where the runtime's loader entrypoint lives and where its packages
/// and scratch space are indexed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeDistribution {
    pub loader: String,
    pub index: String,
    pub version: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    pub stdin: String,
    pub files: FileAssets,
}

impl ExecutionRequest {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            ..Default::default()
        }
    }

    pub fn with_stdin(mut self, stdin: &str) -> Self {
        self.stdin = stdin.to_string();
        self
    }

    pub fn with_files(mut self, files: FileAssets) -> Self {
        self.files = files;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output_lines: Vec<String>,
    pub error_text: Option<String>,
}

impl ExecutionResult {
    pub fn failed(error_text: &str) -> Self {
        Self {
            output_lines: Vec::new(),
            error_text: Some(error_text.to_string()),
        }
    }

    /// All captured lines joined the way the console shows them.
    pub fn output(&self) -> String {
        self.output_lines.join("\n")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub samples: Vec<SampleCase>,
    #[serde(default)]
    pub sample_input: Option<String>,
    #[serde(default)]
    pub sample_output: Option<String>,
    #[serde(default)]
    pub file_assets: FileAssets,
    #[serde(default)]
    pub category_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SampleCase {
    #[serde(default)]
    pub input: String,
    #[serde(default, alias = "output")]
    pub expected_output: String,
    #[serde(default)]
    pub file_assets: Option<FileAssets>,
}

impl SampleCase {
    pub fn new(input: &str, expected_output: &str) -> Self {
        Self {
            input: input.to_string(),
            expected_output: expected_output.to_string(),
            file_assets: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
}

impl CaseStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            CaseStatus::Passed
        } else {
            CaseStatus::Failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Passed | CaseStatus::Failed)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CaseOutcome {
    pub input: String,
    pub actual_output: String,
    pub expected_output: String,
    pub passed: bool,
    pub status: CaseStatus,
}

impl CaseOutcome {
    pub fn pending(input: &str, expected_output: &str) -> Self {
        Self {
            input: input.to_string(),
            expected_output: expected_output.to_string(),
            ..Default::default()
        }
    }

    pub fn change_status(&self, status: CaseStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleRun {
    pub cases: Vec<CaseOutcome>,
    pub all_passed: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub passed: bool,
    pub results: Vec<CaseOutcome>,
}
