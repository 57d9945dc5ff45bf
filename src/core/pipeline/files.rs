use std::sync::LazyLock;

use regex::Regex;

use crate::core::domain::{FileAssets, Question, SampleCase};

/// Legacy inputs of the form `name.ext: content` describe a file, not stdin.
static FILE_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([A-Za-z0-9_\-.]+\.(?:txt|csv|json|py|dat))\s*:\s*(.*)$")
        .expect("file input pattern is valid")
});

/// What one sample case is executed with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaseInputs {
    pub stdin: String,
    pub files: FileAssets,
}

/// Case-level files win per name, question-level files fill the gaps. Only
/// when neither level defines a file is the legacy input form considered.
pub fn resolve_inputs(question: &Question, case: &SampleCase) -> CaseInputs {
    let mut files = question.file_assets.clone();
    if let Some(case_files) = &case.file_assets {
        files.extend(case_files.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    if files.is_empty() {
        if let Some((name, content)) = parse_file_input(&case.input) {
            tracing::debug!("Treating sample input as virtual file {}", name);
            files.insert(name, content);
            return CaseInputs {
                stdin: String::new(),
                files,
            };
        }
    }

    CaseInputs {
        stdin: case.input.clone(),
        files,
    }
}

pub fn parse_file_input(input: &str) -> Option<(String, String)> {
    let captures = FILE_INPUT.captures(input)?;
    Some((captures[1].to_string(), captures[2].to_string()))
}
