use std::sync::Arc;

use tokio::sync::mpsc::Sender;

use crate::core::{
    domain::{
        CaseOutcome, CaseStatus, ExecutionRequest, ExecutionResult, Question, SampleCase,
        SampleRun,
    },
    pipeline::files::resolve_inputs,
    traits::executor::Executor,
};

/// Runs a question's sample cases locally, one after another.
#[derive(Clone, Debug)]
pub struct SampleRunner {
    executor: Arc<dyn Executor>,
}

impl SampleRunner {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub async fn run(&self, question: &Question, code: &str) -> SampleRun {
        self.execute(question, code, None).await
    }

    /// Like [`SampleRunner::run`], publishing the whole case list every time a
    /// case changes state.
    pub async fn run_with_updates(
        &self,
        question: &Question,
        code: &str,
        update_tx: &Sender<Vec<CaseOutcome>>,
    ) -> SampleRun {
        self.execute(question, code, Some(update_tx)).await
    }

    #[tracing::instrument(skip(self, code, update_tx), fields(question = %question.id))]
    async fn execute(
        &self,
        question: &Question,
        code: &str,
        update_tx: Option<&Sender<Vec<CaseOutcome>>>,
    ) -> SampleRun {
        let cases = sample_cases(question);
        let mut outcomes: Vec<CaseOutcome> = cases
            .iter()
            .map(|case| CaseOutcome::pending(&case.input, &case.expected_output))
            .collect();
        publish(update_tx, &outcomes).await;

        // Sequential on purpose: the runtime is a single stateful interpreter.
        for (idx, case) in cases.iter().enumerate() {
            outcomes[idx] = outcomes[idx].change_status(CaseStatus::Running);
            publish(update_tx, &outcomes).await;

            let inputs = resolve_inputs(question, case);
            let request = ExecutionRequest {
                code: code.to_string(),
                stdin: inputs.stdin,
                files: inputs.files,
            };
            tracing::debug!("Running sample case {}", idx);
            let result = self.executor.run(&request).await;

            outcomes[idx] = judge(case, &result);
            publish(update_tx, &outcomes).await;
        }

        let all_passed = aggregate(&outcomes);
        tracing::info!(
            "Sample run finished: {} cases, all_passed={:?}",
            outcomes.len(),
            all_passed
        );
        SampleRun {
            cases: outcomes,
            all_passed,
        }
    }
}

/// Explicit samples first, then the legacy single pair, then a smoke run.
pub fn sample_cases(question: &Question) -> Vec<SampleCase> {
    if !question.samples.is_empty() {
        return question.samples.clone();
    }

    if question.sample_input.is_some() || question.sample_output.is_some() {
        return vec![SampleCase::new(
            question.sample_input.as_deref().unwrap_or_default(),
            question.sample_output.as_deref().unwrap_or_default(),
        )];
    }

    vec![SampleCase::default()]
}

/// Leading and trailing whitespace is ignored, everything else is significant.
pub fn judge(case: &SampleCase, result: &ExecutionResult) -> CaseOutcome {
    let actual_output = result.output();
    let expected = case.expected_output.trim();
    let passed = result.error_text.is_none()
        && (expected.is_empty() || actual_output.trim() == expected);

    CaseOutcome {
        input: case.input.clone(),
        actual_output,
        expected_output: case.expected_output.clone(),
        passed,
        status: CaseStatus::from_passed(passed),
    }
}

/// `None` unless at least one case had an expected output to compare with.
pub fn aggregate(outcomes: &[CaseOutcome]) -> Option<bool> {
    let mut graded = outcomes
        .iter()
        .filter(|outcome| !outcome.expected_output.trim().is_empty())
        .peekable();
    graded.peek()?;
    Some(graded.all(|outcome| outcome.passed))
}

async fn publish(update_tx: Option<&Sender<Vec<CaseOutcome>>>, outcomes: &[CaseOutcome]) {
    let Some(update_tx) = update_tx else {
        return;
    };
    if update_tx.send(outcomes.to_vec()).await.is_err() {
        tracing::debug!("Case update receiver dropped");
    }
}
