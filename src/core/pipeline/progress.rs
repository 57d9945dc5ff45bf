use crate::core::{
    domain::{CaseStatus, SubmissionOutcome},
    pipeline::events::{CaseSignal, SystemMessage},
};

/// Live view of one submission.
///
/// Interim statuses come from structured case signals; the final results
/// replace them wholesale once they arrive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionProgress {
    cases: Vec<CaseStatus>,
    final_result: Option<SubmissionOutcome>,
    is_loading: bool,
}

impl SubmissionProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// `expected` is provisional; it grows if the stream mentions more cases.
    pub fn begin(&mut self, expected: usize) {
        self.cases = vec![CaseStatus::Pending; expected];
        self.final_result = None;
        self.is_loading = true;
    }

    pub fn observe(&mut self, message: &SystemMessage) {
        let Some(signal) = message.signal else {
            return;
        };
        if self.final_result.is_some() {
            return;
        }

        match signal {
            CaseSignal::Running(index) => {
                let status = self.slot(index);
                if !status.is_terminal() {
                    *status = CaseStatus::Running;
                }
            }
            CaseSignal::Finished { index, passed } => {
                *self.slot(index) = CaseStatus::from_passed(passed);
            }
        }
    }

    pub fn finish(&mut self, outcome: SubmissionOutcome) {
        if !outcome.results.is_empty() {
            self.cases = outcome.results.iter().map(|r| r.status).collect();
        }
        self.final_result = Some(outcome);
        self.is_loading = false;
    }

    /// The stream ended without an authoritative result.
    pub fn fail(&mut self) {
        self.is_loading = false;
    }

    pub fn cases(&self) -> &[CaseStatus] {
        &self.cases
    }

    pub fn final_result(&self) -> Option<&SubmissionOutcome> {
        self.final_result.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn all_complete(&self) -> bool {
        self.final_result.is_some() && !self.is_loading
    }

    pub fn is_correct(&self) -> bool {
        self.final_result.as_ref().is_some_and(|r| r.passed)
    }

    pub fn can_close(&self) -> bool {
        self.all_complete()
    }

    pub fn offers_next_challenge(&self) -> bool {
        self.all_complete() && self.is_correct()
    }

    fn slot(&mut self, index: usize) -> &mut CaseStatus {
        if index >= self.cases.len() {
            self.cases.resize(index + 1, CaseStatus::Pending);
        }
        &mut self.cases[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{domain::CaseOutcome, pipeline::events::MessageLevel};

    fn signal(signal: CaseSignal) -> SystemMessage {
        SystemMessage::new("display text only", MessageLevel::Info).with_signal(signal)
    }

    #[test]
    fn test_case_lifecycle() {
        let mut progress = SubmissionProgress::new();
        progress.begin(2);
        assert_eq!(progress.cases(), [CaseStatus::Pending, CaseStatus::Pending]);

        progress.observe(&signal(CaseSignal::Running(0)));
        assert_eq!(progress.cases()[0], CaseStatus::Running);

        progress.observe(&signal(CaseSignal::Finished {
            index: 0,
            passed: true,
        }));
        progress.observe(&signal(CaseSignal::Running(0)));
        assert_eq!(progress.cases()[0], CaseStatus::Passed);
        assert!(!progress.all_complete());
        assert!(!progress.can_close());
    }

    #[test]
    fn test_provisional_count_grows() {
        let mut progress = SubmissionProgress::new();
        progress.begin(1);

        progress.observe(&signal(CaseSignal::Running(2)));

        assert_eq!(
            progress.cases(),
            [CaseStatus::Pending, CaseStatus::Pending, CaseStatus::Running]
        );
    }

    #[test]
    fn test_messages_without_signal_change_nothing() {
        let mut progress = SubmissionProgress::new();
        progress.begin(1);

        progress.observe(&SystemMessage::new("Test Case 1 Running", MessageLevel::Info));

        assert_eq!(progress.cases(), [CaseStatus::Pending]);
    }

    #[test]
    fn test_final_results_win() {
        let mut progress = SubmissionProgress::new();
        progress.begin(3);
        progress.observe(&signal(CaseSignal::Finished {
            index: 0,
            passed: false,
        }));

        progress.finish(SubmissionOutcome {
            passed: true,
            results: vec![
                CaseOutcome {
                    passed: true,
                    status: CaseStatus::Passed,
                    ..Default::default()
                };
                2
            ],
        });

        assert_eq!(progress.cases(), [CaseStatus::Passed, CaseStatus::Passed]);
        assert!(progress.all_complete());
        assert!(progress.is_correct());
        assert!(progress.offers_next_challenge());

        // Late interim signals cannot override final data.
        progress.observe(&signal(CaseSignal::Finished {
            index: 1,
            passed: false,
        }));
        assert_eq!(progress.cases()[1], CaseStatus::Passed);
    }

    #[test]
    fn test_failed_stream_stalls() {
        let mut progress = SubmissionProgress::new();
        progress.begin(1);

        progress.fail();

        assert!(!progress.is_loading());
        assert!(!progress.all_complete());
        assert!(!progress.can_close());
        assert!(!progress.offers_next_challenge());
    }
}
