use crate::core::{domain::Question, errors::ApiError};

/// REST collaborators used around a submission.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ExamApi: std::fmt::Debug + Send + Sync {
    async fn submit_answer(
        &self,
        question_id: &str,
        code: &str,
        passed: bool,
        category_id: Option<String>,
    ) -> Result<(), ApiError>;

    async fn get_question(&self, question_id: &str) -> Result<Question, ApiError>;
}
