use serde_json::json;

use crate::{
    constants::{ANSWERS_ENDPOINT, QUESTIONS_ENDPOINT},
    core::{domain::Question, errors::ApiError, traits::exam_api::ExamApi},
    http::join_url,
};

#[derive(Debug, Clone)]
pub struct HttpExamApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExamApi {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    /// The id is pushed as a single, percent-encoded path segment.
    fn question_url(&self, question_id: &str) -> Result<reqwest::Url, ApiError> {
        let mut url = reqwest::Url::parse(&join_url(&self.base_url, QUESTIONS_ENDPOINT))
            .map_err(|e| ApiError::Request(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Request(format!("invalid base URL: {}", self.base_url)))?
            .push(question_id);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait::async_trait]
impl ExamApi for HttpExamApi {
    #[tracing::instrument(skip(self, code))]
    async fn submit_answer(
        &self,
        question_id: &str,
        code: &str,
        passed: bool,
        category_id: Option<String>,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(join_url(&self.base_url, ANSWERS_ENDPOINT))
            .json(&json!({
                "questionId": question_id,
                "code": code,
                "isCorrect": passed,
                "categoryId": category_id,
            }))
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        Self::check(response).await?;

        tracing::info!("Answer recorded (passed: {})", passed);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_question(&self, question_id: &str) -> Result<Question, ApiError> {
        let response = self
            .client
            .get(self.question_url(question_id)?)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        Self::check(response)
            .await?
            .json::<Question>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    use super::*;

    #[tokio::test]
    async fn test_submit_answer_posts_attempt() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/answers").json_body(json!({
                    "questionId": "q-1",
                    "code": "print(1)",
                    "isCorrect": true,
                    "categoryId": "loops",
                }));
                then.status(201).json_body(json!({}));
            })
            .await;
        let api = HttpExamApi::new(reqwest::Client::new(), &server.base_url());

        api.submit_answer("q-1", "print(1)", true, Some("loops".to_string()))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_question_decodes_samples() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/questions/q-9");
                then.status(200).json_body(json!({
                    "id": "q-9",
                    "samples": [{ "input": "1 2", "output": "3" }],
                    "fileAssets": { "data.txt": "abc" },
                }));
            })
            .await;
        let api = HttpExamApi::new(reqwest::Client::new(), &server.base_url());

        let question = api.get_question("q-9").await.unwrap();

        mock.assert_async().await;
        assert_eq!(question.id, "q-9");
        assert_eq!(question.samples[0].expected_output, "3");
        assert_eq!(question.file_assets["data.txt"], "abc");
    }

    #[test]
    fn test_question_id_is_one_path_segment() {
        let api = HttpExamApi::new(reqwest::Client::new(), "http://localhost:8000/api/");

        let url = api.question_url("a/b?c d").unwrap();

        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/questions/a%2Fb%3Fc%20d"
        );
        assert!(matches!(
            HttpExamApi::new(reqwest::Client::new(), "not a url").question_url("q"),
            Err(ApiError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/questions/missing");
                then.status(404).body("no such question");
            })
            .await;
        let api = HttpExamApi::new(reqwest::Client::new(), &server.base_url());

        let result = api.get_question("missing").await;

        assert_eq!(
            result.unwrap_err(),
            ApiError::Status {
                status: 404,
                body: "no such question".to_string()
            }
        );
    }
}
