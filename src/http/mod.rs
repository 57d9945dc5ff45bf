/// HTTP implementations of the backend-facing traits.
pub mod exam_api;
pub mod transport;

/// Joins a base URL and an endpoint path without doubling the slash.
pub(crate) fn join_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8000/", "/execution/stream"),
            "http://localhost:8000/execution/stream"
        );
        assert_eq!(join_url("http://host/api", "answers"), "http://host/api/answers");
    }
}
