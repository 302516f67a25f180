pub mod error;
pub mod types;

pub use error::{BackendError, Result};
pub use types::{CommentsResponse, EmbeddingResponse, TextAnalysis};

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::{CommentsRequest, TextRequest};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Request paths for the three backend endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub comments: String,
    pub embedding: String,
    pub analysis: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            comments: "/get_youtube_comments".to_string(),
            embedding: "/get_embedding".to_string(),
            analysis: "/analyze_text".to_string(),
        }
    }
}

/// Client for the comment/embedding/analysis backend.
///
/// Every call is a single JSON POST. Non-2xx statuses become
/// [`BackendError::Api`]; bodies that don't match the expected shape become
/// [`BackendError::Parse`]. Nothing is retried.
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the ordered comment texts for a context (video id).
    pub async fn comments(&self, context_id: &str) -> Result<Vec<String>> {
        tracing::debug!(context_id, "Fetching comments");
        let resp: CommentsResponse = self
            .post(&self.endpoints.comments, &CommentsRequest { context_id })
            .await?;
        tracing::debug!(context_id, count = resp.comments.len(), "Received comments");
        Ok(resp.comments)
    }

    /// Embed a single text.
    pub async fn embedding(&self, text: &str) -> Result<Vec<f64>> {
        let resp: EmbeddingResponse = self
            .post(&self.endpoints.embedding, &TextRequest { text })
            .await?;
        Ok(resp.embedding)
    }

    /// Obtain a sentiment label and summary for a block of text.
    pub async fn analyze(&self, text: &str) -> Result<TextAnalysis> {
        self.post(&self.endpoints.analysis, &TextRequest { text })
            .await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = BackendClient::new("http://localhost:5000/");
        assert_eq!(client.base_url(), "http://localhost:5000");
    }

    #[test]
    fn default_endpoints_match_backend_routes() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.comments, "/get_youtube_comments");
        assert_eq!(endpoints.embedding, "/get_embedding");
        assert_eq!(endpoints.analysis, "/analyze_text");
    }

    #[test]
    fn comments_request_uses_camel_case_context_id() {
        let body = serde_json::to_value(CommentsRequest { context_id: "abc" }).unwrap();
        assert_eq!(body, serde_json::json!({ "contextId": "abc" }));
    }
}
