use serde::{Deserialize, Serialize};

// --- Comment retrieval ---

#[derive(Debug, Clone, Serialize)]
pub struct CommentsRequest<'a> {
    #[serde(rename = "contextId")]
    pub context_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentsResponse {
    pub comments: Vec<String>,
}

// --- Embedding ---

/// Shared request body for the embedding and text analysis endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TextRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f64>,
}

// --- Text analysis ---

/// Sentiment label and short summary returned by the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub sentiment: String,
    pub summary: String,
}
