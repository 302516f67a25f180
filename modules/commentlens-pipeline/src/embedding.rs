use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use commentlens_common::CommentEmbedding;

use crate::traits::TextEmbedder;

pub const DEFAULT_EMBEDDING_LIMIT: usize = 100;

/// Progress is reported every this many settled requests, and on the last.
const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingProgress {
    pub completed: usize,
    pub total: usize,
}

/// Outcome of embedding one batch of comments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingBatch {
    /// Successfully embedded comments, in fetch order.
    pub embedded: Vec<CommentEmbedding>,
    /// Requests issued (the input after the cap).
    pub attempted: usize,
    /// Requests that errored.
    pub failed: usize,
    /// Requests that returned an unusable vector.
    pub malformed: usize,
}

impl EmbeddingBatch {
    pub fn dimension(&self) -> Option<usize> {
        self.embedded.first().map(CommentEmbedding::dimension)
    }
}

/// Embeds comments one request per text, all in flight together.
pub struct EmbeddingClient {
    embedder: Arc<dyn TextEmbedder>,
    limit: usize,
    concurrency: Option<usize>,
}

impl EmbeddingClient {
    pub fn new(embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            embedder,
            limit: DEFAULT_EMBEDDING_LIMIT,
            concurrency: None,
        }
    }

    /// Only the first `limit` comments are ever embedded.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Cap simultaneous requests. `None` sends the whole batch at once.
    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Embed up to `limit` comments. Failed requests drop their comment; the
    /// batch itself never fails.
    pub async fn embed_all<F>(&self, comments: &[String], mut on_progress: F) -> EmbeddingBatch
    where
        F: FnMut(EmbeddingProgress) + Send,
    {
        let total = comments.len().min(self.limit);
        let mut batch = EmbeddingBatch {
            attempted: total,
            ..EmbeddingBatch::default()
        };
        if total == 0 {
            return batch;
        }

        let width = self.concurrency.unwrap_or(total).max(1);
        let requests: Vec<_> = comments
            .iter()
            .take(total)
            .enumerate()
            .map(|(position, text)| {
                let embedder = Arc::clone(&self.embedder);
                let text = text.clone();
                async move {
                    let outcome = embedder.embed(&text).await;
                    (position, text, outcome)
                }
            })
            .collect();
        let mut settled = stream::iter(requests).buffer_unordered(width);

        let mut received: Vec<CommentEmbedding> = Vec::with_capacity(total);
        let mut completed = 0;
        while let Some((position, text, outcome)) = settled.next().await {
            completed += 1;
            match outcome {
                Ok(embedding) => received.push(CommentEmbedding::new(position, text, embedding)),
                Err(e) => {
                    warn!(position, error = %e, "Embedding request failed, dropping comment");
                    batch.failed += 1;
                }
            }
            if completed % PROGRESS_EVERY == 0 || completed == total {
                on_progress(EmbeddingProgress { completed, total });
            }
        }

        received.sort_by_key(|c| c.position);

        let dimension = run_dimension(&received);
        for candidate in received {
            let usable = is_well_formed(&candidate.embedding)
                && Some(candidate.dimension()) == dimension;
            if !usable {
                debug!(
                    position = candidate.position,
                    len = candidate.dimension(),
                    expected = ?dimension,
                    "Rejecting malformed embedding"
                );
                batch.malformed += 1;
                continue;
            }
            batch.embedded.push(candidate);
        }

        let dropped = batch.failed + batch.malformed;
        if dropped > 0 {
            warn!(
                dropped,
                failed = batch.failed,
                malformed = batch.malformed,
                embedded = batch.embedded.len(),
                "Filtered out comments without usable embeddings"
            );
        }
        batch
    }
}

fn is_well_formed(embedding: &[f64]) -> bool {
    !embedding.is_empty() && embedding.iter().all(|v| v.is_finite())
}

/// The run's dimension is the longest well-formed vector received; shorter
/// ones are truncated responses.
fn run_dimension(received: &[CommentEmbedding]) -> Option<usize> {
    received
        .iter()
        .filter(|c| is_well_formed(&c.embedding))
        .map(CommentEmbedding::dimension)
        .max()
}
