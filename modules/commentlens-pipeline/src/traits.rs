// Trait seams between the orchestrator and the outside world.
//
// CommentSource, TextEmbedder and TextAnalyzer wrap the three backend calls.
// EventSink receives status and terminal events for whatever renders them.
// The concrete backend implements all three collaborator traits; tests swap
// in the mocks from `testing`.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use backend_client::{BackendClient, TextAnalysis};
use commentlens_common::AnalysisEvent;

// ---------------------------------------------------------------------------
// Remote collaborators
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Ordered comment texts for a context.
    async fn comments(&self, context_id: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Sentiment label and summary for a block of text.
    async fn analyze(&self, text: &str) -> Result<TextAnalysis>;
}

#[async_trait]
impl CommentSource for BackendClient {
    async fn comments(&self, context_id: &str) -> Result<Vec<String>> {
        Ok(BackendClient::comments(self, context_id).await?)
    }
}

#[async_trait]
impl TextEmbedder for BackendClient {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        Ok(self.embedding(text).await?)
    }
}

#[async_trait]
impl TextAnalyzer for BackendClient {
    async fn analyze(&self, text: &str) -> Result<TextAnalysis> {
        Ok(BackendClient::analyze(self, text).await?)
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Receiver of outbound analysis events. Called while the context watcher's
/// lock is held, so implementations must not block or call back into it.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalysisEvent);
}

impl EventSink for mpsc::UnboundedSender<AnalysisEvent> {
    fn emit(&self, event: AnalysisEvent) {
        if self.send(event).is_err() {
            warn!("Event receiver dropped, discarding analysis event");
        }
    }
}

/// Sink that only logs. Useful when nothing renders the events.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: AnalysisEvent) {
        match event {
            AnalysisEvent::Status { stage, message } => info!(?stage, "{message}"),
            AnalysisEvent::Completed(result) => info!(
                context_id = result.context_id.as_str(),
                clusters = result.cluster_analysis.len(),
                total = result.overall_sentiment.total,
                "Analysis complete"
            ),
            AnalysisEvent::Failed { reason, message } => {
                warn!(reason = reason.tag(), "Analysis failed: {message}")
            }
            AnalysisEvent::Cleared => info!("Analysis results cleared"),
        }
    }
}
