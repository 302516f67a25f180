pub mod aggregate;
pub mod embedding;
pub mod kmeans;
pub mod orchestrator;
pub mod service;
pub mod summarizer;
pub mod traits;
pub mod watcher;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use aggregate::ResultAggregator;
pub use embedding::{EmbeddingBatch, EmbeddingClient, EmbeddingProgress};
pub use kmeans::{cluster_count, Cluster, ClusterError, Clustering, KMeansClusterer};
pub use orchestrator::{AnalysisOrchestrator, PipelineDeps, PipelineError, RunOutcome};
pub use service::{AnalysisService, FileLocationProbe, LocationProbe, Trigger};
pub use summarizer::ClusterSummarizer;
pub use traits::{CommentSource, EventSink, LogSink, TextAnalyzer, TextEmbedder};
pub use watcher::{ContextChange, ContextResolver, ContextWatcher, YouTubeResolver};
