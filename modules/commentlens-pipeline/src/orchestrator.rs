use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use backend_client::{BackendClient, Endpoints};
use commentlens_common::{AnalysisEvent, AnalysisResult, Config, FailureReason, RunStage, RunToken};

use crate::aggregate::ResultAggregator;
use crate::embedding::EmbeddingClient;
use crate::kmeans::{cluster_count, ClusterError, KMeansClusterer};
use crate::summarizer::ClusterSummarizer;
use crate::traits::{CommentSource, EventSink, TextAnalyzer, TextEmbedder};
use crate::watcher::ContextWatcher;

/// Why a run stopped before producing a result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{1}")]
    Empty(FailureReason, String),

    #[error("run superseded")]
    Stale,

    #[error("clustering failed: {0}")]
    Cluster(#[from] ClusterError),
}

/// What a run ended with, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(AnalysisResult),
    Failed { reason: FailureReason, message: String },
    /// A newer run owns the context; nothing was published.
    Superseded,
}

/// The three remote collaborators a run needs.
#[derive(Clone)]
pub struct PipelineDeps {
    pub comments: Arc<dyn CommentSource>,
    pub embedder: Arc<dyn TextEmbedder>,
    pub analyzer: Arc<dyn TextAnalyzer>,
}

impl PipelineDeps {
    pub fn from_backend(client: BackendClient) -> Self {
        let client = Arc::new(client);
        Self {
            comments: client.clone(),
            embedder: client.clone(),
            analyzer: client,
        }
    }

    /// Backend client built from the configured URL and endpoint paths.
    pub fn from_config(config: &Config) -> Self {
        let client = BackendClient::new(&config.backend_url).with_endpoints(Endpoints {
            comments: config.comments_path.clone(),
            embedding: config.embedding_path.clone(),
            analysis: config.analysis_path.clone(),
        });
        Self::from_backend(client)
    }
}

/// Drives one context from comments to a published [`AnalysisResult`].
///
/// Every run is bound to the token it was started with. After each
/// suspension the token is re-checked; once it is no longer current the run
/// stops without emitting anything further.
pub struct AnalysisOrchestrator {
    comments: Arc<dyn CommentSource>,
    embedding: EmbeddingClient,
    clusterer: KMeansClusterer,
    summarizer: ClusterSummarizer,
    watcher: Arc<ContextWatcher>,
    sink: Arc<dyn EventSink>,
}

impl AnalysisOrchestrator {
    pub fn new(deps: PipelineDeps, watcher: Arc<ContextWatcher>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            comments: deps.comments,
            embedding: EmbeddingClient::new(deps.embedder),
            clusterer: KMeansClusterer::default(),
            summarizer: ClusterSummarizer::new(deps.analyzer),
            watcher,
            sink,
        }
    }

    pub fn from_config(
        config: &Config,
        deps: PipelineDeps,
        watcher: Arc<ContextWatcher>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let mut clusterer = KMeansClusterer::new(config.max_iterations);
        if let Some(seed) = config.kmeans_seed {
            clusterer = clusterer.with_seed(seed);
        }
        Self {
            comments: deps.comments,
            embedding: EmbeddingClient::new(deps.embedder)
                .with_limit(config.embedding_limit)
                .with_concurrency(config.embedding_concurrency),
            clusterer,
            summarizer: ClusterSummarizer::new(deps.analyzer)
                .with_sample_size(config.summary_sample_size),
            watcher,
            sink,
        }
    }

    pub fn with_clusterer(mut self, clusterer: KMeansClusterer) -> Self {
        self.clusterer = clusterer;
        self
    }

    pub fn watcher(&self) -> &Arc<ContextWatcher> {
        &self.watcher
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Run the full pipeline for `context_id` under `token`. Never fails:
    /// every ending is reported through the sink (if still current) and the
    /// returned outcome.
    pub async fn run(&self, token: RunToken, context_id: &str) -> RunOutcome {
        info!(%token, context_id, "Starting analysis run");

        let outcome = match self.execute(&token, context_id).await {
            Ok(result) => {
                let done = AnalysisEvent::status(
                    RunStage::Done,
                    format!(
                        "Analysis complete. {} discussion points analyzed.",
                        result.cluster_analysis.len()
                    ),
                );
                if self.watcher.emit_all_if_current(
                    &token,
                    self.sink.as_ref(),
                    [done, AnalysisEvent::Completed(result.clone())],
                ) {
                    RunOutcome::Completed(result)
                } else {
                    RunOutcome::Superseded
                }
            }
            Err(PipelineError::Stale) => RunOutcome::Superseded,
            Err(e) => {
                let (reason, message) = match e {
                    PipelineError::Empty(reason, message) => (reason, message),
                    // Vectors that cannot be clustered are as good as none.
                    other => (FailureReason::NoEmbeddings, other.to_string()),
                };
                let events = [
                    AnalysisEvent::status(RunStage::Done, message.clone()),
                    AnalysisEvent::Failed {
                        reason,
                        message: message.clone(),
                    },
                ];
                if self.watcher.emit_all_if_current(&token, self.sink.as_ref(), events) {
                    RunOutcome::Failed { reason, message }
                } else {
                    RunOutcome::Superseded
                }
            }
        };

        match &outcome {
            RunOutcome::Completed(result) => info!(
                %token,
                context_id,
                clusters = result.cluster_analysis.len(),
                positive = result.overall_sentiment.positive,
                negative = result.overall_sentiment.negative,
                neutral = result.overall_sentiment.neutral,
                total = result.overall_sentiment.total,
                "Analysis run complete"
            ),
            RunOutcome::Failed { reason, message } => {
                warn!(%token, context_id, reason = reason.tag(), "Analysis run failed: {message}")
            }
            RunOutcome::Superseded => info!(%token, context_id, "Analysis run superseded"),
        }
        outcome
    }

    async fn execute(&self, token: &RunToken, context_id: &str) -> Result<AnalysisResult, PipelineError> {
        self.transition(token, RunStage::Idle, "Initializing...")?;

        // --- Comments ---
        self.transition(token, RunStage::FetchingComments, "Fetching comments...")?;
        let fetched = self.comments.comments(context_id).await;
        self.ensure_current(token)?;
        let comments = match fetched {
            Ok(comments) => comments,
            Err(e) => {
                warn!(context_id, error = %e, "Comment fetch failed");
                return Err(PipelineError::Empty(
                    FailureReason::NoComments,
                    format!("Failed to fetch comments: {e}"),
                ));
            }
        };
        if comments.is_empty() {
            return Err(PipelineError::Empty(
                FailureReason::NoComments,
                "No comments found for this video.".to_string(),
            ));
        }

        // --- Embeddings ---
        self.transition(
            token,
            RunStage::Embedding,
            format!("Found {} comments. Getting embeddings...", comments.len()),
        )?;
        let batch = self
            .embedding
            .embed_all(&comments, |progress| {
                self.watcher.emit_if_current(
                    token,
                    self.sink.as_ref(),
                    AnalysisEvent::status(
                        RunStage::Embedding,
                        format!(
                            "Getting embeddings ({}/{})...",
                            progress.completed, progress.total
                        ),
                    ),
                );
            })
            .await;
        self.ensure_current(token)?;
        if batch.embedded.is_empty() {
            return Err(PipelineError::Empty(
                FailureReason::NoEmbeddings,
                "Failed to get embeddings for any comments.".to_string(),
            ));
        }

        // --- Clustering ---
        let n = batch.embedded.len();
        let k = cluster_count(n);
        self.transition(
            token,
            RunStage::Clustering,
            format!("Received embeddings for {n} comments. Performing clustering..."),
        )?;
        let clustering = self.clusterer.cluster(batch.embedded, k)?;
        debug!(
            k,
            clusters = clustering.clusters.len(),
            iterations = clustering.iterations,
            "Clustering finished"
        );
        if clustering.clusters.is_empty() {
            return Err(PipelineError::Empty(
                FailureReason::NoAnalysis,
                "Clustering produced no discussion points.".to_string(),
            ));
        }

        // --- Summaries ---
        self.transition(
            token,
            RunStage::Summarizing,
            format!(
                "Clustering complete. Found {} distinct discussion points. Analyzing...",
                clustering.clusters.len()
            ),
        )?;
        let mut aggregator = ResultAggregator::new();
        for cluster in &clustering.clusters {
            let analysis = self.summarizer.summarize(cluster).await;
            self.ensure_current(token)?;
            match analysis {
                Some(analysis) => aggregator.record(analysis),
                None => aggregator.skip(),
            }
        }

        aggregator.finish(context_id).map_err(|reason| {
            PipelineError::Empty(
                reason,
                "Failed to analyze any discussion points.".to_string(),
            )
        })
    }

    fn ensure_current(&self, token: &RunToken) -> Result<(), PipelineError> {
        if self.watcher.is_current(token) {
            Ok(())
        } else {
            debug!(%token, "Run no longer current, stopping");
            Err(PipelineError::Stale)
        }
    }

    /// Emit a status for `stage`, or stop if the run was superseded.
    fn transition(
        &self,
        token: &RunToken,
        stage: RunStage,
        message: impl Into<String>,
    ) -> Result<(), PipelineError> {
        let message = message.into();
        debug!(%token, ?stage, "{message}");
        if self
            .watcher
            .emit_if_current(token, self.sink.as_ref(), AnalysisEvent::status(stage, message))
        {
            Ok(())
        } else {
            Err(PipelineError::Stale)
        }
    }
}
