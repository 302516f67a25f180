use std::sync::Arc;

use tracing::{debug, warn};

use commentlens_common::ClusterAnalysis;

use crate::kmeans::Cluster;
use crate::traits::TextAnalyzer;

pub const DEFAULT_SAMPLE_SIZE: usize = 5;

const SAMPLE_SEPARATOR: &str = "\n\n";

/// Asks the analysis model for a sentiment label and summary per cluster.
///
/// Only the first `sample_size` members are sent; the full membership is kept
/// on the resulting [`ClusterAnalysis`].
pub struct ClusterSummarizer {
    analyzer: Arc<dyn TextAnalyzer>,
    sample_size: usize,
}

impl ClusterSummarizer {
    pub fn new(analyzer: Arc<dyn TextAnalyzer>) -> Self {
        Self {
            analyzer,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Text sent for analysis: the first members joined by a blank line.
    pub fn subject(&self, cluster: &Cluster) -> String {
        cluster
            .members
            .iter()
            .take(self.sample_size)
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join(SAMPLE_SEPARATOR)
    }

    /// One analysis call for `cluster`. `None` if the call failed or came back
    /// without a sentiment label.
    pub async fn summarize(&self, cluster: &Cluster) -> Option<ClusterAnalysis> {
        let representative = cluster.members.first()?.text.clone();
        let subject = self.subject(cluster);
        debug!(size = cluster.len(), subject_len = subject.len(), "Analyzing cluster");

        let analysis = match self.analyzer.analyze(&subject).await {
            Ok(a) => a,
            Err(e) => {
                warn!(size = cluster.len(), error = %e, "Cluster analysis failed, skipping");
                return None;
            }
        };

        let sentiment = analysis.sentiment.trim();
        if sentiment.is_empty() {
            warn!(size = cluster.len(), "Empty analysis response, skipping cluster");
            return None;
        }

        Some(ClusterAnalysis {
            cluster_size: cluster.len(),
            cluster_comments: cluster.texts(),
            representative_text: representative,
            sentiment: sentiment.to_string(),
            summary: analysis.summary.trim().to_string(),
        })
    }
}
