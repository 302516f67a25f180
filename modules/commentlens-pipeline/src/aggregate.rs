use chrono::Utc;

use commentlens_common::{AnalysisResult, ClusterAnalysis, FailureReason, SentimentTally};

/// Collects cluster analyses in cluster order and tallies their sentiment.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    tally: SentimentTally,
    clusters: Vec<ClusterAnalysis>,
    skipped: usize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, analysis: ClusterAnalysis) {
        self.tally.record(&analysis.sentiment);
        self.clusters.push(analysis);
    }

    /// Note a cluster that produced no analysis. Leaves the tally alone.
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn tally(&self) -> &SentimentTally {
        &self.tally
    }

    pub fn analyzed(&self) -> usize {
        self.clusters.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Final result once every cluster has been attempted.
    pub fn finish(self, context_id: &str) -> Result<AnalysisResult, FailureReason> {
        if self.clusters.is_empty() {
            return Err(FailureReason::NoAnalysis);
        }
        Ok(AnalysisResult {
            context_id: context_id.to_string(),
            overall_sentiment: self.tally,
            cluster_analysis: self.clusters,
            analyzed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(sentiment: &str, size: usize) -> ClusterAnalysis {
        let comments: Vec<String> = (0..size).map(|i| format!("c{i}")).collect();
        ClusterAnalysis {
            cluster_size: size,
            representative_text: comments[0].clone(),
            cluster_comments: comments,
            sentiment: sentiment.to_string(),
            summary: format!("{sentiment} summary"),
        }
    }

    #[test]
    fn preserves_cluster_order_and_tallies() {
        let mut agg = ResultAggregator::new();
        agg.record(analysis("Positive", 3));
        agg.skip();
        agg.record(analysis("negative", 2));
        agg.record(analysis("positive", 1));

        assert_eq!(agg.analyzed(), 3);
        assert_eq!(agg.skipped(), 1);

        let result = agg.finish("vid").unwrap();
        assert_eq!(result.context_id, "vid");
        assert_eq!(result.overall_sentiment.positive, 2);
        assert_eq!(result.overall_sentiment.negative, 1);
        assert_eq!(result.overall_sentiment.total, 3);
        let sizes: Vec<usize> = result.cluster_analysis.iter().map(|c| c.cluster_size).collect();
        assert_eq!(sizes, vec![3, 2, 1]);
    }

    #[test]
    fn unknown_label_is_counted_in_total_only() {
        let mut agg = ResultAggregator::new();
        agg.record(analysis("good", 2));
        let tally = agg.tally().clone();
        assert_eq!(tally.total, 1);
        assert_eq!(tally.bucketed(), 0);
    }

    #[test]
    fn nothing_recorded_is_no_analysis() {
        let mut agg = ResultAggregator::new();
        agg.skip();
        assert_eq!(agg.finish("vid").unwrap_err(), FailureReason::NoAnalysis);
    }
}
