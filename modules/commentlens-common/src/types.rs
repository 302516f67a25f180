use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Run identity ---

/// Identity of one analysis attempt. Compared by equality only; a newer token
/// supersedes an older one but tokens carry no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunToken(Uuid);

impl RunToken {
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell runs apart in logs.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

// --- Embedded comments ---

/// A comment paired with its embedding. `position` is the comment's index in
/// the fetched list and is used only to keep display order stable.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentEmbedding {
    pub position: usize,
    pub text: String,
    pub embedding: Vec<f64>,
}

impl CommentEmbedding {
    pub fn new(position: usize, text: impl Into<String>, embedding: Vec<f64>) -> Self {
        Self {
            position,
            text: text.into(),
            embedding,
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

// --- Sentiment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentBucket {
    Positive,
    Negative,
    Neutral,
}

impl SentimentBucket {
    /// Match a model label against the bucket names, case-insensitively.
    /// Labels outside the three buckets (e.g. "good", "N/A") match nothing.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// Per-bucket counts of analyzed clusters.
///
/// `total` counts every analyzed cluster, including ones whose label matched
/// no bucket, so it can exceed `positive + negative + neutral`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentTally {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
    pub total: u32,
}

impl SentimentTally {
    pub fn record(&mut self, label: &str) -> Option<SentimentBucket> {
        let bucket = SentimentBucket::from_label(label);
        match bucket {
            Some(SentimentBucket::Positive) => self.positive += 1,
            Some(SentimentBucket::Negative) => self.negative += 1,
            Some(SentimentBucket::Neutral) => self.neutral += 1,
            None => {}
        }
        self.total += 1;
        bucket
    }

    pub fn bucketed(&self) -> u32 {
        self.positive + self.negative + self.neutral
    }
}

// --- Results ---

/// Sentiment and summary for one cluster of comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAnalysis {
    pub cluster_size: usize,
    /// Every member text, in fetch order.
    pub cluster_comments: Vec<String>,
    pub representative_text: String,
    /// Label as returned by the model.
    pub sentiment: String,
    pub summary: String,
}

impl ClusterAnalysis {
    pub fn bucket(&self) -> Option<SentimentBucket> {
        SentimentBucket::from_label(&self.sentiment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub context_id: String,
    pub overall_sentiment: SentimentTally,
    pub cluster_analysis: Vec<ClusterAnalysis>,
    pub analyzed_at: DateTime<Utc>,
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tally = &self.overall_sentiment;
        writeln!(f, "\n=== Comment Analysis: {} ===", self.context_id)?;
        writeln!(f, "Positive:       {}", tally.positive)?;
        writeln!(f, "Negative:       {}", tally.negative)?;
        writeln!(f, "Neutral:        {}", tally.neutral)?;
        writeln!(f, "Total analyzed: {}", tally.total)?;
        writeln!(f, "\nKey discussion points:")?;
        if self.cluster_analysis.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (i, cluster) in self.cluster_analysis.iter().enumerate() {
            writeln!(
                f,
                "  Point {} (Sentiment: {}, Comments: {})",
                i + 1,
                cluster.sentiment,
                cluster.cluster_size
            )?;
            writeln!(f, "    {}", cluster.summary)?;
        }
        Ok(())
    }
}

// --- Run lifecycle ---

/// Stage of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    FetchingComments,
    Embedding,
    Clustering,
    Summarizing,
    Done,
}

/// Why a run ended without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoContext,
    NoComments,
    NoEmbeddings,
    NoAnalysis,
}

impl FailureReason {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NoContext => "no context",
            Self::NoComments => "no comments",
            Self::NoEmbeddings => "no embeddings",
            Self::NoAnalysis => "no analysis",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Outbound event for whatever renders progress and results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Status { stage: RunStage, message: String },
    Completed(AnalysisResult),
    Failed { reason: FailureReason, message: String },
    /// The context is no longer analyzable; displayed results should go away.
    Cleared,
}

impl AnalysisEvent {
    pub fn status(stage: RunStage, message: impl Into<String>) -> Self {
        Self::Status {
            stage,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed { .. })
    }
}
