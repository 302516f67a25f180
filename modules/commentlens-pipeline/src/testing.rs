// Test mocks for the analysis pipeline.
//
// One mock per trait boundary:
// - MockCommentSource (CommentSource): HashMap-based context→comments
// - MockEmbedder (TextEmbedder): deterministic hash-based vectors with overrides,
//   optionally gated so no call returns until a given number are in flight
// - MockAnalyzer (TextAnalyzer): fixed or keyword-driven labels, records subjects
// - RecordingSink (EventSink): keeps every emitted event
// - MockProbe (LocationProbe): settable location for polling tests
//
// Each mock can run a one-shot hook on its first call, which is how tests
// change the context while a run is suspended on that call.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Barrier;

use backend_client::TextAnalysis;
use commentlens_common::{AnalysisEvent, CommentEmbedding, RunStage};

use crate::kmeans::Cluster;
use crate::service::LocationProbe;
use crate::traits::{CommentSource, EventSink, TextAnalyzer, TextEmbedder};

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct FirstCallHook(Mutex<Option<Hook>>);

impl FirstCallHook {
    fn set(&self, hook: Hook) {
        *self.0.lock().unwrap() = Some(hook);
    }

    fn fire(&self) {
        let hook = self.0.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

// ---------------------------------------------------------------------------
// MockCommentSource
// ---------------------------------------------------------------------------

/// Returns registered comments per context; `Err` for anything else.
#[derive(Default)]
pub struct MockCommentSource {
    comments: HashMap<String, Vec<String>>,
    hook: FirstCallHook,
    calls: AtomicUsize,
}

impl MockCommentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_context(mut self, context_id: &str, comments: Vec<String>) -> Self {
        self.comments.insert(context_id.to_string(), comments);
        self
    }

    pub fn on_first_call(self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hook.set(Box::new(hook));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentSource for MockCommentSource {
    async fn comments(&self, context_id: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hook.fire();
        self.comments
            .get(context_id)
            .cloned()
            .ok_or_else(|| anyhow!("MockCommentSource: no comments registered for {context_id}"))
    }
}

// ---------------------------------------------------------------------------
// MockEmbedder
// ---------------------------------------------------------------------------

/// Deterministic embedder. Unregistered texts get a hash-derived vector of
/// the configured dimension.
pub struct MockEmbedder {
    dim: usize,
    overrides: HashMap<String, Vec<f64>>,
    failing: HashSet<String>,
    fail_all: bool,
    gate: Option<Arc<Barrier>>,
    hook: FirstCallHook,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            overrides: HashMap::new(),
            failing: HashSet::new(),
            fail_all: false,
            gate: None,
            hook: FirstCallHook::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn respond_with(mut self, text: &str, embedding: Vec<f64>) -> Self {
        self.overrides.insert(text.to_string(), embedding);
        self
    }

    pub fn fail_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Hold every call until `in_flight` calls are waiting together. A caller
    /// that issues fewer at once never gets a response.
    pub fn gated(mut self, in_flight: usize) -> Self {
        self.gate = Some(Arc::new(Barrier::new(in_flight)));
        self
    }

    pub fn on_first_call(self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hook.set(Box::new(hook));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextEmbedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hook.fire();
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        if self.fail_all || self.failing.contains(text) {
            return Err(anyhow!("MockEmbedder: embedding failed for {text:?}"));
        }
        if let Some(embedding) = self.overrides.get(text) {
            return Ok(embedding.clone());
        }
        Ok(hash_vector(text, self.dim))
    }
}

/// Stable pseudo-random vector in [-1, 1] derived from the text bytes.
pub fn hash_vector(text: &str, dim: usize) -> Vec<f64> {
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        state ^= byte as u64;
        state = state.wrapping_mul(0x0100_0000_01b3);
    }
    (0..dim)
        .map(|i| {
            state ^= i as u64;
            state = state.wrapping_mul(0x0100_0000_01b3);
            (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MockAnalyzer
// ---------------------------------------------------------------------------

/// Returns a fixed label unless the subject contains a registered keyword.
/// Records every subject it was asked about.
pub struct MockAnalyzer {
    default: TextAnalysis,
    keyword_labels: Vec<(String, String)>,
    failing: Vec<String>,
    subjects: Mutex<Vec<String>>,
    hook: FirstCallHook,
}

impl MockAnalyzer {
    pub fn constant(sentiment: &str, summary: &str) -> Self {
        Self {
            default: TextAnalysis {
                sentiment: sentiment.to_string(),
                summary: summary.to_string(),
            },
            keyword_labels: Vec::new(),
            failing: Vec::new(),
            subjects: Mutex::new(Vec::new()),
            hook: FirstCallHook::default(),
        }
    }

    /// Subjects containing `keyword` get `sentiment` instead of the default.
    pub fn label_when(mut self, keyword: &str, sentiment: &str) -> Self {
        self.keyword_labels
            .push((keyword.to_string(), sentiment.to_string()));
        self
    }

    /// Subjects containing `keyword` fail.
    pub fn fail_on(mut self, keyword: &str) -> Self {
        self.failing.push(keyword.to_string());
        self
    }

    pub fn on_first_call(self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hook.set(Box::new(hook));
        self
    }

    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.subjects.lock().unwrap().len()
    }
}

#[async_trait]
impl TextAnalyzer for MockAnalyzer {
    async fn analyze(&self, text: &str) -> Result<TextAnalysis> {
        self.subjects.lock().unwrap().push(text.to_string());
        self.hook.fire();
        if self.failing.iter().any(|k| text.contains(k.as_str())) {
            return Err(anyhow!("MockAnalyzer: analysis failed"));
        }
        let sentiment = self
            .keyword_labels
            .iter()
            .find(|(k, _)| text.contains(k.as_str()))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| self.default.sentiment.clone());
        Ok(TextAnalysis {
            sentiment,
            summary: self.default.summary.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AnalysisEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalysisEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(RunStage, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AnalysisEvent::Status { stage, message } => Some((stage, message)),
                _ => None,
            })
            .collect()
    }

    pub fn terminal_events(&self) -> Vec<AnalysisEvent> {
        self.events()
            .into_iter()
            .filter(AnalysisEvent::is_terminal)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: AnalysisEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// MockProbe
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockProbe {
    location: Mutex<Option<String>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, location: &str) {
        *self.location.lock().unwrap() = Some(location.to_string());
    }
}

#[async_trait]
impl LocationProbe for MockProbe {
    async fn location(&self) -> Option<String> {
        self.location.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Watch-page URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// A cluster whose members have the given texts, in order, at the origin.
pub fn cluster_of(texts: &[&str]) -> Cluster {
    Cluster {
        members: texts
            .iter()
            .enumerate()
            .map(|(i, t)| CommentEmbedding::new(i, *t, vec![0.0, 0.0]))
            .collect(),
        centroid: vec![0.0, 0.0],
    }
}

pub fn numbered_comments(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix} {i}")).collect()
}
