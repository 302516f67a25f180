use std::sync::{Arc, Mutex};

use commentlens_common::{AnalysisEvent, FailureReason, RunStage, RunToken};
use commentlens_pipeline::testing::{
    numbered_comments, watch_url, MockAnalyzer, MockCommentSource, MockEmbedder, RecordingSink,
};
use commentlens_pipeline::{
    AnalysisOrchestrator, ContextChange, ContextWatcher, KMeansClusterer, PipelineDeps, RunOutcome,
};

const VIDEO: &str = "vid123";

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    watcher: Arc<ContextWatcher>,
    sink: Arc<RecordingSink>,
    source: Arc<MockCommentSource>,
    embedder: Arc<MockEmbedder>,
    analyzer: Arc<MockAnalyzer>,
    orchestrator: AnalysisOrchestrator,
}

impl Harness {
    fn new(
        watcher: Arc<ContextWatcher>,
        source: MockCommentSource,
        embedder: MockEmbedder,
        analyzer: MockAnalyzer,
    ) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let source = Arc::new(source);
        let embedder = Arc::new(embedder);
        let analyzer = Arc::new(analyzer);
        let deps = PipelineDeps {
            comments: source.clone(),
            embedder: embedder.clone(),
            analyzer: analyzer.clone(),
        };
        let orchestrator = AnalysisOrchestrator::new(deps, watcher.clone(), sink.clone())
            .with_clusterer(KMeansClusterer::default().with_seed(42));
        Self {
            watcher,
            sink,
            source,
            embedder,
            analyzer,
            orchestrator,
        }
    }

    fn start(&self, video_id: &str) -> RunToken {
        match self.watcher.observe(&watch_url(video_id)) {
            ContextChange::Started { token, .. } => token,
            other => panic!("expected a new run, got {other:?}"),
        }
    }

    fn status_messages(&self) -> Vec<String> {
        self.sink.statuses().into_iter().map(|(_, m)| m).collect()
    }
}

fn source_with(n: usize) -> MockCommentSource {
    MockCommentSource::new().on_context(VIDEO, numbered_comments("comment", n))
}

fn failure(outcome: &RunOutcome) -> FailureReason {
    match outcome {
        RunOutcome::Failed { reason, .. } => *reason,
        other => panic!("expected failure, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Successful runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_comments_publish_three_singleton_clusters() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(3),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", "people like it"),
    );
    let token = h.start(VIDEO);

    let outcome = h.orchestrator.run(token, VIDEO).await;

    let RunOutcome::Completed(result) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(result.context_id, VIDEO);
    assert_eq!(result.cluster_analysis.len(), 3);
    assert!(result.cluster_analysis.iter().all(|c| c.cluster_size == 1));
    assert_eq!(result.overall_sentiment.positive, 3);
    assert_eq!(result.overall_sentiment.total, 3);

    assert_eq!(
        h.status_messages(),
        vec![
            "Initializing...",
            "Fetching comments...",
            "Found 3 comments. Getting embeddings...",
            "Getting embeddings (3/3)...",
            "Received embeddings for 3 comments. Performing clustering...",
            "Clustering complete. Found 3 distinct discussion points. Analyzing...",
            "Analysis complete. 3 discussion points analyzed.",
        ]
    );
    assert_eq!(h.sink.terminal_events(), vec![AnalysisEvent::Completed(result)]);
}

#[tokio::test]
async fn embedding_failures_shrink_the_clustered_set() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(12),
        MockEmbedder::new(4).fail_on("comment 3").fail_on("comment 7"),
        MockAnalyzer::constant("Neutral", "mixed"),
    );
    let token = h.start(VIDEO);

    let RunOutcome::Completed(result) = h.orchestrator.run(token, VIDEO).await else {
        panic!("expected completion");
    };

    assert!(h
        .status_messages()
        .contains(&"Received embeddings for 10 comments. Performing clustering...".to_string()));
    let clustered: usize = result.cluster_analysis.iter().map(|c| c.cluster_size).sum();
    assert_eq!(clustered, 10);
    assert!(result.cluster_analysis.len() <= 3);
    assert!(result.overall_sentiment.total as usize <= result.cluster_analysis.len());
    for cluster in &result.cluster_analysis {
        assert!(!cluster.cluster_comments.contains(&"comment 3".to_string()));
        assert!(!cluster.cluster_comments.contains(&"comment 7".to_string()));
    }
}

#[tokio::test]
async fn separated_groups_are_tallied_by_label() {
    let mut source_comments = Vec::new();
    let mut embedder = MockEmbedder::new(2);
    for (group, (x, y)) in [("love", (0.0, 0.0)), ("hate", (50.0, 50.0)), ("shrug", (-50.0, 50.0))] {
        for i in 0..10 {
            let text = format!("{group} {i}");
            let jitter = i as f64 * 0.01;
            embedder = embedder.respond_with(&text, vec![x + jitter, y - jitter]);
            source_comments.push(text);
        }
    }
    let analyzer = MockAnalyzer::constant("Neutral", "summary")
        .label_when("love", "Positive")
        .label_when("hate", "NEGATIVE");
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        MockCommentSource::new().on_context(VIDEO, source_comments),
        embedder,
        analyzer,
    );
    let token = h.start(VIDEO);

    let RunOutcome::Completed(result) = h.orchestrator.run(token, VIDEO).await else {
        panic!("expected completion");
    };

    let clustered: usize = result.cluster_analysis.iter().map(|c| c.cluster_size).sum();
    assert_eq!(clustered, 30);
    let tally = &result.overall_sentiment;
    assert_eq!(tally.total as usize, result.cluster_analysis.len());
    assert_eq!(tally.bucketed(), tally.total);
    for cluster in &result.cluster_analysis {
        assert_eq!(cluster.representative_text, cluster.cluster_comments[0]);
    }
}

#[tokio::test]
async fn unknown_labels_count_toward_total_only() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(3),
        MockEmbedder::new(4),
        MockAnalyzer::constant("good", "fine"),
    );
    let token = h.start(VIDEO);

    let RunOutcome::Completed(result) = h.orchestrator.run(token, VIDEO).await else {
        panic!("expected completion");
    };
    assert_eq!(result.overall_sentiment.total, 3);
    assert_eq!(result.overall_sentiment.bucketed(), 0);
}

#[tokio::test]
async fn failed_cluster_analysis_is_skipped() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(3),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Negative", "meh").fail_on("comment 1"),
    );
    let token = h.start(VIDEO);

    let RunOutcome::Completed(result) = h.orchestrator.run(token, VIDEO).await else {
        panic!("expected completion");
    };
    assert_eq!(result.cluster_analysis.len(), 2);
    assert_eq!(result.overall_sentiment.negative, 2);
    assert_eq!(h.analyzer.call_count(), 3);
}

#[tokio::test]
async fn embedding_requests_are_all_in_flight_together() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(15),
        MockEmbedder::new(4).gated(15),
        MockAnalyzer::constant("Positive", ""),
    );
    let token = h.start(VIDEO);

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        h.orchestrator.run(token, VIDEO),
    )
    .await
    .expect("embedding requests were not issued together");

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(h.embedder.call_count(), 15);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_comment_list_fails_with_no_comments() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(0),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", ""),
    );
    let token = h.start(VIDEO);

    let outcome = h.orchestrator.run(token, VIDEO).await;

    assert_eq!(failure(&outcome), FailureReason::NoComments);
    assert_eq!(h.embedder.call_count(), 0);
    let terminal = h.sink.terminal_events();
    assert_eq!(terminal.len(), 1);
    assert!(matches!(
        terminal[0],
        AnalysisEvent::Failed { reason: FailureReason::NoComments, .. }
    ));
}

#[tokio::test]
async fn failed_fetch_reports_no_comments_with_cause() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        MockCommentSource::new(),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", ""),
    );
    let token = h.start(VIDEO);

    match h.orchestrator.run(token, VIDEO).await {
        RunOutcome::Failed { reason, message } => {
            assert_eq!(reason, FailureReason::NoComments);
            assert!(message.starts_with("Failed to fetch comments"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn all_embeddings_failing_skips_clustering() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(5),
        MockEmbedder::new(4).fail_all(),
        MockAnalyzer::constant("Positive", ""),
    );
    let token = h.start(VIDEO);

    let outcome = h.orchestrator.run(token, VIDEO).await;

    assert_eq!(failure(&outcome), FailureReason::NoEmbeddings);
    assert_eq!(h.analyzer.call_count(), 0);
    assert!(!h
        .sink
        .statuses()
        .iter()
        .any(|(stage, _)| *stage == RunStage::Clustering));
}

#[tokio::test]
async fn every_analysis_failing_reports_no_analysis() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(4),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", "").fail_on("comment"),
    );
    let token = h.start(VIDEO);

    let outcome = h.orchestrator.run(token, VIDEO).await;
    assert_eq!(failure(&outcome), FailureReason::NoAnalysis);
}

// ---------------------------------------------------------------------------
// Superseded runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn navigation_during_embedding_publishes_nothing() {
    let watcher = Arc::new(ContextWatcher::youtube());
    let navigator = watcher.clone();
    let h = Harness::new(
        watcher,
        source_with(20),
        MockEmbedder::new(4).on_first_call(move || {
            navigator.observe(&watch_url("other"));
        }),
        MockAnalyzer::constant("Positive", ""),
    );
    let token = h.start(VIDEO);

    let outcome = h.orchestrator.run(token, VIDEO).await;

    assert_eq!(outcome, RunOutcome::Superseded);
    assert!(h.sink.terminal_events().is_empty());
    assert_eq!(h.analyzer.call_count(), 0);
    assert_eq!(
        h.status_messages().last().map(String::as_str),
        Some("Found 20 comments. Getting embeddings...")
    );
}

#[tokio::test]
async fn leaving_the_video_during_fetch_stops_the_run() {
    let watcher = Arc::new(ContextWatcher::youtube());
    let navigator = watcher.clone();
    let h = Harness::new(
        watcher,
        source_with(5).on_first_call(move || {
            navigator.observe("https://www.youtube.com/");
        }),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", ""),
    );
    let token = h.start(VIDEO);

    let outcome = h.orchestrator.run(token, VIDEO).await;

    assert_eq!(outcome, RunOutcome::Superseded);
    assert_eq!(h.embedder.call_count(), 0);
    assert!(h.sink.terminal_events().is_empty());
}

#[tokio::test]
async fn restart_during_summaries_stops_after_current_cluster() {
    let watcher = Arc::new(ContextWatcher::youtube());
    let restarter = watcher.clone();
    let h = Harness::new(
        watcher,
        source_with(3),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", "").on_first_call(move || {
            restarter.restart();
        }),
    );
    let token = h.start(VIDEO);

    let outcome = h.orchestrator.run(token, VIDEO).await;

    assert_eq!(outcome, RunOutcome::Superseded);
    assert_eq!(h.analyzer.call_count(), 1);
    assert!(h.sink.terminal_events().is_empty());
}

#[tokio::test]
async fn only_the_newest_run_for_a_context_publishes() {
    let watcher = Arc::new(ContextWatcher::youtube());
    let restarter = watcher.clone();
    let next_run: Arc<Mutex<Option<(RunToken, String)>>> = Arc::new(Mutex::new(None));
    let slot = next_run.clone();
    let h = Harness::new(
        watcher,
        source_with(3).on_first_call(move || {
            *slot.lock().unwrap() = restarter.restart();
        }),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", ""),
    );
    let first = h.start(VIDEO);

    let first_outcome = h.orchestrator.run(first, VIDEO).await;
    let (second, context_id) = next_run.lock().unwrap().take().unwrap();
    let second_outcome = h.orchestrator.run(second, &context_id).await;

    assert_eq!(first_outcome, RunOutcome::Superseded);
    assert!(matches!(second_outcome, RunOutcome::Completed(_)));
    assert_eq!(h.source.call_count(), 2);
    let completed = h
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, AnalysisEvent::Completed(_)))
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn token_minted_before_run_starts_is_already_stale() {
    let h = Harness::new(
        Arc::new(ContextWatcher::youtube()),
        source_with(3),
        MockEmbedder::new(4),
        MockAnalyzer::constant("Positive", ""),
    );
    let stale = h.start(VIDEO);
    h.start("newer");

    let outcome = h.orchestrator.run(stale, VIDEO).await;

    assert_eq!(outcome, RunOutcome::Superseded);
    assert!(h.sink.events().is_empty());
    assert_eq!(h.source.call_count(), 0);
}
