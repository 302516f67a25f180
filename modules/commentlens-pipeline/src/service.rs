use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use commentlens_common::{AnalysisEvent, FailureReason, RunToken};

use crate::orchestrator::{AnalysisOrchestrator, RunOutcome};
use crate::watcher::ContextChange;

/// Something that happened on the host side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The host navigated to `location`.
    Navigated(String),
    /// The user asked to analyze the current context again.
    Reanalyze,
}

/// Polled source of the host's current location. Fallback for hosts that do
/// not deliver navigation signals reliably.
#[async_trait]
pub trait LocationProbe: Send + Sync {
    async fn location(&self) -> Option<String>;
}

/// Reads the current location from the first line of a file.
pub struct FileLocationProbe {
    path: PathBuf,
}

impl FileLocationProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LocationProbe for FileLocationProbe {
    async fn location(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents
                .lines()
                .next()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Location file unreadable");
                None
            }
        }
    }
}

/// Turns host triggers into analysis runs.
pub struct AnalysisService {
    orchestrator: Arc<AnalysisOrchestrator>,
    poll_interval: Duration,
}

impl AnalysisService {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            poll_interval,
        }
    }

    /// Apply one trigger. Returns the handle of the run it started, if any.
    pub fn handle(&self, trigger: Trigger) -> Option<JoinHandle<RunOutcome>> {
        let watcher = self.orchestrator.watcher();
        match trigger {
            Trigger::Navigated(location) => match watcher.observe(&location) {
                ContextChange::Started { token, context_id } => Some(self.spawn_run(token, context_id)),
                ContextChange::Invalidated { previous } => {
                    debug!(previous = previous.as_str(), "Clearing results");
                    self.orchestrator.sink().emit(AnalysisEvent::Cleared);
                    None
                }
                ContextChange::Unchanged => None,
            },
            Trigger::Reanalyze => match watcher.restart() {
                Some((token, context_id)) => Some(self.spawn_run(token, context_id)),
                None => {
                    warn!("Re-analysis requested without an analyzable context");
                    self.orchestrator.sink().emit(AnalysisEvent::Failed {
                        reason: FailureReason::NoContext,
                        message: "Could not find a video ID on this page.".to_string(),
                    });
                    None
                }
            },
        }
    }

    fn spawn_run(&self, token: RunToken, context_id: String) -> JoinHandle<RunOutcome> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run(token, &context_id).await })
    }

    /// Process triggers until the channel closes, polling `probe` (if any)
    /// every poll interval and treating a changed location as a navigation.
    /// Runs still in flight when the channel closes are awaited before
    /// returning.
    pub async fn watch(
        &self,
        mut triggers: mpsc::Receiver<Trigger>,
        probe: Option<Arc<dyn LocationProbe>>,
    ) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            polling = probe.is_some(),
            "Watching for context changes"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_polled: Option<String> = None;
        let mut runs: Vec<JoinHandle<RunOutcome>> = Vec::new();

        loop {
            tokio::select! {
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => track(&mut runs, self.handle(trigger)),
                    None => {
                        info!(in_flight = runs.len(), "Trigger channel closed, stopping watcher");
                        break;
                    }
                },
                _ = ticker.tick(), if probe.is_some() => {
                    let Some(probe) = &probe else { continue };
                    let current = probe.location().await;
                    if current != last_polled {
                        last_polled = current.clone();
                        if let Some(location) = current {
                            debug!(location = location.as_str(), "Polled location changed");
                            track(&mut runs, self.handle(Trigger::Navigated(location)));
                        }
                    }
                }
            }
        }

        for run in runs {
            if let Err(e) = run.await {
                warn!(error = %e, "Analysis task panicked");
            }
        }
    }
}

fn track(runs: &mut Vec<JoinHandle<RunOutcome>>, started: Option<JoinHandle<RunOutcome>>) {
    runs.retain(|run| !run.is_finished());
    runs.extend(started);
}
