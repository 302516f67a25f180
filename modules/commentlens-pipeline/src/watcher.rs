use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use commentlens_common::{youtube_video_id, AnalysisEvent, RunToken};

use crate::traits::EventSink;

/// Maps a host location (e.g. the current URL) to an analyzable context id.
pub trait ContextResolver: Send + Sync {
    fn resolve(&self, location: &str) -> Option<String>;
}

/// Resolves YouTube watch pages to their video id.
pub struct YouTubeResolver;

impl ContextResolver for YouTubeResolver {
    fn resolve(&self, location: &str) -> Option<String> {
        youtube_video_id(location)
    }
}

/// Result of feeding a location to the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextChange {
    /// A new context became active; a run should start with this token.
    Started { token: RunToken, context_id: String },
    /// The active context went away; its token is no longer current.
    Invalidated { previous: String },
    Unchanged,
}

#[derive(Debug, Default)]
struct WatchState {
    context_id: Option<String>,
    token: Option<RunToken>,
}

/// Owns the active context and the token of the run allowed to publish for it.
///
/// Tokens are only ever replaced, never mutated. Publication goes through
/// [`ContextWatcher::emit_if_current`], which holds the same lock as token
/// minting, so a superseded run cannot publish after a newer token exists.
pub struct ContextWatcher {
    resolver: Box<dyn ContextResolver>,
    state: Mutex<WatchState>,
}

impl ContextWatcher {
    pub fn new(resolver: impl ContextResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            state: Mutex::new(WatchState::default()),
        }
    }

    pub fn youtube() -> Self {
        Self::new(YouTubeResolver)
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// React to the host reporting `location` as current.
    pub fn observe(&self, location: &str) -> ContextChange {
        let resolved = self.resolver.resolve(location);
        let mut state = self.state();

        match resolved {
            Some(context_id) if state.context_id.as_deref() == Some(context_id.as_str()) => {
                debug!(context_id = context_id.as_str(), "Context unchanged");
                ContextChange::Unchanged
            }
            Some(context_id) => {
                let token = RunToken::mint();
                info!(
                    context_id = context_id.as_str(),
                    %token,
                    previous = ?state.context_id,
                    "Context changed, starting new run"
                );
                state.context_id = Some(context_id.clone());
                state.token = Some(token);
                ContextChange::Started { token, context_id }
            }
            None => match state.context_id.take() {
                Some(previous) => {
                    info!(previous = previous.as_str(), "Context no longer analyzable");
                    state.token = None;
                    ContextChange::Invalidated { previous }
                }
                None => ContextChange::Unchanged,
            },
        }
    }

    /// Start a fresh run for the current context (explicit user request).
    /// Supersedes any run already in flight. Returns `None` without a context.
    pub fn restart(&self) -> Option<(RunToken, String)> {
        let mut state = self.state();
        let context_id = state.context_id.clone()?;
        let token = RunToken::mint();
        info!(context_id = context_id.as_str(), %token, "Re-analysis requested");
        state.token = Some(token);
        Some((token, context_id))
    }

    pub fn current_token(&self) -> Option<RunToken> {
        self.state().token
    }

    pub fn current_context(&self) -> Option<String> {
        self.state().context_id.clone()
    }

    pub fn is_current(&self, token: &RunToken) -> bool {
        self.state().token.as_ref() == Some(token)
    }

    /// Deliver `event` only if `token` is still current. Returns whether the
    /// event was delivered.
    pub fn emit_if_current(
        &self,
        token: &RunToken,
        sink: &dyn EventSink,
        event: AnalysisEvent,
    ) -> bool {
        self.emit_all_if_current(token, sink, [event])
    }

    /// Deliver all of `events` under one check, so none or all arrive.
    pub fn emit_all_if_current(
        &self,
        token: &RunToken,
        sink: &dyn EventSink,
        events: impl IntoIterator<Item = AnalysisEvent>,
    ) -> bool {
        let state = self.state();
        if state.token.as_ref() != Some(token) {
            debug!(%token, "Dropping events from superseded run");
            return false;
        }
        for event in events {
            sink.emit(event);
        }
        true
    }
}
