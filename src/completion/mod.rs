//! The multi-strategy completion engine.
//!
//! Four interchangeable strategies know how to ask a tool for completion
//! candidates. When the detection cache does not already know which protocol
//! a tool speaks, all strategies race under a shared deadline; the first to
//! produce a successful answer wins and is cached for subsequent keystrokes.

pub mod cobra;
pub mod detection;
pub mod env;
pub mod flag;
pub mod registry;
pub mod script;

use crate::{Result, error, exec, paths::Paths};
use async_trait::async_trait;
use snafu::ResultExt;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinSet, time::timeout};
use tokio_util::sync::CancellationToken;

use detection::DetectionCache;
use registry::RegistryClient;

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub value: String,
    pub description: String,
}

impl Suggestion {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: String::new(),
        }
    }
}

/// Keep only suggestions whose value starts with `prefix`; an empty prefix
/// passes everything through.
pub fn filter(suggestions: Vec<Suggestion>, prefix: &str) -> Vec<Suggestion> {
    if prefix.is_empty() {
        return suggestions;
    }
    suggestions
        .into_iter()
        .filter(|s| s.value.starts_with(prefix))
        .collect()
}

/// A mechanism for asking a tool for completion candidates.
///
/// `supports` is the cheap(ish) probe; `complete` produces the candidates.
/// Both run subprocesses under the shared 3-second deadline, so a racing
/// engine never waits on a single strategy for longer than that.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn supports(&self, tool: &str, args: &[String]) -> bool;

    async fn complete(&self, tool: &str, args: &[String]) -> Result<Vec<Suggestion>>;
}

/// The engine's answer: suggestions plus which strategy produced them
/// (`"Cobra"`, `"Env (cached)"`, or `"none"` when nothing answered in time).
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub suggestions: Vec<Suggestion>,
    pub source: String,
}

pub struct CompletionEngine {
    strategies: Vec<Arc<dyn Strategy>>,
    detection: DetectionCache,
    deadline: Duration,
}

impl CompletionEngine {
    /// Build the engine with the standard strategy set, in detection priority
    /// order: Cobra, Flag, Env, Script.
    pub fn new(paths: &Paths, dev_mode: bool) -> Self {
        let registry = RegistryClient::new(paths.clone(), dev_mode);
        Self {
            strategies: vec![
                Arc::new(cobra::CobraStrategy),
                Arc::new(flag::FlagStrategy),
                Arc::new(env::EnvStrategy),
                Arc::new(script::ScriptStrategy::new(paths.clone(), registry)),
            ],
            detection: DetectionCache::open(paths.detection_file()),
            deadline: exec::DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Engine over an arbitrary strategy set, for tests and embedding.
    pub fn with_strategies(strategies: Vec<Arc<dyn Strategy>>, detection: DetectionCache) -> Self {
        Self {
            strategies,
            detection,
            deadline: exec::DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn detection(&self) -> &DetectionCache {
        &self.detection
    }

    /// Synchronous entry point: builds a runtime for the race and tears it
    /// down with the invocation. `shutdown_background` keeps an abandoned
    /// blocking registry fetch from stalling the exit.
    pub fn complete(&self, tool: &str, args: &[String]) -> Result<CompletionResult> {
        let runtime = tokio::runtime::Runtime::new().context(error::TokioRuntimeSnafu)?;
        let result = runtime.block_on(self.complete_async(tool, args));
        runtime.shutdown_background();
        result
    }

    pub async fn complete_async(&self, tool: &str, args: &[String]) -> Result<CompletionResult> {
        // A cached detection short-circuits the race. Even an empty answer
        // from the cached strategy is authoritative; only an error sends us
        // back to detection.
        if let Some(cached_name) = self.detection.get(tool) {
            if let Some(strategy) = self
                .strategies
                .iter()
                .find(|s| s.name() == cached_name)
            {
                match timeout(self.deadline, strategy.complete(tool, args)).await {
                    Ok(Ok(suggestions)) => {
                        return Ok(CompletionResult {
                            suggestions,
                            source: format!("{cached_name} (cached)"),
                        });
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(tool, strategy = %cached_name, error = %e, "cached strategy failed; re-detecting");
                    }
                    Err(_) => {
                        tracing::debug!(tool, strategy = %cached_name, "cached strategy timed out; re-detecting");
                    }
                }
            }
        }

        self.race(tool, args).await
    }

    /// Race every strategy under the shared deadline. The first message on
    /// the channel wins; everything else is cancelled and joined before this
    /// function returns, so no probe subprocess outlives the engine call.
    async fn race(&self, tool: &str, args: &[String]) -> Result<CompletionResult> {
        let (tx, mut rx) = mpsc::channel(self.strategies.len().max(1));
        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for strategy in &self.strategies {
            let strategy = Arc::clone(strategy);
            let tx = tx.clone();
            let token = token.clone();
            let tool = tool.to_string();
            let args = args.to_vec();

            tasks.spawn(async move {
                let work = async {
                    if !strategy.supports(&tool, &args).await {
                        return;
                    }
                    match strategy.complete(&tool, &args).await {
                        Ok(suggestions) => {
                            let _ = tx.send((strategy.name(), suggestions)).await;
                        }
                        Err(e) => {
                            tracing::debug!(
                                strategy = strategy.name(),
                                error = %e,
                                "completion strategy lost the race"
                            );
                        }
                    }
                };

                tokio::select! {
                    () = token.cancelled() => {}
                    () = work => {}
                }
            });
        }
        drop(tx);

        let winner = timeout(self.deadline, rx.recv()).await;

        // Cancel the losers and join every task: subprocesses get reaped and
        // file handles closed before we hand back a result.
        token.cancel();
        while tasks.join_next().await.is_some() {}

        match winner {
            Ok(Some((name, suggestions))) => {
                if let Err(e) = self.detection.set(tool, name) {
                    tracing::debug!(error = %e, "failed to persist completion detection");
                }
                Ok(CompletionResult {
                    suggestions,
                    source: name.to_string(),
                })
            }
            Ok(None) | Err(_) => Ok(CompletionResult {
                suggestions: Vec::new(),
                source: "none".to_string(),
            }),
        }
    }
}
