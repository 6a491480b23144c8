//! The probe, classify, retry loop.
//!
//! One target runs as an explicit state machine:
//!
//! ```text
//! Probing ──empty──▶ Done
//!    │
//!    ▼
//! Classifying ─▶ Deciding ─completed─▶ Done
//!    ▲              │ error ─────────▶ Failed
//!    │              ▼
//!    └──────── Retrying ─limit reached─▶ Done
//! ```
//!
//! Steps within a target are strictly sequential. Targets are independent
//! and [`Orchestrator::run_targets`] runs them concurrently, each with its
//! own state and save directory.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use scanwright_core::{
    normalize_configuration, slug, ConfigError, JudgeMode, ObservationSet, ScanRequest, Verdict,
    VerdictStatus,
};

use crate::artifacts::ArtifactLocation;
use crate::config::RuntimeConfig;
use crate::judges::Judge;
use crate::probe::{ProbeError, ProbeRunner};
use crate::resilience::{choose_next_probe, JudgeUsage, UsageTracker};
use crate::store::{probe_label, ResultStore, StoreError, FINAL_OBSERVATIONS, FINAL_VERDICT};

/// Hard failures. Judge trouble never shows up here; it ends a target as
/// [`LoopPhase::Failed`] instead.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("probe failed for target '{target}': {source}")]
    Probe {
        target: String,
        #[source]
        source: ProbeError,
    },

    #[error("result store failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("judge '{0}' is not configured; call configure() before starting the loop")]
    NotConfigured(String),

    #[error("processing of target '{target}' was cancelled")]
    Cancelled { target: String },

    #[error("orchestrator has no {0}")]
    MissingCollaborator(&'static str),
}

/// Loop states. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Probing,
    Classifying,
    Deciding,
    Retrying,
    Done,
    Failed,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Done | LoopPhase::Failed)
    }
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopPhase::Probing => "probing",
            LoopPhase::Classifying => "classifying",
            LoopPhase::Deciding => "deciding",
            LoopPhase::Retrying => "retrying",
            LoopPhase::Done => "done",
            LoopPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation, checked before each probe and each classification.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to run for a target: base probe, judge mode and where results go.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub base_configuration: String,
    pub mode: JudgeMode,
    pub save_dir: PathBuf,
}

impl ScanPlan {
    pub fn new(base_configuration: impl Into<String>, mode: JudgeMode, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_configuration: base_configuration.into(),
            mode,
            save_dir: save_dir.into(),
        }
    }

    pub fn from_request(request: &ScanRequest) -> Self {
        Self::new(
            request.probe.base_configuration(),
            request.judge.mode(),
            request.probe.save_dir(),
        )
    }

    /// The same plan, saving under `<save_dir>/<target-slug>`.
    pub fn for_target(&self, target: &str) -> Self {
        Self {
            save_dir: self.save_dir.join(slug(target)),
            ..self.clone()
        }
    }
}

/// Final outcome for one target.
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub target: String,
    /// `Done` or `Failed`
    pub phase: LoopPhase,
    /// Mode the judge was actually asked in
    pub mode: JudgeMode,
    pub verdict: Verdict,
    /// Union of every probe's observations
    pub observations: ObservationSet,
    /// Retry probes run after the initial one
    pub attempts: u32,
    /// Every configuration probed, in order
    pub configurations: Vec<String>,
    pub judge_calls: u32,
    /// The retry limit ended the loop before a `completed` verdict
    pub exhausted: bool,
    pub save_dir: PathBuf,
}

impl LoopReport {
    pub fn is_done(&self) -> bool {
        self.phase == LoopPhase::Done
    }
}

/// Per-target loop state. Never shared between targets.
struct LoopState {
    target: String,
    phase: LoopPhase,
    observations: ObservationSet,
    current_configuration: String,
    history: Vec<String>,
    attempts: u32,
    judge_calls: u32,
    verdict: Verdict,
    exhausted: bool,
}

impl LoopState {
    fn new(target: &str, base_configuration: &str) -> Self {
        let configuration = normalize_configuration(base_configuration);
        Self {
            target: target.to_string(),
            phase: LoopPhase::Probing,
            observations: ObservationSet::empty(target, configuration.clone()),
            current_configuration: configuration,
            history: Vec::new(),
            attempts: 0,
            judge_calls: 0,
            verdict: Verdict::empty(),
            exhausted: false,
        }
    }

    fn transition(&mut self, next: LoopPhase) {
        tracing::debug!(
            scan_target = %self.target,
            from = %self.phase,
            to = %next,
            attempt = self.attempts,
            "Loop transition"
        );
        self.phase = next;
    }

    fn into_report(self, mode: JudgeMode, save_dir: &Path) -> LoopReport {
        LoopReport {
            target: self.target,
            phase: self.phase,
            mode,
            verdict: self.verdict,
            observations: self.observations,
            attempts: self.attempts,
            configurations: self.history,
            judge_calls: self.judge_calls,
            exhausted: self.exhausted,
            save_dir: save_dir.to_path_buf(),
        }
    }
}

/// Drives probes and a judge for one or more targets.
pub struct Orchestrator {
    judge: Arc<dyn Judge>,
    probe: Arc<dyn ProbeRunner>,
    store: Arc<dyn ResultStore>,
    config: RuntimeConfig,
    usage: Option<Arc<UsageTracker>>,
}

impl Orchestrator {
    /// The judge must already be configured.
    pub fn new(
        judge: Arc<dyn Judge>,
        probe: Arc<dyn ProbeRunner>,
        store: Arc<dyn ResultStore>,
        config: RuntimeConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        if !judge.is_configured() {
            return Err(OrchestratorError::NotConfigured(judge.name().to_string()));
        }
        Ok(Self {
            judge,
            probe,
            store,
            config,
            usage: None,
        })
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Judge usage so far, when a tracker was attached.
    pub fn usage(&self) -> Option<JudgeUsage> {
        self.usage.as_ref().map(|u| u.snapshot())
    }

    /// Run the adaptive loop for one target.
    ///
    /// `plain` is not used for loop decisions; it is coerced to `restricted`.
    pub async fn run(
        &self,
        target: &str,
        plan: &ScanPlan,
        cancel: &CancelFlag,
    ) -> Result<LoopReport, OrchestratorError> {
        let mode = loop_mode(plan.mode);
        let mut state = LoopState::new(target, &plan.base_configuration);

        tracing::info!(
            scan_target = %target,
            configuration = %state.current_configuration,
            mode = %mode,
            max_attempts = self.config.max_attempts,
            "Starting adaptive loop"
        );

        while !state.phase.is_terminal() {
            match state.phase {
                LoopPhase::Probing => {
                    ensure_active(cancel, target)?;
                    let configuration = state.current_configuration.clone();
                    let set = self.probe(&mut state, &configuration, &plan.save_dir).await?;
                    if set.is_empty() {
                        tracing::info!(scan_target = %target, "Probe observed nothing, skipping judge");
                        state.observations = set;
                        state.verdict = Verdict::empty();
                        state.transition(LoopPhase::Done);
                    } else {
                        state.observations = set;
                        state.transition(LoopPhase::Classifying);
                    }
                }
                LoopPhase::Classifying => {
                    ensure_active(cancel, target)?;
                    state.verdict = self.classify(&mut state, mode, &plan.save_dir).await;
                    state.transition(LoopPhase::Deciding);
                }
                LoopPhase::Deciding => {
                    let next = match state.verdict.status {
                        VerdictStatus::Incomplete | VerdictStatus::FalsePositiveRich => {
                            LoopPhase::Retrying
                        }
                        VerdictStatus::Error => LoopPhase::Failed,
                        VerdictStatus::Completed | VerdictStatus::Empty => LoopPhase::Done,
                    };
                    state.transition(next);
                }
                LoopPhase::Retrying => {
                    if state.attempts >= self.config.max_attempts {
                        tracing::warn!(
                            scan_target = %target,
                            attempts = state.attempts,
                            status = ?state.verdict.status,
                            "Retry limit reached, keeping last verdict"
                        );
                        state.exhausted = true;
                        state.transition(LoopPhase::Done);
                        continue;
                    }

                    let next = choose_next_probe(
                        &state.verdict,
                        mode,
                        &state.current_configuration,
                        &self.config.fallback_configuration,
                    );
                    tracing::info!(
                        scan_target = %target,
                        attempt = state.attempts + 1,
                        next = ?next,
                        "Choosing next probe"
                    );

                    ensure_active(cancel, target)?;
                    let configuration = next.configuration().to_string();
                    let set = self.probe(&mut state, &configuration, &plan.save_dir).await?;
                    let added = state.observations.merge(&set);
                    state.attempts += 1;
                    state.current_configuration = configuration;

                    tracing::debug!(
                        scan_target = %target,
                        attempt = state.attempts,
                        added,
                        total = state.observations.len(),
                        "Merged retry observations"
                    );
                    state.transition(LoopPhase::Classifying);
                }
                LoopPhase::Done | LoopPhase::Failed => {}
            }
        }

        self.finish(state, mode, &plan.save_dir).await
    }

    /// Probe once and classify once, in any mode. No retries.
    pub async fn interpret(
        &self,
        target: &str,
        plan: &ScanPlan,
        cancel: &CancelFlag,
    ) -> Result<LoopReport, OrchestratorError> {
        let mut state = LoopState::new(target, &plan.base_configuration);

        ensure_active(cancel, target)?;
        let configuration = state.current_configuration.clone();
        let set = self.probe(&mut state, &configuration, &plan.save_dir).await?;
        state.observations = set;

        if state.observations.is_empty() {
            state.verdict = Verdict::empty();
            state.transition(LoopPhase::Done);
        } else {
            ensure_active(cancel, target)?;
            let verdict = self.classify(&mut state, plan.mode, &plan.save_dir).await;
            let phase = if verdict.is_error() {
                LoopPhase::Failed
            } else {
                LoopPhase::Done
            };
            state.verdict = verdict;
            state.transition(phase);
        }

        self.finish(state, plan.mode, &plan.save_dir).await
    }

    /// Run the loop for every target, at most `concurrency` at a time.
    ///
    /// Each target saves under its own sub-directory of the plan's save
    /// directory. Results come back in input order.
    pub async fn run_targets(
        &self,
        targets: &[String],
        plan: &ScanPlan,
        cancel: &CancelFlag,
    ) -> Vec<(String, Result<LoopReport, OrchestratorError>)> {
        let concurrency = self.config.concurrency.max(1);
        tracing::info!(targets = targets.len(), concurrency, "Processing targets");

        stream::iter(targets.iter().map(|target| {
            let plan = plan.for_target(target);
            async move {
                let result = self.run(target, &plan, cancel).await;
                if let Err(e) = &result {
                    tracing::error!(scan_target = %target, error = %e, "Target failed");
                }
                (target.clone(), result)
            }
        }))
        .buffered(concurrency)
        .collect()
        .await
    }

    async fn probe(
        &self,
        state: &mut LoopState,
        configuration: &str,
        save_dir: &Path,
    ) -> Result<ObservationSet, OrchestratorError> {
        let index = state.history.len() as u32;
        state.history.push(configuration.to_string());

        let set = self
            .probe
            .run(&state.target, configuration)
            .await
            .map_err(|source| OrchestratorError::Probe {
                target: state.target.clone(),
                source,
            })?;

        tracing::debug!(
            scan_target = %state.target,
            configuration,
            records = set.len(),
            "Probe returned"
        );
        self.store
            .save_observations(save_dir, &probe_label(index), &set)
            .await?;
        Ok(set)
    }

    async fn classify(&self, state: &mut LoopState, mode: JudgeMode, save_dir: &Path) -> Verdict {
        let location = ArtifactLocation::new(save_dir, state.attempts);
        let verdict = self.judge.classify(&state.observations, mode, &location).await;
        state.judge_calls += 1;

        tracing::info!(
            scan_target = %state.target,
            judge = self.judge.name(),
            attempt = state.attempts,
            status = ?verdict.status,
            records = state.observations.len(),
            "Classified observations"
        );
        verdict
    }

    async fn finish(
        &self,
        state: LoopState,
        mode: JudgeMode,
        save_dir: &Path,
    ) -> Result<LoopReport, OrchestratorError> {
        let report = state.into_report(mode, save_dir);

        self.store
            .save_observations(save_dir, FINAL_OBSERVATIONS, &report.observations)
            .await?;
        self.store
            .save_verdict(save_dir, FINAL_VERDICT, &report.verdict)
            .await?;

        tracing::info!(
            scan_target = %report.target,
            phase = %report.phase,
            status = ?report.verdict.status,
            records = report.observations.len(),
            attempts = report.attempts,
            exhausted = report.exhausted,
            "Target finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("judge", &self.judge)
            .field("config", &self.config)
            .finish()
    }
}

fn loop_mode(requested: JudgeMode) -> JudgeMode {
    if requested == JudgeMode::Plain {
        tracing::info!("Plain mode is not used for loop decisions, classifying in restricted mode");
        JudgeMode::Restricted
    } else {
        requested
    }
}

fn ensure_active(cancel: &CancelFlag, target: &str) -> Result<(), OrchestratorError> {
    if cancel.is_cancelled() {
        tracing::warn!(scan_target = %target, "Cancelled");
        return Err(OrchestratorError::Cancelled {
            target: target.to_string(),
        });
    }
    Ok(())
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    judge: Option<Arc<dyn Judge>>,
    probe: Option<Arc<dyn ProbeRunner>>,
    store: Option<Arc<dyn ResultStore>>,
    config: RuntimeConfig,
    usage: Option<Arc<UsageTracker>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            judge: None,
            probe: None,
            store: None,
            config: RuntimeConfig::default(),
            usage: None,
        }
    }

    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn probe_runner(mut self, probe: Arc<dyn ProbeRunner>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Tracker the judge records into, usually [`JudgeRegistry::usage`](crate::judges::JudgeRegistry::usage).
    pub fn usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let judge = self.judge.ok_or(OrchestratorError::MissingCollaborator("judge"))?;
        let probe = self
            .probe
            .ok_or(OrchestratorError::MissingCollaborator("probe runner"))?;
        let store = self
            .store
            .ok_or(OrchestratorError::MissingCollaborator("result store"))?;

        let mut orchestrator = Orchestrator::new(judge, probe, store, self.config)?;
        orchestrator.usage = self.usage;
        Ok(orchestrator)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{records, RecordingResultStore, ScriptedJudge, ScriptedProbeRunner};
    use proptest::prelude::*;

    fn incomplete(next: &[&str]) -> Verdict {
        Verdict::new(VerdictStatus::Incomplete)
            .with_next_arguments(next.iter().map(|s| s.to_string()).collect())
    }

    fn completed() -> Verdict {
        Verdict::new(VerdictStatus::Completed)
    }

    fn orchestrator(
        judge: &ScriptedJudge,
        probe: &ScriptedProbeRunner,
        store: &Arc<RecordingResultStore>,
        config: RuntimeConfig,
    ) -> Orchestrator {
        Orchestrator::builder()
            .judge(Arc::new(judge.clone()))
            .probe_runner(Arc::new(probe.clone()))
            .store(store.clone())
            .config(config)
            .build()
            .unwrap()
    }

    fn plan(base: &str, mode: JudgeMode) -> ScanPlan {
        ScanPlan::new(base, mode, "out/scan")
    }

    #[tokio::test]
    async fn test_end_to_end_light_probe_is_empty() {
        let judge = ScriptedJudge::always(completed());
        let probe = ScriptedProbeRunner::new().on("light", Vec::new());
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .run("10.0.0.9", &plan("light", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Done);
        assert_eq!(report.verdict.status, VerdictStatus::Empty);
        assert!(report.observations.is_empty());
        assert_eq!(report.judge_calls, 0);
        assert!(judge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_suggestion_then_completed() {
        let aggressive = records("x", 5);
        let mut deep = records("x", 8);
        deep.rotate_left(2);

        let judge = ScriptedJudge::new(vec![incomplete(&["deep"]), completed()]);
        let probe = ScriptedProbeRunner::new()
            .on("aggressive", aggressive)
            .on("deep", deep);
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .run("10.0.0.9", &plan("aggressive", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Done);
        assert_eq!(report.verdict.status, VerdictStatus::Completed);
        assert_eq!(report.observations.len(), 8);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.configurations, vec!["aggressive", "deep"]);
        assert!(!report.exhausted);

        let calls = judge.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].observation_count, 5);
        assert_eq!(calls[1].observation_count, 8);
        assert_eq!(calls[1].attempt, 1);
        assert!(calls.iter().all(|c| c.mode == JudgeMode::Suggesting));
    }

    #[tokio::test]
    async fn test_bounded_termination() {
        for max_attempts in [0, 1, 3, 5] {
            let judge = ScriptedJudge::always(incomplete(&[]));
            let probe = ScriptedProbeRunner::new()
                .on("-A", records("x", 2))
                .on("-sS -T2", records("x", 3));
            let store = Arc::new(RecordingResultStore::new());
            let config = RuntimeConfig::default().with_max_attempts(max_attempts);
            let orch = orchestrator(&judge, &probe, &store, config);

            let report = orch
                .run("host", &plan("-A", JudgeMode::Restricted), &CancelFlag::new())
                .await
                .unwrap();

            assert_eq!(report.phase, LoopPhase::Done, "max {max_attempts}");
            assert_eq!(report.attempts, max_attempts);
            assert_eq!(report.judge_calls, max_attempts + 1);
            assert_eq!(probe.calls().len() as u32, max_attempts + 1);
            assert!(report.exhausted);
            assert_eq!(report.verdict.status, VerdictStatus::Incomplete);
        }
    }

    #[tokio::test]
    async fn test_cycle_guard_uses_static_fallback() {
        let judge = ScriptedJudge::new(vec![incomplete(&["-A", "-T4"]), completed()]);
        let probe = ScriptedProbeRunner::new()
            .on("-A -T4", records("x", 2))
            .on("-sS -T2", records("x", 3));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .run("host", &plan("-A  -T4", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(probe.configurations(), vec!["-A -T4", "-sS -T2"]);
        assert_eq!(report.observations.len(), 3);
        assert!(report.is_done());
    }

    #[tokio::test]
    async fn test_non_suggesting_modes_use_fallback() {
        let judge = ScriptedJudge::new(vec![
            Verdict::new(VerdictStatus::FalsePositiveRich).with_next_arguments(vec!["-p-".to_string()]),
            completed(),
        ]);
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 1));
        let store = Arc::new(RecordingResultStore::new());
        let config = RuntimeConfig::default().with_fallback_configuration("-sT");
        let orch = orchestrator(&judge, &probe, &store, config);

        orch.run("host", &plan("-A", JudgeMode::Restricted), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(probe.configurations(), vec!["-A", "-sT"]);
    }

    #[tokio::test]
    async fn test_plain_is_coerced_to_restricted_in_loop() {
        let judge = ScriptedJudge::always(completed());
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 1));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .run("host", &plan("-A", JudgeMode::Plain), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.mode, JudgeMode::Restricted);
        assert_eq!(judge.calls()[0].mode, JudgeMode::Restricted);
    }

    #[tokio::test]
    async fn test_error_verdict_fails_without_retry() {
        let judge = ScriptedJudge::always(Verdict::error("authentication failed: invalid key"));
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 4));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .run("host", &plan("-A", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Failed);
        assert!(!report.is_done());
        assert!(report.verdict.is_error());
        assert_eq!(report.observations.len(), 4);
        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_after_retry_reports_merged_set() {
        let judge = ScriptedJudge::new(vec![incomplete(&["-sV"]), Verdict::error("timed out")]);
        let probe = ScriptedProbeRunner::new()
            .on("-A", records("x", 2))
            .on("-sV", records("x", 5));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .run("host", &plan("-A", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.phase, LoopPhase::Failed);
        assert_eq!(report.observations.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_retry_probe_keeps_running_set() {
        let judge = ScriptedJudge::new(vec![incomplete(&["-sU"]), completed()]);
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 3));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .run("host", &plan("-A", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.verdict.status, VerdictStatus::Completed);
        assert_eq!(report.observations.len(), 3);
        assert_eq!(judge.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_failure_is_hard_error() {
        let judge = ScriptedJudge::always(incomplete(&["-sV"]));
        let probe = ScriptedProbeRunner::new()
            .on("-A", records("x", 2))
            .failing_on("-sV");
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let err = orch
            .run("host", &plan("-A", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Probe { ref target, .. } if target == "host"));
    }

    #[tokio::test]
    async fn test_store_failure_is_hard_error() {
        let judge = ScriptedJudge::always(completed());
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 2));
        let store = Arc::new(RecordingResultStore::failing());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let err = orch
            .run("host", &plan("-A", JudgeMode::Restricted), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Store(_)));
    }

    #[tokio::test]
    async fn test_results_are_stored_per_probe_and_final() {
        let judge = ScriptedJudge::new(vec![incomplete(&["-sV"]), completed()]);
        let probe = ScriptedProbeRunner::new()
            .on("-A", records("x", 2))
            .on("-sV", records("x", 3));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        orch.run("host", &plan("-A", JudgeMode::Suggesting), &CancelFlag::new())
            .await
            .unwrap();

        let dir = Path::new("out/scan");
        assert_eq!(
            store.labels_in(dir),
            vec!["probe_0", "probe_1", FINAL_OBSERVATIONS, FINAL_VERDICT]
        );
        assert_eq!(store.observations(dir, "probe_0").unwrap().len(), 2);
        assert_eq!(store.observations(dir, FINAL_OBSERVATIONS).unwrap().len(), 3);
        assert_eq!(
            store.verdict(dir, FINAL_VERDICT).unwrap().status,
            VerdictStatus::Completed
        );
        assert!(judge.calls().iter().all(|c| c.dir == dir));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let judge = ScriptedJudge::always(completed());
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 2));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = orch
            .run("host", &plan("-A", JudgeMode::Restricted), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled { .. }));
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_between_probe_and_classify() {
        let cancel = CancelFlag::new();
        let judge = ScriptedJudge::always(completed());
        let probe = ScriptedProbeRunner::new()
            .on("-A", records("x", 2))
            .cancel_after(1, cancel.clone());
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let err = orch
            .run("host", &plan("-A", JudgeMode::Restricted), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled { ref target } if target == "host"));
        assert!(judge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_interpret_is_single_shot_and_allows_plain() {
        let judge = ScriptedJudge::always(incomplete(&["-sV"]));
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 2));
        let store = Arc::new(RecordingResultStore::new());
        let orch = orchestrator(&judge, &probe, &store, RuntimeConfig::default());

        let report = orch
            .interpret("host", &plan("-A", JudgeMode::Plain), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Done);
        assert_eq!(report.verdict.status, VerdictStatus::Incomplete);
        assert_eq!(report.mode, JudgeMode::Plain);
        assert_eq!(report.judge_calls, 1);
        assert_eq!(probe.calls().len(), 1);
        assert_eq!(judge.calls()[0].mode, JudgeMode::Plain);
    }

    #[tokio::test]
    async fn test_interpret_empty_and_error() {
        let store = Arc::new(RecordingResultStore::new());

        let judge = ScriptedJudge::always(completed());
        let probe = ScriptedProbeRunner::new();
        let report = orchestrator(&judge, &probe, &store, RuntimeConfig::default())
            .interpret("host", &plan("-A", JudgeMode::Restricted), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.verdict.status, VerdictStatus::Empty);
        assert!(judge.calls().is_empty());

        let judge = ScriptedJudge::always(Verdict::error("bad key"));
        let probe = ScriptedProbeRunner::new().on("-A", records("x", 1));
        let report = orchestrator(&judge, &probe, &store, RuntimeConfig::default())
            .interpret("host", &plan("-A", JudgeMode::Restricted), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.phase, LoopPhase::Failed);
    }

    #[tokio::test]
    async fn test_run_targets_keeps_input_order_and_isolates_dirs() {
        let judge = ScriptedJudge::always(completed());
        let probe = ScriptedProbeRunner::new()
            .on("-A", records("x", 2));
        let store = Arc::new(RecordingResultStore::new());
        let config = RuntimeConfig::default().with_concurrency(2);
        let orch = orchestrator(&judge, &probe, &store, config);

        let targets: Vec<String> = ["b.example", "a.example", "10.0.0.0/30"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let results = orch
            .run_targets(&targets, &plan("-A", JudgeMode::Suggesting), &CancelFlag::new())
            .await;

        let names: Vec<_> = results.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(names, vec!["b.example", "a.example", "10.0.0.0/30"]);
        for (target, result) in &results {
            let report = result.as_ref().unwrap();
            assert_eq!(&report.target, target);
            assert_eq!(report.save_dir, Path::new("out/scan").join(slug(target)));
            assert!(report.observations.records().iter().all(|r| &r.host == target));
        }
        assert_eq!(judge.calls().len(), 3);
    }

    #[test]
    fn test_unconfigured_judge_is_rejected() {
        let err = Orchestrator::builder()
            .judge(Arc::new(ScriptedJudge::always(completed()).unconfigured()))
            .probe_runner(Arc::new(ScriptedProbeRunner::new()))
            .store(Arc::new(RecordingResultStore::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotConfigured(_)));
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = Orchestrator::builder()
            .judge(Arc::new(ScriptedJudge::always(completed())))
            .build()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingCollaborator("probe runner")));
    }

    #[test]
    fn test_scan_plan_for_target() {
        let plan = ScanPlan::new("-A", JudgeMode::Suggesting, "out");
        let per_target = plan.for_target("Scan.Example.com");
        assert_eq!(per_target.save_dir, Path::new("out/scan.example.com"));
        assert_eq!(per_target.base_configuration, "-A");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_always_incomplete_terminates_at_limit(max_attempts in 0u32..6, suggest in any::<bool>()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let next: &[&str] = if suggest { &["-sV"] } else { &[] };
            let judge = ScriptedJudge::always(incomplete(next));
            let probe = ScriptedProbeRunner::new()
                .on("-A", records("x", 1))
                .on("-sV", records("x", 2));
            let store = Arc::new(RecordingResultStore::new());
            let config = RuntimeConfig::default().with_max_attempts(max_attempts);
            let orch = orchestrator(&judge, &probe, &store, config);

            let report = runtime
                .block_on(orch.run("host", &plan("-A", JudgeMode::Suggesting), &CancelFlag::new()))
                .unwrap();
            prop_assert_eq!(report.attempts, max_attempts);
            prop_assert_eq!(report.judge_calls, max_attempts + 1);
            prop_assert!(report.is_done());
        }
    }
}
