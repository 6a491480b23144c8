//! # scanwright-runtime
//!
//! Judges, the judge registry and the adaptive probe, classify, retry loop.
//!
//! Everything that waits on the outside world lives here: judge calls to
//! hosted or local models, probe processes and result persistence. The
//! decisions themselves (extraction, validation, merging) come from
//! `scanwright-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scanwright_core::ScanRequest;
//! use scanwright_runtime::{
//!     CancelFlag, CommandProbeRunner, JsonResultStore, JudgeRegistry, Orchestrator,
//!     RuntimeConfig, ScanPlan,
//! };
//!
//! let request = ScanRequest::from_file("scan.yaml")?;
//! let config = RuntimeConfig::from_value(request.runtime.as_ref())?;
//! let registry = JudgeRegistry::new(&config);
//!
//! let mut judge = registry.create_for(request.judge.config().clone(), "primary", None);
//! judge.configure()?;
//!
//! let orchestrator = Orchestrator::builder()
//!     .judge(Arc::from(judge))
//!     .probe_runner(Arc::new(CommandProbeRunner::new("scan-wrapper")))
//!     .store(Arc::new(JsonResultStore::new()))
//!     .usage_tracker(registry.usage())
//!     .config(config)
//!     .build()?;
//!
//! let plan = ScanPlan::from_request(&request);
//! let reports = orchestrator
//!     .run_targets(request.probe.targets(), &plan, &CancelFlag::new())
//!     .await;
//! ```

pub mod artifacts;
pub mod config;
pub mod judges;
pub mod orchestrator;
pub mod probe;
pub mod prompts;
pub mod resilience;
pub mod store;

#[cfg(test)]
mod testing;

pub use artifacts::{ArtifactLocation, ArtifactSink, FileArtifactSink, VerdictArtifact};
pub use config::{BaseUrls, RuntimeConfig};
pub use judges::{
    ApiCredential, Judge, JudgeBackend, JudgeError, JudgeOptions, JudgeRegistry, ModelJudge,
};
pub use orchestrator::{
    CancelFlag, LoopPhase, LoopReport, Orchestrator, OrchestratorBuilder, OrchestratorError,
    ScanPlan,
};
pub use probe::{CommandProbeRunner, ProbeError, ProbeRunner};
pub use prompts::JudgePrompt;
pub use resilience::{JudgeUsage, NextProbe, RetryPolicy, UsageTracker};
pub use store::{JsonResultStore, ResultStore, StoreError};
