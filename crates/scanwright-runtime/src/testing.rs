//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use scanwright_core::{
    normalize_configuration, ConfigError, JudgeMode, JudgeVariant, ObservationRecord,
    ObservationSet, Verdict,
};

use crate::artifacts::{ArtifactLocation, ArtifactSink, VerdictArtifact};
use crate::judges::{BackendReply, Judge, JudgeBackend, JudgeError, Session, TokenUsage};
use crate::orchestrator::CancelFlag;
use crate::probe::{ProbeError, ProbeRunner};
use crate::prompts::JudgePrompt;
use crate::store::{ResultStore, StoreError};

/// `n` open TCP ports on one host, starting at port 20.
pub fn records(host: &str, n: usize) -> Vec<ObservationRecord> {
    (0..n)
        .map(|i| ObservationRecord::new(host, "tcp", 20 + i as u16, "open"))
        .collect()
}

pub fn sample_observations(n: usize) -> ObservationSet {
    ObservationSet::new("10.0.0.5", "-A -T3", records("10.0.0.5", n))
}

#[derive(Debug, Default)]
pub struct RecordingArtifactSink {
    failing: bool,
    artifacts: Mutex<Vec<(ArtifactLocation, VerdictArtifact)>>,
}

impl RecordingArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn artifacts(&self) -> Vec<(ArtifactLocation, VerdictArtifact)> {
        self.artifacts.lock().clone()
    }
}

#[async_trait]
impl ArtifactSink for RecordingArtifactSink {
    async fn persist(
        &self,
        location: &ArtifactLocation,
        artifact: &VerdictArtifact,
    ) -> Result<PathBuf, JudgeError> {
        if self.failing {
            return Err(JudgeError::Artifact("disk full".to_string()));
        }
        self.artifacts.lock().push((location.clone(), artifact.clone()));
        Ok(location.artifact_path(&artifact.judge))
    }
}

#[derive(Debug, Default)]
struct BackendScript {
    replies: VecDeque<Result<String, JudgeError>>,
    prompts: Vec<JudgePrompt>,
}

/// A backend that plays back queued replies.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<BackendScript>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, JudgeError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(BackendScript {
                replies: replies.into(),
                prompts: Vec::new(),
            })),
            delay: None,
        }
    }

    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.lock().prompts.len()
    }

    pub fn prompts(&self) -> Vec<JudgePrompt> {
        self.script.lock().prompts.clone()
    }
}

#[async_trait]
impl JudgeBackend for ScriptedBackend {
    fn variant(&self) -> JudgeVariant {
        JudgeVariant::Ollama
    }

    async fn complete(
        &self,
        _session: &Session,
        _model_flavor: &str,
        prompt: &JudgePrompt,
    ) -> Result<BackendReply, JudgeError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut script = self.script.lock();
            script.prompts.push(prompt.clone());
            script
                .replies
                .pop_front()
                .unwrap_or_else(|| Err(JudgeError::Decode("script exhausted".to_string())))
        };

        reply.map(|text| BackendReply {
            text,
            usage: TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 8,
            },
        })
    }
}

/// One `classify` call seen by a [`ScriptedJudge`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyCall {
    pub mode: JudgeMode,
    pub observation_count: usize,
    pub attempt: u32,
    pub dir: PathBuf,
}

#[derive(Debug, Default)]
struct JudgeScript {
    verdicts: VecDeque<Verdict>,
    calls: Vec<ClassifyCall>,
}

/// A judge that plays back queued verdicts; the last one repeats forever.
#[derive(Debug, Clone)]
pub struct ScriptedJudge {
    configured: bool,
    script: Arc<Mutex<JudgeScript>>,
}

impl ScriptedJudge {
    pub fn new(verdicts: Vec<Verdict>) -> Self {
        Self {
            configured: true,
            script: Arc::new(Mutex::new(JudgeScript {
                verdicts: verdicts.into(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn always(verdict: Verdict) -> Self {
        Self::new(vec![verdict])
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn calls(&self) -> Vec<ClassifyCall> {
        self.script.lock().calls.clone()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    fn name(&self) -> &str {
        "scripted"
    }

    fn variant(&self) -> JudgeVariant {
        JudgeVariant::Ollama
    }

    fn model_flavor(&self) -> &str {
        "llama3"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn configure(&mut self) -> Result<(), ConfigError> {
        self.configured = true;
        Ok(())
    }

    async fn classify(
        &self,
        observations: &ObservationSet,
        mode: JudgeMode,
        location: &ArtifactLocation,
    ) -> Verdict {
        let mut script = self.script.lock();
        script.calls.push(ClassifyCall {
            mode,
            observation_count: observations.len(),
            attempt: location.attempt(),
            dir: location.dir().to_path_buf(),
        });
        if script.verdicts.len() > 1 {
            script.verdicts.pop_front().unwrap_or_else(Verdict::empty)
        } else {
            script
                .verdicts
                .front()
                .cloned()
                .unwrap_or_else(|| Verdict::error("no scripted verdict"))
        }
    }
}

#[derive(Debug, Default)]
struct ProbeScript {
    outcomes: HashMap<String, Vec<ObservationRecord>>,
    failing: Option<String>,
    calls: Vec<(String, String)>,
    cancel_after: Option<(usize, CancelFlag)>,
}

/// A probe runner keyed by configuration. Unknown configurations observe nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbeRunner {
    script: Arc<Mutex<ProbeScript>>,
}

impl ScriptedProbeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records observed by `configuration`, on every target.
    pub fn on(self, configuration: &str, records: Vec<ObservationRecord>) -> Self {
        self.script
            .lock()
            .outcomes
            .insert(normalize_configuration(configuration), records);
        self
    }

    /// Fail every probe of `configuration`.
    pub fn failing_on(self, configuration: &str) -> Self {
        self.script.lock().failing = Some(normalize_configuration(configuration));
        self
    }

    /// Raise `flag` once `calls` probes have run.
    pub fn cancel_after(self, calls: usize, flag: CancelFlag) -> Self {
        self.script.lock().cancel_after = Some((calls, flag));
        self
    }

    /// `(target, configuration)` per probe, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.script.lock().calls.clone()
    }

    pub fn configurations(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, c)| c).collect()
    }
}

#[async_trait]
impl ProbeRunner for ScriptedProbeRunner {
    async fn run(&self, target: &str, configuration: &str) -> Result<ObservationSet, ProbeError> {
        let key = normalize_configuration(configuration);
        let mut script = self.script.lock();
        script.calls.push((target.to_string(), key.clone()));

        if let Some((after, flag)) = &script.cancel_after {
            if script.calls.len() >= *after {
                flag.cancel();
            }
        }

        if script.failing.as_deref() == Some(key.as_str()) {
            return Err(ProbeError::Other(format!("host unreachable with '{key}'")));
        }

        let records = script
            .outcomes
            .get(&key)
            .map(|records| {
                records
                    .iter()
                    .cloned()
                    .map(|mut r| {
                        r.host = target.to_string();
                        r
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ObservationSet::new(target, key, records))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Observations(ObservationSet),
    Verdict(Verdict),
}

/// A result store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct RecordingResultStore {
    failing: bool,
    entries: Mutex<Vec<(PathBuf, String, Stored)>>,
}

impl RecordingResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// `(location, label)` per save, in call order.
    pub fn saves(&self) -> Vec<(PathBuf, String)> {
        self.entries
            .lock()
            .iter()
            .map(|(location, label, _)| (location.clone(), label.clone()))
            .collect()
    }

    pub fn labels_in(&self, location: &Path) -> Vec<String> {
        self.saves()
            .into_iter()
            .filter(|(l, _)| l == location)
            .map(|(_, label)| label)
            .collect()
    }

    pub fn observations(&self, location: &Path, label: &str) -> Option<ObservationSet> {
        self.entries.lock().iter().rev().find_map(|(l, name, stored)| match stored {
            Stored::Observations(set) if l == location && name == label => Some(set.clone()),
            _ => None,
        })
    }

    pub fn verdict(&self, location: &Path, label: &str) -> Option<Verdict> {
        self.entries.lock().iter().rev().find_map(|(l, name, stored)| match stored {
            Stored::Verdict(verdict) if l == location && name == label => Some(verdict.clone()),
            _ => None,
        })
    }

    fn push(&self, location: &Path, label: &str, stored: Stored) -> Result<PathBuf, StoreError> {
        let path = location.join(format!("{label}.json"));
        if self.failing {
            return Err(StoreError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.entries
            .lock()
            .push((location.to_path_buf(), label.to_string(), stored));
        Ok(path)
    }
}

#[async_trait]
impl ResultStore for RecordingResultStore {
    async fn save_observations(
        &self,
        location: &Path,
        label: &str,
        observations: &ObservationSet,
    ) -> Result<PathBuf, StoreError> {
        self.push(location, label, Stored::Observations(observations.clone()))
    }

    async fn save_verdict(
        &self,
        location: &Path,
        label: &str,
        verdict: &Verdict,
    ) -> Result<PathBuf, StoreError> {
        self.push(location, label, Stored::Verdict(verdict.clone()))
    }
}
