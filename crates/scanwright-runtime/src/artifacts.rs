//! Per-call verdict artifacts.
//!
//! Every judge call, failed ones included, leaves one artifact behind at
//! `<dir>/<judge-slug>_verdict_<attempt>.json`. Writes go to a temp file
//! that is renamed over the final name, so no handle outlives a call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use scanwright_core::{slug, JudgeMode, JudgeVariant, Verdict};

use crate::judges::JudgeError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where the caller wants a judge call's artifact to land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    dir: PathBuf,
    attempt: u32,
}

impl ArtifactLocation {
    /// `attempt` 0 is the initial classification.
    pub fn new(dir: impl Into<PathBuf>, attempt: u32) -> Self {
        Self {
            dir: dir.into(),
            attempt,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Final artifact path for a judge.
    pub fn artifact_path(&self, judge_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}_verdict_{}.json", slug(judge_name), self.attempt))
    }
}

/// What a judge call leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictArtifact {
    pub judge: String,
    pub variant: JudgeVariant,
    pub model_flavor: String,
    pub mode: JudgeMode,
    pub target: String,
    pub attempt: u32,
    pub observation_count: usize,
    pub verdict: Verdict,

    /// Unparsed judge text, when the judge answered at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

/// Destination for verdict artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist one artifact, fully replacing any previous file of the same name.
    async fn persist(
        &self,
        location: &ArtifactLocation,
        artifact: &VerdictArtifact,
    ) -> Result<PathBuf, JudgeError>;
}

/// Writes artifacts as pretty JSON files.
#[derive(Debug, Clone, Default)]
pub struct FileArtifactSink;

impl FileArtifactSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactSink {
    async fn persist(
        &self,
        location: &ArtifactLocation,
        artifact: &VerdictArtifact,
    ) -> Result<PathBuf, JudgeError> {
        let path = location.artifact_path(&artifact.judge);
        let bytes = serde_json::to_vec_pretty(artifact)
            .map_err(|e| JudgeError::Artifact(format!("{}: {}", path.display(), e)))?;

        write_atomic(&path, &bytes)
            .await
            .map_err(|e| JudgeError::Artifact(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "Wrote verdict artifact");
        Ok(path)
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
///
/// Creates the parent directory if needed.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let temp = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwright_core::VerdictStatus;

    fn artifact(attempt: u32, status: VerdictStatus) -> VerdictArtifact {
        VerdictArtifact {
            judge: "Nightly GPT".to_string(),
            variant: JudgeVariant::Gpt,
            model_flavor: "gpt-4o".to_string(),
            mode: JudgeMode::Restricted,
            target: "10.0.0.1".to_string(),
            attempt,
            observation_count: 3,
            verdict: Verdict::new(status),
            raw_response: Some("Completed".to_string()),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_artifact_path_naming() {
        let location = ArtifactLocation::new("/tmp/out", 2);
        assert_eq!(
            location.artifact_path("Nightly GPT"),
            PathBuf::from("/tmp/out/nightly_gpt_verdict_2.json")
        );
    }

    #[tokio::test]
    async fn test_file_sink_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileArtifactSink::new();
        let location = ArtifactLocation::new(dir.path().join("nested"), 0);

        let path = sink
            .persist(&location, &artifact(0, VerdictStatus::Incomplete))
            .await
            .unwrap();
        let path_again = sink
            .persist(&location, &artifact(0, VerdictStatus::Completed))
            .await
            .unwrap();
        assert_eq!(path, path_again);

        let written: VerdictArtifact =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.verdict.status, VerdictStatus::Completed);

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_attempts_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileArtifactSink::new();

        let first = sink
            .persist(&ArtifactLocation::new(dir.path(), 0), &artifact(0, VerdictStatus::Incomplete))
            .await
            .unwrap();
        let second = sink
            .persist(&ArtifactLocation::new(dir.path(), 1), &artifact(1, VerdictStatus::Completed))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }
}
