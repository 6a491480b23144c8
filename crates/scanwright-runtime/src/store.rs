//! Result persistence for raw observations and final verdicts.
//!
//! The loop stores each probe's raw set as `probe_<n>` plus the final
//! merged set and verdict. Every document is written whole under a
//! caller-supplied directory.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use scanwright_core::{ObservationSet, Verdict};

use crate::artifacts::write_atomic;

/// Label for the final merged observation set.
pub const FINAL_OBSERVATIONS: &str = "final_observations";

/// Label for the final verdict.
pub const FINAL_VERDICT: &str = "final_verdict";

/// Label for the raw set of the n-th probe (0 is the initial probe).
pub fn probe_label(index: u32) -> String {
    format!("probe_{index}")
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {label}: {source}")]
    Serialize {
        label: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Destination for loop results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_observations(
        &self,
        location: &Path,
        label: &str,
        observations: &ObservationSet,
    ) -> Result<PathBuf, StoreError>;

    async fn save_verdict(
        &self,
        location: &Path,
        label: &str,
        verdict: &Verdict,
    ) -> Result<PathBuf, StoreError>;
}

/// Writes `<location>/<label>.json`.
#[derive(Debug, Clone, Default)]
pub struct JsonResultStore;

impl JsonResultStore {
    pub fn new() -> Self {
        Self
    }

    async fn write<T: Serialize + Sync>(
        &self,
        location: &Path,
        label: &str,
        value: &T,
    ) -> Result<PathBuf, StoreError> {
        let path = location.join(format!("{label}.json"));
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
            label: label.to_string(),
            source,
        })?;

        write_atomic(&path, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "Stored result");
        Ok(path)
    }
}

#[async_trait]
impl ResultStore for JsonResultStore {
    async fn save_observations(
        &self,
        location: &Path,
        label: &str,
        observations: &ObservationSet,
    ) -> Result<PathBuf, StoreError> {
        self.write(location, label, observations).await
    }

    async fn save_verdict(
        &self,
        location: &Path,
        label: &str,
        verdict: &Verdict,
    ) -> Result<PathBuf, StoreError> {
        self.write(location, label, verdict).await
    }
}
