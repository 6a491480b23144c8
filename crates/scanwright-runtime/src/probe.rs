//! Probe runners: run one probe against one target.
//!
//! The loop only needs "configuration in, observations out". The bundled
//! [`CommandProbeRunner`] shells out to a wrapper program that prints the
//! records as a JSON array on stdout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use scanwright_core::{ObservationRecord, ObservationSet};

/// A probe could not produce observations.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to start probe program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("probe exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("probe output is not a JSON array of observation records: {0}")]
    Decode(String),

    #[error("probe failed: {0}")]
    Other(String),
}

/// Runs one probe invocation.
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Probe `target` with `configuration` and return everything observed.
    ///
    /// An empty set is a valid outcome, not an error.
    async fn run(&self, target: &str, configuration: &str) -> Result<ObservationSet, ProbeError>;
}

/// Runs `<program> [args...] <target> <configuration tokens...>`.
#[derive(Debug, Clone)]
pub struct CommandProbeRunner {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl CommandProbeRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments passed before the target, e.g. a script path for an interpreter.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command_line(&self, target: &str, configuration: &str) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push(target.to_string());
        args.extend(configuration.split_whitespace().map(str::to_string));
        args
    }
}

#[async_trait]
impl ProbeRunner for CommandProbeRunner {
    async fn run(&self, target: &str, configuration: &str) -> Result<ObservationSet, ProbeError> {
        let args = self.command_line(target, configuration);
        tracing::debug!(
            program = %self.program.display(),
            args = ?args,
            "Starting probe"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let records = decode_records(&stdout)?;

        tracing::info!(
            scan_target = %target,
            configuration,
            records = records.len(),
            "Probe finished"
        );
        Ok(ObservationSet::new(target, configuration, records))
    }
}

/// Blank output means nothing was observed.
pub fn decode_records(stdout: &str) -> Result<Vec<ObservationRecord>, ProbeError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| ProbeError::Decode(e.to_string()))
}
