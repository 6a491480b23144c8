//! # scanwright-core
//!
//! Data model and pure decision logic for adaptive scan orchestration.
//!
//! A probe produces an [`ObservationSet`]. A judge (some text-generation
//! service) reads it and answers with free text. This crate turns that
//! text into a [`Verdict`] and validates the front-end request that starts
//! the whole loop.
//!
//! ## Key Guarantees
//!
//! 1. **No I/O**: nothing here touches the network; the async loop lives in
//!    `scanwright-runtime`
//! 2. **Tolerant extraction**: judges are asked for JSON and reliably wrap it
//!    in commentary, so the extractor carves the payload out of the prose
//! 3. **Fail before probing**: unknown variants, flavors and modes are
//!    rejected while the request is parsed
//!
//! ## Example
//!
//! ```rust
//! use scanwright_core::{extract, JudgeMode, VerdictStatus};
//!
//! let raw = r#"Sure! {"classification": "Incomplete", "next_arguments": ["-sV"]}"#;
//! let verdict = extract(raw, JudgeMode::Suggesting).unwrap();
//! assert_eq!(verdict.status, VerdictStatus::Incomplete);
//! assert_eq!(verdict.next_arguments, vec!["-sV".to_string()]);
//! ```

pub mod configuration;
pub mod extractor;
pub mod request;
pub mod types;
pub mod variants;

// Re-export main types at crate root
pub use configuration::{
    join_tokens, normalize_configuration, same_configuration, slug,
    DEFAULT_FALLBACK_CONFIGURATION, DEFAULT_MAX_ATTEMPTS,
};
pub use extractor::{carve_payload, extract, normalize_status, ExtractionError};
pub use request::{JudgeParams, ProbeParams, ScanRequest};
pub use types::{JudgeMode, ObservationRecord, ObservationSet, Verdict, VerdictStatus};
pub use variants::{JudgeConfig, JudgeVariant};

use thiserror::Error;

/// Errors raised while validating configuration, before any probe runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown judge variant: '{0}'. Available: gpt, gemini, ollama")]
    UnknownVariant(String),

    #[error("Invalid model flavor '{flavor}' for judge variant '{variant}'. Accepted: {accepted:?}")]
    InvalidFlavor {
        variant: String,
        flavor: String,
        accepted: &'static [&'static str],
    },

    #[error("Unknown judge mode: '{0}'. Use plain, restricted or suggesting")]
    UnknownMode(String),

    #[error("{name} required: pass it explicitly or set the {env_var} environment variable")]
    MissingCredential {
        name: &'static str,
        env_var: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Judge configured for variant '{config}' but its backend speaks '{backend}'")]
    BackendMismatch { config: String, backend: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Failed to read request file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}
