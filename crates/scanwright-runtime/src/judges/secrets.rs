//! Credential handling for remote judges.
//!
//! Credentials are wrapped in [`SecretString`] as soon as they enter the
//! process. `Debug` and `Display` print `[REDACTED]`, and the value is only
//! exposed where a request header is built.
//!
//! Resolution order: explicit value, then the variant's environment
//! variable, else [`ConfigError::MissingCredential`].

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use scanwright_core::{ConfigError, JudgeVariant};

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Passed to the registry or judge by the caller
    Programmatic,
    /// Read from the variant's environment variable
    Environment,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Programmatic => write!(f, "programmatic"),
            CredentialSource::Environment => write!(f, "environment"),
        }
    }
}

/// An API key that cannot leak through logs.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read a non-empty credential from an environment variable.
    pub fn from_env(env_var: &str, name: &'static str) -> Option<Self> {
        std::env::var(env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| Self::new(v.trim(), CredentialSource::Environment, name))
    }

    /// Resolve the credential for a variant.
    pub fn resolve(explicit: Option<ApiCredential>, variant: JudgeVariant) -> Result<Self, ConfigError> {
        Self::resolve_from(
            explicit,
            variant.credential_env().unwrap_or("(none)"),
            variant.credential_name(),
        )
    }

    fn resolve_from(
        explicit: Option<ApiCredential>,
        env_var: &'static str,
        name: &'static str,
    ) -> Result<Self, ConfigError> {
        if let Some(credential) = explicit.filter(|c| !c.is_empty()) {
            return Ok(credential);
        }

        Self::from_env(env_var, name).ok_or(ConfigError::MissingCredential { name, env_var })
    }

    /// Expose the value. Call only where the header is built.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
