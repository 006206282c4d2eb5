//! Credentials read from the process environment.

use std::env;
use std::fmt;

use crate::VerifactError;

/// A credential plus the variable it came from. Formatting never reveals the value.
#[derive(Clone)]
pub struct SecretValue {
    source: String,
    value: String,
}

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            source: "inline".to_string(),
            value: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Name of the environment variable holding the credential.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("source", &self.source)
            .field("value", &"***redacted***")
            .finish()
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.source)
    }
}

/// Read a non-blank credential from the variable named in the settings.
pub fn require_env(var: &str) -> Result<SecretValue, VerifactError> {
    let var = var.trim();
    if var.is_empty() {
        return Err(VerifactError::InvalidConfiguration(
            "api_key_env must name an environment variable".into(),
        ));
    }

    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretValue {
            source: var.to_string(),
            value: value.trim().to_string(),
        }),
        _ => Err(VerifactError::MissingSecret(var.to_string())),
    }
}
