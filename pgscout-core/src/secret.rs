//! Secret indirection with a single, auditable resolution point.
//!
//! Profiles never carry secret values directly when they can reference an
//! environment variable instead. This module models that indirection as a
//! tagged variant and resolves it in exactly one place, so the "never log
//! the secret" invariant stays easy to audit.
//!
//! # Security
//! - Resolved values are stored in `Zeroizing<String>` containers and are
//!   cleared from memory on drop
//! - Resolution errors name the environment variable, never a value

use zeroize::Zeroizing;

use crate::error::{PgScoutError, Result};

/// A secret value that is either inlined in the configuration document or
/// indirected through a named environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Value written literally in the configuration document
    Literal(String),
    /// Name of an environment variable holding the value
    EnvRef(String),
}

impl SecretSource {
    /// Resolves the secret into a zeroizing buffer.
    ///
    /// An environment variable that is unset *or empty* fails resolution:
    /// an empty secret is never intentional, and silently falling back to
    /// passwordless authentication would mask a deployment mistake.
    ///
    /// # Errors
    /// Returns [`PgScoutError::SecretResolution`] naming the variable if an
    /// `EnvRef` cannot be resolved.
    pub fn resolve(&self) -> Result<Zeroizing<String>> {
        match self {
            SecretSource::Literal(value) => Ok(Zeroizing::new(value.clone())),
            SecretSource::EnvRef(variable) => match std::env::var(variable) {
                Ok(value) if !value.is_empty() => Ok(Zeroizing::new(value)),
                _ => Err(PgScoutError::missing_env_var(variable.clone())),
            },
        }
    }

    /// Returns the referenced variable name, if this is an indirect secret.
    pub fn env_name(&self) -> Option<&str> {
        match self {
            SecretSource::Literal(_) => None,
            SecretSource::EnvRef(variable) => Some(variable),
        }
    }
}
