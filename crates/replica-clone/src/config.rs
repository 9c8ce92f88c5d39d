//! Cloner configuration.
//!
//! [`CloneConfig`] holds the backend choice and the policy flags a
//! [`Cloner`](crate::Cloner) starts with. It can be built in code or read
//! from `REPLICA_*` environment variables.

use crate::error::{CloneError, CloneResult};
use std::str::FromStr;

/// Environment variable selecting the backend (`auto`, `fast`, `portable`)
pub const ENV_BACKEND: &str = "REPLICA_BACKEND";
/// Environment variable for [`CloneConfig::clone_transient_fields`]
pub const ENV_CLONE_TRANSIENT: &str = "REPLICA_CLONE_TRANSIENT";
/// Environment variable for [`CloneConfig::use_native_clone_method`]
pub const ENV_NATIVE_CLONE: &str = "REPLICA_NATIVE_CLONE";
/// Environment variable for [`CloneConfig::use_overrides`]
pub const ENV_USE_OVERRIDES: &str = "REPLICA_USE_OVERRIDES";

/// Which copy backend a cloner uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Fast when available, otherwise portable (logged)
    #[default]
    Auto,
    /// Fast only; construction fails when unavailable
    Fast,
    /// Portable only
    Portable,
}

impl FromStr for BackendChoice {
    type Err = CloneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "fast" => Ok(Self::Fast),
            "portable" => Ok(Self::Portable),
            other => Err(CloneError::config(format!(
                "unknown backend '{other}', expected auto, fast or portable"
            ))),
        }
    }
}

/// Cloner configuration.
#[derive(Debug, Clone)]
pub struct CloneConfig {
    /// Copy backend.
    /// Default: auto
    pub backend: BackendChoice,

    /// Deep-clone language-level transient fields instead of resetting them.
    /// Default: true
    pub clone_transient_fields: bool,

    /// Deep-clone annotation-transient fields instead of resetting them.
    /// Default: true
    pub clone_transient_annotated_fields: bool,

    /// Clone types the detector classifies as immutable.
    /// Default: false
    pub clone_immutable_flagged: bool,

    /// Deep-clone synthetic fields instead of leaving them at their default.
    /// Default: false
    pub clone_synthetic_fields: bool,

    /// Delegate to self-copy methods.
    /// Default: false
    pub use_native_clone_method: bool,

    /// Consult registered clone implementors.
    /// Default: true
    pub use_overrides: bool,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            clone_transient_fields: true,
            clone_transient_annotated_fields: true,
            clone_immutable_flagged: false,
            clone_synthetic_fields: false,
            use_native_clone_method: false,
            use_overrides: true,
        }
    }
}

impl CloneConfig {
    /// Config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Config read from `REPLICA_*` environment variables; unset variables
    /// keep their defaults.
    pub fn from_env() -> CloneResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Config read through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CloneResult<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_BACKEND) {
            config.backend = value.parse()?;
        }
        if let Some(value) = lookup(ENV_CLONE_TRANSIENT) {
            let flag = parse_flag(ENV_CLONE_TRANSIENT, &value)?;
            config.clone_transient_fields = flag;
            config.clone_transient_annotated_fields = flag;
        }
        if let Some(value) = lookup(ENV_NATIVE_CLONE) {
            config.use_native_clone_method = parse_flag(ENV_NATIVE_CLONE, &value)?;
        }
        if let Some(value) = lookup(ENV_USE_OVERRIDES) {
            config.use_overrides = parse_flag(ENV_USE_OVERRIDES, &value)?;
        }
        Ok(config)
    }

    /// Set the backend.
    pub fn backend(mut self, backend: BackendChoice) -> Self {
        self.backend = backend;
        self
    }

    /// Enable or disable cloning of both kinds of transient fields.
    pub fn clone_transient(mut self, enabled: bool) -> Self {
        self.clone_transient_fields = enabled;
        self.clone_transient_annotated_fields = enabled;
        self
    }

    /// Enable or disable cloning of immutable-classified types.
    pub fn clone_immutable_flagged(mut self, enabled: bool) -> Self {
        self.clone_immutable_flagged = enabled;
        self
    }

    /// Enable or disable deep-cloning of synthetic fields.
    pub fn clone_synthetic(mut self, enabled: bool) -> Self {
        self.clone_synthetic_fields = enabled;
        self
    }

    /// Enable or disable self-copy delegation.
    pub fn native_clone(mut self, enabled: bool) -> Self {
        self.use_native_clone_method = enabled;
        self
    }

    /// Enable or disable clone implementors.
    pub fn overrides(mut self, enabled: bool) -> Self {
        self.use_overrides = enabled;
        self
    }
}

fn parse_flag(key: &str, value: &str) -> CloneResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(CloneError::config(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}
