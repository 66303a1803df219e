//! Error kinds with an explicit run disposition
//!
//! Command code works with `anyhow::Result`; these kinds travel inside the
//! `anyhow::Error` and are recovered with `downcast_ref` when the
//! orchestrator classifies a phase failure or when `main` prints a hint.

use declarative::Disposition;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeelError {
    #[error("{tool} is not installed or not on PATH")]
    PrerequisiteMissing { tool: String, hint: String },

    #[error("state file has schema version {found}, this keel supports version {supported}")]
    StateVersionMismatch { found: u64, supported: u32 },

    #[error("could not resolve the age secret key: {message}")]
    SecretResolution { message: String, hint: Option<String> },

    #[error("{command} failed: {message}")]
    ExternalCommand { command: String, message: String },

    #[error("state file is corrupted: {reason}")]
    StateCorrupted { reason: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl KeelError {
    pub fn prerequisite(tool: &str, hint: &str) -> Self {
        Self::PrerequisiteMissing {
            tool: tool.to_string(),
            hint: hint.to_string(),
        }
    }

    pub fn secret(message: impl Into<String>) -> Self {
        Self::SecretResolution {
            message: message.into(),
            hint: None,
        }
    }

    pub fn secret_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::SecretResolution {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// How this error affects the remaining phases of a run
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::PrerequisiteMissing { .. } => Disposition::AbortPhase,
            Self::StateVersionMismatch { .. } => Disposition::AbortRun,
            Self::SecretResolution { .. } => Disposition::AbortPhase,
            Self::ExternalCommand { .. } => Disposition::AbortPhase,
            Self::StateCorrupted { .. } => Disposition::Warn,
            Self::Config { .. } => Disposition::AbortRun,
        }
    }

    /// Remediation shown to the user
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::PrerequisiteMissing { hint, .. } => Some(hint.clone()),
            Self::StateVersionMismatch { .. } => Some(
                "Upgrade keel, or move the state file aside to start tracking from scratch"
                    .to_string(),
            ),
            Self::SecretResolution { hint, .. } => hint.clone(),
            Self::ExternalCommand { .. } => None,
            Self::StateCorrupted { .. } => None,
            Self::Config { .. } => Some("Run `keel doctor` to see which file is in use".to_string()),
        }
    }
}

impl From<pkgkit::Error> for KeelError {
    fn from(err: pkgkit::Error) -> Self {
        match err {
            pkgkit::Error::ToolNotFound { tool, hint } => Self::prerequisite(tool, hint),
            other => {
                let advice = other.category().advice();
                let message = match &other {
                    pkgkit::Error::CommandFailed { output, .. } if !output.is_empty() => {
                        format!("{other}\n{output}")
                    }
                    _ => format!("{other} ({advice})"),
                };
                Self::command("package manager", message)
            }
        }
    }
}

/// Classify an error coming out of a phase
pub fn classify(error: &anyhow::Error) -> Disposition {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<KeelError>())
        .map_or(Disposition::AbortPhase, KeelError::disposition)
}

/// Find a remediation hint anywhere in an error chain
pub fn hint_for(error: &anyhow::Error) -> Option<String> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<KeelError>())
        .and_then(KeelError::hint)
}
