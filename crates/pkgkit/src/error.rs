//! Error types for package manager operations.
//!
//! Errors are categorized so callers can decide whether to escalate,
//! ignore, or surface a failure. Scoop frequently reports failures on
//! stdout with a zero exit status, so classification works on the combined
//! output text rather than on exit codes alone.

use thiserror::Error;

/// Categories of package manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient)
    Network,
    /// Package or bucket not found
    NotFound,
    /// The operation needs administrator rights
    AdminRequired,
    /// Package is already installed
    AlreadyInstalled,
    /// Package manager or helper tool is not installed
    ToolNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether the operation should be retried once under elevation.
    pub fn needs_elevation(&self) -> bool {
        matches!(self, Self::AdminRequired)
    }

    /// Whether this error can be safely ignored (operation already done).
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::AlreadyInstalled)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Package not found",
            Self::AdminRequired => "Administrator rights required",
            Self::AlreadyInstalled => "Already installed",
            Self::ToolNotFound => "Package manager not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::NotFound => "Verify the package name or add the bucket that provides it",
            Self::AdminRequired => "Install gsudo (scoop install gsudo) so keel can elevate",
            Self::AlreadyInstalled => "No action needed",
            Self::ToolNotFound => "Install the missing tool and make sure it is on PATH",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during package manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from the failed network operation
        message: String,
    },

    /// Package not found in any configured source
    #[error("package not found: {name}")]
    NotFound {
        /// Name of the package that could not be found
        name: String,
    },

    /// Installer refused to run without administrator rights
    #[error("{name} requires administrator rights")]
    AdminRequired {
        /// Name of the package that needs elevation
        name: String,
    },

    /// Package is already installed
    #[error("already installed: {name}")]
    AlreadyInstalled {
        /// Name of the already-installed package
        name: String,
    },

    /// A required tool is not installed or not on PATH
    #[error("{tool} not found. {hint}")]
    ToolNotFound {
        /// Executable name
        tool: &'static str,
        /// How to install it
        hint: &'static str,
    },

    /// Command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Output from the failed command
        output: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::AdminRequired { .. } => ErrorCategory::AdminRequired,
            Error::AlreadyInstalled { .. } => ErrorCategory::AlreadyInstalled,
            Error::ToolNotFound { .. } => ErrorCategory::ToolNotFound,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether the operation should be retried once under elevation.
    pub fn needs_elevation(&self) -> bool {
        self.category().needs_elevation()
    }

    /// Whether this error can be safely ignored.
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Create an error from package manager output.
    ///
    /// Analyzes the combined stdout/stderr text to categorize the error.
    pub fn from_output(manager: &str, output: &str, package_name: Option<&str>) -> Self {
        let lower = output.to_lowercase();
        let name = || package_name.unwrap_or("unknown").to_string();

        // Elevation first: installers mention it alongside other noise
        if lower.contains("requires admin rights")
            || lower.contains("require admin rights")
            || lower.contains("administrator rights")
            || lower.contains("administrator privileges")
            || lower.contains("run as administrator")
            || lower.contains("elevation required")
        {
            return Error::AdminRequired { name: name() };
        }

        if lower.contains("could not resolve")
            || lower.contains("unable to connect")
            || lower.contains("timed out")
            || lower.contains("the remote name could not be resolved")
            || lower.contains("the remote server returned an error")
            || lower.contains("network")
        {
            return Error::Network {
                message: output.trim().to_string(),
            };
        }

        if lower.contains("couldn't find manifest")
            || lower.contains("no package found matching input criteria")
            || lower.contains("unknown bucket")
        {
            return Error::NotFound { name: name() };
        }

        if lower.contains("is already installed")
            || lower.contains("found an existing package already installed")
            || lower.contains("bucket already exists")
        {
            return Error::AlreadyInstalled { name: name() };
        }

        Error::CommandFailed {
            message: format!(
                "{manager} command failed{}",
                package_name
                    .map(|n| format!(" for {n}"))
                    .unwrap_or_default()
            ),
            output: output.trim().to_string(),
        }
    }
}

/// Result type for package manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_flags() {
        assert!(ErrorCategory::AdminRequired.needs_elevation());
        assert!(!ErrorCategory::Network.needs_elevation());
        assert!(ErrorCategory::AlreadyInstalled.is_ignorable());
        assert!(!ErrorCategory::NotFound.is_ignorable());
    }

    #[test]
    fn test_from_output_admin_rights() {
        let err = Error::from_output(
            "scoop",
            "ERROR: This app requires admin rights to install",
            Some("vcredist2022"),
        );
        assert_eq!(err.category(), ErrorCategory::AdminRequired);
        assert!(err.needs_elevation());
    }

    #[test]
    fn test_from_output_network() {
        let err = Error::from_output(
            "scoop",
            "The remote name could not be resolved: 'github.com'",
            Some("git"),
        );
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_from_output_not_found() {
        let err = Error::from_output("scoop", "Couldn't find manifest for 'nope'.", Some("nope"));
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let err = Error::from_output(
            "winget",
            "No package found matching input criteria.",
            Some("Foo.Bar"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_output_already_installed() {
        let err = Error::from_output("scoop", "WARN  'git' (2.43.0) is already installed.", Some("git"));
        assert!(err.is_ignorable());
    }

    #[test]
    fn test_from_output_fallback() {
        let err = Error::from_output("winget", "Installer failed with exit code: 1603", Some("X.Y"));
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "command failed: winget command failed for X.Y");
    }
}
