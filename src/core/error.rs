use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── Installation ────────────────────────────────────
    #[error("Invalid game path {path:?}: {detail}")]
    PathInvalid { path: PathBuf, detail: String },

    // ── Manifest ────────────────────────────────────────
    #[error("Manifest file not found at {0:?}. Cannot verify files.")]
    ManifestMissing(PathBuf),

    #[error("Manifest parse error in {path:?}: {detail}")]
    ManifestParse { path: PathBuf, detail: String },

    // ── Integrity ───────────────────────────────────────
    #[error("File is missing: {0}")]
    FileMissing(String),

    #[error("File is corrupt or has been modified: {0}")]
    FileCorrupt(String),

    #[error("Could not read file for verification: {path} ({detail})")]
    FileUnreadable { path: String, detail: String },

    // ── Client config ───────────────────────────────────
    #[error("Could not write client config {path:?}: {source}")]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("Backend server unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("Game access request was rejected (status {status}): {body}")]
    AccessDenied { status: u16, body: String },

    #[error("Login required before launching")]
    LoginRequired,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // ── Process ─────────────────────────────────────────
    #[error("Could not start client process {program:?}: {detail}")]
    ProcessSpawn { program: PathBuf, detail: String },

    #[error("Another launch attempt is already in progress")]
    LaunchInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    // ── Disk ────────────────────────────────────────────
    #[error("Not enough free space at {path:?}: {available} bytes available, {required} required")]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Settings ────────────────────────────────────────
    #[error("Settings error: {0}")]
    Settings(String),

    // ── Generic ─────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Short machine-readable reason, stable across message wording changes.
    pub fn reason(&self) -> &'static str {
        match self {
            LauncherError::PathInvalid { .. } => "invalid game path",
            LauncherError::ManifestMissing(_) => "manifest missing",
            LauncherError::ManifestParse { .. } => "manifest parse error",
            LauncherError::FileMissing(_) => "missing",
            LauncherError::FileCorrupt(_) => "corrupt or modified",
            LauncherError::FileUnreadable { .. } => "unreadable",
            LauncherError::ConfigWrite { .. } => "config write error",
            LauncherError::NetworkUnavailable(_) | LauncherError::Http(_) => "backend unreachable",
            LauncherError::AccessDenied { .. } => "access denied",
            LauncherError::LoginRequired => "login required",
            LauncherError::ProcessSpawn { .. } => "could not start process",
            LauncherError::LaunchInProgress => "launch in progress",
            LauncherError::Cancelled => "cancelled",
            LauncherError::InsufficientSpace { .. } => "insufficient space",
            LauncherError::Io { .. } => "io error",
            LauncherError::Json(_) => "json error",
            LauncherError::Settings(_) => "settings error",
            LauncherError::Internal(_) => "internal error",
        }
    }

    /// Relative manifest path of the file a verification failure refers to.
    pub fn failing_path(&self) -> Option<&str> {
        match self {
            LauncherError::FileMissing(path)
            | LauncherError::FileCorrupt(path)
            | LauncherError::FileUnreadable { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Transient failures the user can simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LauncherError::NetworkUnavailable(_)
                | LauncherError::Http(_)
                | LauncherError::LaunchInProgress
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for the presentation layer ────────────
// Shipped as `{reason, message, path}`; the UI never inspects internals.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("LauncherError", 3)?;
        state.serialize_field("reason", self.reason())?;
        state.serialize_field("message", &self.to_string())?;
        state.serialize_field("path", &self.failing_path())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_distinguish_unreachable_from_denied() {
        let unreachable = LauncherError::NetworkUnavailable("connection refused".into());
        let denied = LauncherError::AccessDenied {
            status: 403,
            body: "banned".into(),
        };
        assert_eq!(unreachable.reason(), "backend unreachable");
        assert_eq!(denied.reason(), "access denied");
        assert!(unreachable.is_retryable());
        assert!(!denied.is_retryable());
    }

    #[test]
    fn serialized_error_keeps_path_verbatim() {
        let err = LauncherError::FileCorrupt("Data/common.MPQ".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["reason"], "corrupt or modified");
        assert_eq!(json["path"], "Data/common.MPQ");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("Data/common.MPQ"));
    }
}
