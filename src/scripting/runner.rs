//! One-shot script execution against the application root.

use std::fmt;
use std::path::Path;

use super::host::{Evaluation, ScriptHost};
use crate::config::ScriptConfig;
use crate::core::ScriptError;
use crate::host::{Goxel, CLASSES};

/// Result of [`run_script`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The script ran to completion.
    Completed,
    /// The script threw. The diagnostic has already been reported.
    ScriptRaised(String),
    /// The script file could not be read.
    Unreadable,
    /// The engine could not be set up.
    Failed(String),
}

impl RunStatus {
    /// A thrown exception still counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::ScriptRaised(_))
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Completed | RunStatus::ScriptRaised(_) => 0,
            RunStatus::Unreadable => 1,
            RunStatus::Failed(_) => 2,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::ScriptRaised(_) => write!(f, "completed with an uncaught exception"),
            RunStatus::Unreadable => write!(f, "script unreadable"),
            RunStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Creates a fresh engine, binds `root` under the configured global name,
/// runs the file at `path` and tears the engine down again.
pub fn run_script(path: impl AsRef<Path>, root: &mut Goxel, config: &ScriptConfig) -> RunStatus {
    match ScriptHost::new(config.clone()) {
        Ok(host) => run_with(host, path.as_ref(), root),
        Err(err) => {
            tracing::error!(target: "scripting", "Invalid script configuration: {}", err);
            RunStatus::Failed(err.to_string())
        }
    }
}

/// Like [`run_script`], on a host that has not been bootstrapped yet.
pub fn run_with<'host>(
    mut host: ScriptHost<'host>,
    path: &Path,
    root: &'host mut Goxel,
) -> RunStatus {
    if let Err(err) = host.bootstrap(&CLASSES, root) {
        tracing::error!(target: "scripting", "Script bootstrap failed: {}", err);
        return RunStatus::Failed(err.to_string());
    }

    let status = match host.run_file(path) {
        Ok(Evaluation::Completed) => RunStatus::Completed,
        Ok(Evaluation::Raised(diagnostic)) => RunStatus::ScriptRaised(diagnostic),
        Err(ScriptError::Unreadable { path, source }) => {
            tracing::error!(target: "scripting", "Cannot read {}: {}", path.display(), source);
            RunStatus::Unreadable
        }
        Err(err) => {
            tracing::error!(target: "scripting", "Script execution failed: {}", err);
            RunStatus::Failed(err.to_string())
        }
    };

    host.shutdown();
    tracing::info!(target: "scripting", script = %path.display(), status = %status, "Script finished");
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Completed.exit_code(), 0);
        assert_eq!(RunStatus::ScriptRaised("x".into()).exit_code(), 0);
        assert_eq!(RunStatus::Unreadable.exit_code(), 1);
        assert_eq!(RunStatus::Failed("x".into()).exit_code(), 2);
        assert!(RunStatus::ScriptRaised("x".into()).is_success());
        assert!(!RunStatus::Unreadable.is_success());
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let mut goxel = Goxel::new();
        let status = run_script(
            "/no/such/dir/scene.js",
            &mut goxel,
            &ScriptConfig::default(),
        );
        assert_eq!(status, RunStatus::Unreadable);
    }

    #[test]
    fn test_invalid_config_fails() {
        let mut config = ScriptConfig::default();
        config.bindings.root_global = String::new();
        let mut goxel = Goxel::new();
        let status = run_script("scene.js", &mut goxel, &config);
        assert!(matches!(status, RunStatus::Failed(_)));
        assert_eq!(status.exit_code(), 2);
    }
}
