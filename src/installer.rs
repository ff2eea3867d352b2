//! Installer invocation collaborator.
//!
//! The engine hands each missing specifier to a [`PackageInstaller`];
//! [`PipInstaller`] is the production implementation invoking the
//! environment's own `pip`. Tests substitute a recording fake.

use crate::error::{IsoEnvError, Result};
use crate::venv::scripts_dir;
use std::path::Path;
use std::process::Command;

/// Installer collaborator consumed by the reconciliation engine.
///
/// `Send + Sync` so an engine holding an installer can be shared across
/// threads reconciling the same environment path.
pub trait PackageInstaller: Send + Sync {
    /// Install one package into the environment at `env_path`.
    ///
    /// `package` is the canonical specifier string (`name` or
    /// `name<op><version>`); `options` are the specifier's extra installer
    /// flags followed by any engine-level arguments.
    fn install(&self, env_path: &Path, package: &str, options: &[String]) -> Result<()>;
}

/// Production installer invoking `<env>/bin/pip install`.
#[derive(Debug, Default)]
pub struct PipInstaller;

impl PipInstaller {
    pub fn new() -> Self {
        Self
    }
}

impl PackageInstaller for PipInstaller {
    fn install(&self, env_path: &Path, package: &str, options: &[String]) -> Result<()> {
        let pip = scripts_dir(env_path).join(if cfg!(windows) { "pip.exe" } else { "pip" });

        tracing::info!(
            env = %env_path.display(),
            package,
            ?options,
            "installing package"
        );

        let output = Command::new(&pip)
            .arg("install")
            .arg(package)
            .args(options)
            .output()
            .map_err(|e| IsoEnvError::InstallFailed {
                package: format!("{package} ({e})"),
                code: None,
            })?;

        if !output.status.success() {
            tracing::warn!(
                package,
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "install failed"
            );
            return Err(IsoEnvError::InstallFailed {
                package: package.to_string(),
                code: output.status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pip_binary_is_an_install_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipInstaller::new()
            .install(&dir.path().join("venv"), "package1", &[])
            .unwrap_err();
        assert!(matches!(err, IsoEnvError::InstallFailed { .. }));
    }
}
