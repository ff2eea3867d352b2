//! Environment lifecycle: creation, existence, destruction, activation.
//!
//! The engine consumes this through the [`EnvironmentProvider`] trait so
//! tests can substitute a fake; [`VenvProvider`] is the production
//! implementation backed by `python -m venv`.

use crate::error::{IsoEnvError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment-variable mapping handed to subprocesses so they resolve
/// binaries and packages from the isolated environment.
pub type ActivationEnv = HashMap<String, String>;

/// Lifecycle collaborator consumed by the reconciliation engine.
///
/// `Send + Sync` so an engine holding a provider can be shared across
/// threads reconciling the same environment path.
pub trait EnvironmentProvider: Send + Sync {
    /// Create the environment at `path`. Errors if it already exists.
    fn create(&self, path: &Path) -> Result<()>;

    /// Whether an environment exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Remove the environment at `path`. Errors if it does not exist.
    fn destroy(&self, path: &Path) -> Result<()>;

    /// Build the activation mapping for the environment at `path`.
    fn activation_env(&self, path: &Path) -> Result<ActivationEnv>;
}

/// Production lifecycle provider backed by `python -m venv`.
pub struct VenvProvider {
    python: String,
    full_isolation: bool,
}

impl Default for VenvProvider {
    fn default() -> Self {
        Self {
            python: default_python().to_string(),
            full_isolation: false,
        }
    }
}

impl VenvProvider {
    /// Provider using the default interpreter for this platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the interpreter used to create environments.
    pub fn with_python(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            ..Self::default()
        }
    }

    /// Strip inherited Python state (`PYTHONPATH`, `PYTHONHOME`) from the
    /// activation mapping instead of passing the ambient values through.
    pub fn full_isolation(mut self, enabled: bool) -> Self {
        self.full_isolation = enabled;
        self
    }
}

/// Default interpreter name for this platform.
fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Script directory inside an environment (`bin`, `Scripts` on Windows).
pub fn scripts_dir(env_path: &Path) -> PathBuf {
    if cfg!(windows) {
        env_path.join("Scripts")
    } else {
        env_path.join("bin")
    }
}

impl EnvironmentProvider for VenvProvider {
    fn create(&self, path: &Path) -> Result<()> {
        if self.exists(path) {
            return Err(IsoEnvError::EnvironmentExists {
                path: path.to_path_buf(),
            });
        }

        tracing::info!(env = %path.display(), python = %self.python, "creating environment");
        let output = Command::new(&self.python)
            .arg("-m")
            .arg("venv")
            .arg(path)
            .output()
            .map_err(|e| IsoEnvError::ProvisionFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(IsoEnvError::ProvisionFailed {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.join("pyvenv.cfg").is_file()
    }

    fn destroy(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(IsoEnvError::EnvironmentMissing {
                path: path.to_path_buf(),
            });
        }
        tracing::info!(env = %path.display(), "destroying environment");
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    fn activation_env(&self, path: &Path) -> Result<ActivationEnv> {
        let mut env: ActivationEnv = std::env::vars().collect();

        // The interpreter must not resolve modules from ambient state.
        env.remove("PYTHONHOME");
        if self.full_isolation {
            env.remove("PYTHONPATH");
        }

        let scripts = scripts_dir(path);
        let separator = if cfg!(windows) { ";" } else { ":" };
        let new_path = match env.get("PATH") {
            Some(current) => format!("{}{}{}", scripts.display(), separator, current),
            None => scripts.display().to_string(),
        };
        env.insert("PATH".to_string(), new_path);
        env.insert("VIRTUAL_ENV".to_string(), path.display().to_string());

        Ok(env)
    }
}
