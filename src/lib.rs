//! isoenv - Reusable isolated Python environments with declarative
//! requirement reconciliation.
//!
//! Like pipx, but the environment lives at a caller-chosen directory and is
//! populated incrementally: callers declare a flat requirement set and the
//! engine converges the environment toward it, installing only what the
//! persisted installed state is missing. Reconciliation is idempotent and
//! safe across concurrent processes sharing one environment path.
//!
//! # Modules
//!
//! - [`engine`] - Reconciliation engine and engine options
//! - [`error`] - Error types and result alias
//! - [`installer`] - Installer invocation collaborator (pip)
//! - [`lock`] - Cross-process environment lock
//! - [`requirements`] - Specifier parsing and set semantics
//! - [`state`] - Persisted installed-requirements state
//! - [`venv`] - Environment lifecycle collaborator (venv)
//!
//! # Example
//!
//! ```no_run
//! use isoenv::{IsolatedEnvironment, Requirements};
//!
//! let env = IsolatedEnvironment::new("/tmp/tool/venv");
//! let desired = Requirements::parse(["static_ffmpeg", "torch==2.1.2"])?;
//! let vars = env.ensure_installed(&desired)?;
//! std::process::Command::new("static_ffmpeg")
//!     .arg("--help")
//!     .env_clear()
//!     .envs(&vars)
//!     .status()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engine;
pub mod error;
pub mod installer;
pub mod lock;
pub mod requirements;
pub mod state;
pub mod venv;

pub use engine::{IsolatedEnvironment, IsolationOptions};
pub use error::{IsoEnvError, Result};
pub use requirements::{Operator, Requirements, Specifier, SpecifierMatch};
pub use venv::ActivationEnv;

use std::path::Path;

/// Converge the environment at `env_path` toward `requirements` and return
/// its activation mapping.
///
/// One-shot convenience over [`IsolatedEnvironment::ensure_installed`].
pub fn activate<S: AsRef<str>>(env_path: &Path, requirements: &[S]) -> Result<ActivationEnv> {
    let desired = Requirements::parse(requirements.iter().map(|s| s.as_ref()))?;
    IsolatedEnvironment::new(env_path).ensure_installed(&desired)
}

/// Converge the environment and run `program` with `args` inside it.
pub fn run_in<S: AsRef<str>>(
    env_path: &Path,
    requirements: &[S],
    program: &str,
    args: &[&str],
) -> Result<std::process::ExitStatus> {
    let desired = Requirements::parse(requirements.iter().map(|s| s.as_ref()))?;
    let env = IsolatedEnvironment::new(env_path);
    env.ensure_installed(&desired)?;
    env.run(program, args)
}
