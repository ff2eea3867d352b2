//! Requirement reconciliation engine.
//!
//! [`IsolatedEnvironment`] converges an on-disk environment toward a desired
//! requirement set: it provisions the environment on first use, diffs the
//! desired set against the persisted installed set, invokes the installer for
//! each missing specifier, and commits the new state only after the whole
//! diff loop succeeds. The entire sequence runs under the cross-process
//! environment lock.

use crate::error::Result;
use crate::installer::{PackageInstaller, PipInstaller};
use crate::lock::EnvLock;
use crate::requirements::Requirements;
use crate::state;
use crate::venv::{ActivationEnv, EnvironmentProvider, VenvProvider};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Configuration threaded through engine construction.
///
/// Deliberately plain data; there is no process-global configuration state.
#[derive(Debug, Clone, Default)]
pub struct IsolationOptions {
    /// Strip inherited Python state from the activation mapping.
    /// Deprecated: environments are already isolated for subprocess use;
    /// requesting it logs a warning at construction.
    pub full_isolation: bool,
    /// Extra arguments appended to every installer invocation
    /// (e.g. `--use-pep517`).
    pub install_args: Vec<String>,
    /// Interpreter used to create environments (`python3` by default).
    pub python: Option<String>,
}

/// A reusable, on-disk isolated package environment.
pub struct IsolatedEnvironment {
    env_path: PathBuf,
    provider: Box<dyn EnvironmentProvider>,
    installer: Box<dyn PackageInstaller>,
    options: IsolationOptions,
}

impl IsolatedEnvironment {
    /// Engine for `env_path` with the production venv/pip collaborators.
    pub fn new(env_path: impl Into<PathBuf>) -> Self {
        Self::with_options(env_path, IsolationOptions::default())
    }

    /// Engine with explicit options and production collaborators.
    pub fn with_options(env_path: impl Into<PathBuf>, options: IsolationOptions) -> Self {
        if options.full_isolation {
            tracing::warn!(
                "full_isolation is deprecated; environments are already isolated for subprocess use"
            );
        }
        let provider = match &options.python {
            Some(python) => VenvProvider::with_python(python),
            None => VenvProvider::new(),
        }
        .full_isolation(options.full_isolation);

        Self {
            env_path: env_path.into(),
            provider: Box::new(provider),
            installer: Box::new(PipInstaller::new()),
            options,
        }
    }

    /// Engine with caller-supplied collaborators, for tests and embedding.
    pub fn with_collaborators(
        env_path: impl Into<PathBuf>,
        provider: Box<dyn EnvironmentProvider>,
        installer: Box<dyn PackageInstaller>,
        options: IsolationOptions,
    ) -> Self {
        Self {
            env_path: env_path.into(),
            provider,
            installer,
            options,
        }
    }

    /// Path of the environment directory.
    pub fn path(&self) -> &Path {
        &self.env_path
    }

    /// Whether the environment exists on disk.
    pub fn installed(&self) -> bool {
        self.provider.exists(&self.env_path)
    }

    /// The persisted requirement set (empty when no state file exists).
    pub fn installed_requirements(&self) -> Result<Requirements> {
        state::load(&self.env_path)
    }

    /// Converge the environment toward `desired` and return its activation
    /// mapping.
    ///
    /// Runs entirely under the environment lock:
    /// 1. load persisted state (empty if absent),
    /// 2. provision the environment on first use and persist an empty set,
    /// 3. return early when `desired` equals persisted (idempotent no-op),
    /// 4. install each desired specifier not already satisfied,
    /// 5. commit the union as the new persisted state (skipped when the
    ///    diff loop installed nothing, e.g. `desired` is a subset of
    ///    persisted).
    ///
    /// An installer failure aborts the loop before the commit, leaving
    /// persisted state exactly as it was. Packages installed before the
    /// failing one remain physically present but unrecorded; a later call
    /// re-invokes install for them.
    pub fn ensure_installed(&self, desired: &Requirements) -> Result<ActivationEnv> {
        let _guard = EnvLock::acquire(&self.env_path)?;

        let persisted = if self.provider.exists(&self.env_path) {
            state::load(&self.env_path)?
        } else {
            self.provider.create(&self.env_path)?;
            let empty = Requirements::new();
            state::save(&self.env_path, &empty)?;
            empty
        };

        if &persisted == desired {
            tracing::debug!(env = %self.env_path.display(), "requirements already satisfied");
            return self.provider.activation_env(&self.env_path);
        }

        let mut installed = persisted.clone();
        let mut installed_any = false;
        for (raw, spec) in desired.entries() {
            if persisted.contains_spec(spec) {
                continue;
            }
            let mut options = spec.extra_args();
            options.extend(self.options.install_args.iter().cloned());
            self.installer
                .install(&self.env_path, &spec.package_arg(), &options)?;
            installed.add(raw)?;
            installed_any = true;
        }

        if installed_any {
            state::save(&self.env_path, &installed)?;
            tracing::debug!(
                env = %self.env_path.display(),
                count = installed.len(),
                "committed installed state"
            );
        } else {
            tracing::debug!(env = %self.env_path.display(), "nothing to install");
        }

        self.provider.activation_env(&self.env_path)
    }

    /// Provision the environment if missing and return its activation
    /// mapping, without reconciling requirements.
    pub fn environment(&self) -> Result<ActivationEnv> {
        let _guard = EnvLock::acquire(&self.env_path)?;

        if !self.provider.exists(&self.env_path) {
            self.provider.create(&self.env_path)?;
            state::save(&self.env_path, &Requirements::new())?;
        }
        self.provider.activation_env(&self.env_path)
    }

    /// Destroy the environment directory and its persisted state.
    pub fn clean(&self) -> Result<()> {
        let _guard = EnvLock::acquire(&self.env_path)?;
        self.provider.destroy(&self.env_path)
    }

    /// Run a command under the activated environment.
    ///
    /// Thin delegation to [`std::process::Command`]; the child inherits the
    /// parent's stdio. The environment must already be provisioned (use
    /// [`ensure_installed`](Self::ensure_installed) first).
    pub fn run(&self, program: &str, args: &[&str]) -> Result<ExitStatus> {
        let env = self.provider.activation_env(&self.env_path)?;
        let status = std::process::Command::new(program)
            .args(args)
            .env_clear()
            .envs(&env)
            .status()?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IsoEnvError;
    use std::sync::{Arc, Mutex};

    /// Lifecycle fake: a directory with a marker file stands in for a venv.
    struct FakeProvider;

    impl EnvironmentProvider for FakeProvider {
        fn create(&self, path: &Path) -> Result<()> {
            if self.exists(path) {
                return Err(IsoEnvError::EnvironmentExists {
                    path: path.to_path_buf(),
                });
            }
            std::fs::create_dir_all(path)?;
            std::fs::write(path.join("pyvenv.cfg"), "fake\n")?;
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            path.join("pyvenv.cfg").is_file()
        }

        fn destroy(&self, path: &Path) -> Result<()> {
            std::fs::remove_dir_all(path)?;
            Ok(())
        }

        fn activation_env(&self, path: &Path) -> Result<ActivationEnv> {
            let mut env = ActivationEnv::new();
            env.insert("VIRTUAL_ENV".to_string(), path.display().to_string());
            Ok(env)
        }
    }

    /// Installer fake recording every invocation, optionally failing on one
    /// package.
    #[derive(Default)]
    struct RecordingInstaller {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail_on: Option<String>,
    }

    impl RecordingInstaller {
        fn failing_on(package: &str) -> Self {
            Self {
                fail_on: Some(package.to_string()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PackageInstaller for Arc<RecordingInstaller> {
        fn install(&self, _env_path: &Path, package: &str, options: &[String]) -> Result<()> {
            if self.fail_on.as_deref() == Some(package) {
                return Err(IsoEnvError::InstallFailed {
                    package: package.to_string(),
                    code: Some(1),
                });
            }
            self.calls
                .lock()
                .unwrap()
                .push((package.to_string(), options.to_vec()));
            Ok(())
        }
    }

    fn engine_with(
        env_path: &Path,
        installer: RecordingInstaller,
        options: IsolationOptions,
    ) -> (IsolatedEnvironment, Arc<RecordingInstaller>) {
        let installer = Arc::new(installer);
        let engine = IsolatedEnvironment::with_collaborators(
            env_path,
            Box::new(FakeProvider),
            Box::new(installer.clone()),
            options,
        );
        (engine, installer)
    }

    #[test]
    fn provisions_environment_and_empty_state_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, _) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        let env = engine.ensure_installed(&Requirements::new()).unwrap();
        assert!(engine.installed());
        assert!(engine.installed_requirements().unwrap().is_empty());
        assert_eq!(
            env.get("VIRTUAL_ENV").map(String::as_str),
            Some(env_path.display().to_string().as_str())
        );
    }

    #[test]
    fn installs_each_desired_specifier_once() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, installer) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        let desired = Requirements::parse([
            "package1==1.0.0 --extra-index-url https://pypi.org/simple",
            "package2>=1.0.0",
        ])
        .unwrap();
        engine.ensure_installed(&desired).unwrap();

        let calls = installer.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "package1==1.0.0");
        assert_eq!(
            calls[0].1,
            vec![
                "--extra-index-url".to_string(),
                "https://pypi.org/simple".to_string()
            ]
        );
        assert_eq!(calls[1].0, "package2>=1.0.0");
        assert_eq!(engine.installed_requirements().unwrap(), desired);
    }

    #[test]
    fn second_reconcile_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, installer) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        let desired = Requirements::parse(["package1==1.0.0", "package2>=1.0.0"]).unwrap();
        engine.ensure_installed(&desired).unwrap();
        let after_first = installer.calls().len();

        engine.ensure_installed(&desired).unwrap();
        assert_eq!(installer.calls().len(), after_first);
    }

    #[test]
    fn reordered_desired_set_is_still_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, installer) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        engine
            .ensure_installed(
                &Requirements::parse(["package1==1.0.0", "package2>=1.0.0"]).unwrap(),
            )
            .unwrap();
        let after_first = installer.calls().len();

        engine
            .ensure_installed(
                &Requirements::parse(["package2>=1.0.0", "package1==1.0.0"]).unwrap(),
            )
            .unwrap();
        assert_eq!(installer.calls().len(), after_first);
    }

    #[test]
    fn diff_installs_only_missing_specifiers() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, installer) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        engine
            .ensure_installed(&Requirements::parse(["a==1.0.0", "b==1.0.0"]).unwrap())
            .unwrap();
        engine
            .ensure_installed(&Requirements::parse(["a==1.0.0", "b==1.0.0", "c==1.0.0"]).unwrap())
            .unwrap();

        let calls = installer.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].0, "c==1.0.0");
    }

    #[test]
    fn install_failure_leaves_persisted_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, _) = engine_with(
            &env_path,
            RecordingInstaller::failing_on("b==1.0.0"),
            IsolationOptions::default(),
        );

        let desired = Requirements::parse(["a==1.0.0", "b==1.0.0"]).unwrap();
        let err = engine.ensure_installed(&desired).unwrap_err();
        assert!(matches!(err, IsoEnvError::InstallFailed { .. }));

        // `a` was installed physically but must not be recorded.
        assert!(engine.installed_requirements().unwrap().is_empty());
    }

    #[test]
    fn repeated_reconciles_produce_identical_state_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, _) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        let desired = Requirements::parse(["package2>=1.0.0", "package1==1.0.0"]).unwrap();
        engine.ensure_installed(&desired).unwrap();
        let first = std::fs::read(crate::state::state_path(&env_path)).unwrap();

        engine.ensure_installed(&desired).unwrap();
        let second = std::fs::read(crate::state::state_path(&env_path)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn engine_level_install_args_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, installer) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions {
                install_args: vec!["--use-pep517".to_string()],
                ..Default::default()
            },
        );

        engine
            .ensure_installed(&Requirements::parse(["pkg --pre"]).unwrap())
            .unwrap();

        let calls = installer.calls();
        assert_eq!(
            calls[0].1,
            vec!["--pre".to_string(), "--use-pep517".to_string()]
        );
    }

    #[test]
    fn environment_provisions_without_reconciling() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, installer) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        let env = engine.environment().unwrap();
        assert!(engine.installed());
        assert!(env.contains_key("VIRTUAL_ENV"));
        assert!(installer.calls().is_empty());
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IsolatedEnvironment>();
    }

    #[test]
    fn subset_desired_set_does_not_rewrite_state() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, installer) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        engine
            .ensure_installed(&Requirements::parse(["a==1.0.0", "b==1.0.0"]).unwrap())
            .unwrap();
        let state_file = crate::state::state_path(&env_path);
        let modified = std::fs::metadata(&state_file).unwrap().modified().unwrap();
        let after_first = installer.calls().len();

        // Equality misses (desired is a strict subset) but the diff loop
        // installs nothing, so the state file must not be rewritten.
        std::thread::sleep(std::time::Duration::from_millis(200));
        engine
            .ensure_installed(&Requirements::parse(["a==1.0.0"]).unwrap())
            .unwrap();

        assert_eq!(installer.calls().len(), after_first);
        assert_eq!(
            std::fs::metadata(&state_file).unwrap().modified().unwrap(),
            modified
        );
        // Nothing was uninstalled; the persisted union keeps `b`.
        assert!(engine
            .installed_requirements()
            .unwrap()
            .contains_str("b==1.0.0")
            .unwrap());
    }

    #[test]
    fn clean_removes_environment() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("venv");
        let (engine, _) = engine_with(
            &env_path,
            RecordingInstaller::default(),
            IsolationOptions::default(),
        );

        engine.ensure_installed(&Requirements::new()).unwrap();
        assert!(engine.installed());
        engine.clean().unwrap();
        assert!(!engine.installed());
    }
}
