//! Code sandbox runner: confirmation gate, execution, dependency repair and
//! output classification.
//!
//! One [`CodeExecutor::execute`] call walks
//! `EXTRACT -> CONFIRM -> RUN -> [DIAGNOSE -> REPAIR -> CONFIRM -> RETRY] -> CLASSIFY`
//! and always ends in an [`ExecutionResult`]. Code never runs without an
//! affirmative operator answer, and the runner retries at most once.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::find_failure_indicator;
use crate::core::diagnose::{detect_missing_modules, known_package_for};
use crate::core::extract::extract_code;
use crate::core::types::{ExecutionResult, FailureKind};
use crate::io::config::SandboxConfig;
use crate::io::operator::Operator;
use crate::io::process::{CommandOutput, command_from, run_command_with_timeout};

/// Maps an import name to an installable package name.
pub trait PackageResolver {
    fn resolve(&mut self, module: &str, stderr: &str) -> Result<String>;
}

/// Static alias table, falling back to the module name itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPackageResolver;

impl PackageResolver for StaticPackageResolver {
    fn resolve(&mut self, module: &str, _stderr: &str) -> Result<String> {
        Ok(known_package_for(module).unwrap_or(module).to_string())
    }
}

/// Executes generated code on the operator's behalf.
pub trait CodeExecutor {
    /// Run `raw` (model output or plain code) to a terminal outcome.
    ///
    /// Sandbox failures are values; `Err` means the operator channel itself failed.
    fn execute(
        &self,
        raw: &str,
        operator: &dyn Operator,
        resolver: &mut dyn PackageResolver,
    ) -> Result<ExecutionResult>;
}

/// Interpreter and package-manager commands after environment resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxCommands {
    pub interpreter: Vec<String>,
    pub install: Vec<String>,
    pub show: Vec<String>,
}

impl SandboxCommands {
    /// Prefer `<env>/bin/python` and `<env>/bin/pip`; fall back to the
    /// configured commands when no environment is set or it is incomplete.
    pub fn resolve(config: &SandboxConfig) -> Self {
        let configured = Self {
            interpreter: config.interpreter.clone(),
            install: config.install_command.clone(),
            show: config.show_command.clone(),
        };
        let Some(env) = &config.exec_env else {
            return configured;
        };
        // Commands spawn inside the workdir, so a relative env must be anchored here.
        let env = match std::path::absolute(env) {
            Ok(env) => env,
            Err(e) => {
                warn!(env = %env.display(), err = %e, "cannot resolve execution environment path");
                return configured;
            }
        };
        let python = env.join("bin").join("python");
        let pip = env.join("bin").join("pip");
        if !python.is_file() || !pip.is_file() {
            warn!(
                env = %env.display(),
                "execution environment has no bin/python or bin/pip, using configured interpreter"
            );
            return configured;
        }
        let python = python.to_string_lossy().into_owned();
        let pip = pip.to_string_lossy().into_owned();
        Self {
            interpreter: vec![python],
            install: vec![pip.clone(), "install".to_string()],
            show: vec![pip, "show".to_string()],
        }
    }
}

pub struct SandboxRunner {
    workdir: PathBuf,
    script_name: String,
    commands: SandboxCommands,
    timeout: Duration,
    install_timeout: Duration,
    output_limit_bytes: usize,
    failure_indicators: Vec<String>,
}

impl SandboxRunner {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            workdir: config.workdir.clone(),
            script_name: config.script_name.clone(),
            commands: SandboxCommands::resolve(config),
            timeout: Duration::from_secs(config.timeout_secs),
            install_timeout: Duration::from_secs(config.install_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            failure_indicators: config.failure_indicators.clone(),
        }
    }

    pub fn commands(&self) -> &SandboxCommands {
        &self.commands
    }

    pub fn script_path(&self) -> PathBuf {
        self.workdir.join(&self.script_name)
    }

    /// Write the script (overwriting the previous one) and run it.
    #[instrument(skip_all, fields(script = %self.script_name))]
    fn run_script(&self, code: &str) -> Result<CommandOutput> {
        fs::create_dir_all(&self.workdir)
            .with_context(|| format!("create sandbox dir {}", self.workdir.display()))?;
        let path = self.script_path();
        fs::write(&path, code).with_context(|| format!("write script {}", path.display()))?;
        let mut cmd = command_from(&self.commands.interpreter, &[self.script_name.as_str()])
            .context("build interpreter command")?;
        cmd.current_dir(&self.workdir);
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)?;
        info!(
            exit_code = ?output.status.code(),
            timed_out = output.timed_out,
            "script finished"
        );
        Ok(output)
    }

    fn package_command(&self, argv: &[String], package: &str, timeout: Duration) -> Result<CommandOutput> {
        let mut cmd = command_from(argv, &[package])?;
        cmd.current_dir(&self.workdir);
        run_command_with_timeout(cmd, timeout, self.output_limit_bytes)
    }

    fn is_installed(&self, package: &str) -> bool {
        match self.package_command(&self.commands.show, package, self.install_timeout) {
            Ok(output) => output.succeeded(),
            Err(e) => {
                warn!(package, err = %format!("{e:#}"), "installed-check failed");
                false
            }
        }
    }

    /// Resolve and install every missing module. `Err` carries the failure detail.
    #[instrument(skip_all, fields(modules = ?modules))]
    fn repair(
        &self,
        modules: &[String],
        stderr: &str,
        resolver: &mut dyn PackageResolver,
    ) -> std::result::Result<Vec<String>, String> {
        let mut installed = Vec::new();
        for module in modules {
            let package = resolver
                .resolve(module, stderr)
                .map_err(|e| format!("could not resolve a package for module '{module}': {e:#}"))?;
            if self.is_installed(&package) {
                debug!(%module, %package, "package already installed");
                continue;
            }
            info!(%module, %package, "installing package");
            let output = self
                .package_command(&self.commands.install, &package, self.install_timeout)
                .map_err(|e| format!("could not run installer for '{package}': {e:#}"))?;
            if !output.succeeded() {
                return Err(format!(
                    "installing '{package}' for module '{module}' failed\n\n{}",
                    describe(&output)
                ));
            }
            installed.push(package);
        }
        Ok(installed)
    }

    /// Show a terminal failure and attach the operator's optional feedback.
    fn finish(&self, operator: &dyn Operator, result: ExecutionResult) -> Result<ExecutionResult> {
        operator.present("Execution failed", &result.render());
        let feedback = operator.ask("Any feedback for the next revision? (Enter to skip)")?;
        Ok(result.with_operator_feedback(Some(feedback)))
    }

    fn decline(&self, operator: &dyn Operator) -> Result<ExecutionResult> {
        let reason = operator.ask("Why not? What should change? (Enter to skip)")?;
        let reason = reason.trim();
        info!("operator declined execution");
        Ok(ExecutionResult::Declined {
            reason: (!reason.is_empty()).then(|| reason.to_string()),
        })
    }
}

impl CodeExecutor for SandboxRunner {
    #[instrument(skip_all)]
    fn execute(
        &self,
        raw: &str,
        operator: &dyn Operator,
        resolver: &mut dyn PackageResolver,
    ) -> Result<ExecutionResult> {
        let code = extract_code(raw);
        if code.trim().is_empty() {
            return self.finish(
                operator,
                ExecutionResult::failure(FailureKind::NoCodeDetected, "no valid code detected"),
            );
        }

        operator.present("Generated code", &code);
        if !operator.confirm("Execute this code?")? {
            return self.decline(operator);
        }

        let first = match self.run_script(&code) {
            Ok(output) => output,
            Err(e) => {
                return self.finish(
                    operator,
                    ExecutionResult::failure(FailureKind::ExceptionInHarness, format!("{e:#}")),
                );
            }
        };

        let mut retried = false;
        let outcome = if first.succeeded() || first.timed_out {
            first
        } else {
            let stderr = first.stderr_text();
            let missing = detect_missing_modules(&stderr);
            if missing.is_empty() {
                first
            } else {
                match self.repair(&missing, &stderr, resolver) {
                    Err(detail) => {
                        return self.finish(
                            operator,
                            ExecutionResult::failure(FailureKind::MissingDependencyUnresolved, detail),
                        );
                    }
                    Ok(installed) => {
                        let listing = if installed.is_empty() {
                            format!("Already installed: {}", missing.join(", "))
                        } else {
                            format!("Installed: {}", installed.join(", "))
                        };
                        operator.present("Dependencies repaired", &listing);
                    }
                }
                if !operator.confirm("Re-run the code now?")? {
                    return self.decline(operator);
                }
                retried = true;
                match self.run_script(&code) {
                    Ok(output) => output,
                    Err(e) => {
                        return self.finish(
                            operator,
                            ExecutionResult::failure(FailureKind::ExceptionInHarness, format!("{e:#}")),
                        );
                    }
                }
            }
        };

        if !outcome.succeeded() {
            let still_missing =
                retried && !detect_missing_modules(&outcome.stderr_text()).is_empty();
            let kind = if still_missing {
                FailureKind::MissingDependencyUnresolved
            } else {
                FailureKind::RuntimeError
            };
            return self.finish(operator, ExecutionResult::failure(kind, describe(&outcome)));
        }

        let stdout = outcome.stdout_text();
        if let Some(indicator) = find_failure_indicator(&stdout, &self.failure_indicators) {
            warn!(indicator, "failure indicator in output of a zero exit");
            return self.finish(
                operator,
                ExecutionResult::failure(
                    FailureKind::ErrorDetectedInOutput,
                    format!("output contains \"{indicator}\"\n\n{}", describe(&outcome)),
                ),
            );
        }

        operator.present("Execution output", &stdout);
        Ok(ExecutionResult::Success { stdout })
    }
}

fn describe(output: &CommandOutput) -> String {
    let status = if output.timed_out {
        "timed out".to_string()
    } else {
        match output.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    };
    format!(
        "{status}\n\n=== stderr ===\n{}\n\n=== stdout ===\n{}",
        output.stderr_text().trim_end(),
        output.stdout_text().trim_end()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::test_support::ScriptedOperator;

    fn sh_config(workdir: &Path) -> SandboxConfig {
        SandboxConfig {
            workdir: workdir.to_path_buf(),
            script_name: "temp_code.sh".to_string(),
            interpreter: vec!["sh".to_string()],
            timeout_secs: 10,
            ..SandboxConfig::default()
        }
    }

    #[test]
    fn empty_code_fails_without_asking_to_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = SandboxRunner::new(&sh_config(temp.path()));
        let operator = ScriptedOperator::new().answer("");
        let result = runner
            .execute("```python\n```", &operator, &mut StaticPackageResolver)
            .expect("execute");
        assert_eq!(result.failure_kind(), Some(FailureKind::NoCodeDetected));
        assert_eq!(operator.confirmations_asked(), 0);
        assert!(!runner.script_path().exists());
    }

    #[test]
    fn decline_never_writes_or_runs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = SandboxRunner::new(&sh_config(temp.path()));
        let operator = ScriptedOperator::new().confirm(false).answer("use awk instead");
        let result = runner
            .execute("touch ran.txt", &operator, &mut StaticPackageResolver)
            .expect("execute");
        assert_eq!(
            result,
            ExecutionResult::Declined {
                reason: Some("use awk instead".to_string())
            }
        );
        assert!(!temp.path().join("ran.txt").exists());
    }

    #[test]
    fn clean_run_succeeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = SandboxRunner::new(&sh_config(temp.path()));
        let operator = ScriptedOperator::new().confirm(true);
        let result = runner
            .execute("```sh\necho 'Result: 42'\n```", &operator, &mut StaticPackageResolver)
            .expect("execute");
        assert_eq!(
            result,
            ExecutionResult::Success {
                stdout: "Result: 42\n".to_string()
            }
        );
    }

    #[test]
    fn nonzero_exit_is_runtime_error_with_feedback() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = SandboxRunner::new(&sh_config(temp.path()));
        let operator = ScriptedOperator::new().confirm(true).answer("divide safely");
        let result = runner
            .execute("echo 'division by zero' >&2; exit 2", &operator, &mut StaticPackageResolver)
            .expect("execute");
        assert_eq!(result.failure_kind(), Some(FailureKind::RuntimeError));
        assert_eq!(result.operator_feedback(), Some("divide safely"));
        assert!(result.render().contains("exit code 2"));
    }

    #[test]
    fn timeout_is_runtime_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path());
        config.timeout_secs = 1;
        let runner = SandboxRunner::new(&config);
        let operator = ScriptedOperator::new().confirm(true).answer("");
        let result = runner
            .execute("sleep 5", &operator, &mut StaticPackageResolver)
            .expect("execute");
        assert_eq!(result.failure_kind(), Some(FailureKind::RuntimeError));
        assert!(result.render().contains("timed out"));
    }

    #[test]
    fn missing_interpreter_is_harness_exception() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path());
        config.interpreter = vec!["definitely-not-an-interpreter".to_string()];
        let runner = SandboxRunner::new(&config);
        let operator = ScriptedOperator::new().confirm(true).answer("");
        let result = runner
            .execute("echo hi", &operator, &mut StaticPackageResolver)
            .expect("execute");
        assert_eq!(result.failure_kind(), Some(FailureKind::ExceptionInHarness));
    }

    #[test]
    fn incomplete_exec_env_falls_back_to_configured_commands() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = sh_config(temp.path());
        config.exec_env = Some(temp.path().join("venv"));
        assert_eq!(SandboxCommands::resolve(&config).interpreter, vec!["sh".to_string()]);

        let bin = temp.path().join("venv").join("bin");
        fs::create_dir_all(&bin).expect("mkdir");
        fs::write(bin.join("python"), "").expect("write");
        fs::write(bin.join("pip"), "").expect("write");
        let commands = SandboxCommands::resolve(&config);
        assert!(commands.interpreter[0].ends_with("bin/python"));
        assert_eq!(commands.install[1], "install");
        assert_eq!(commands.show[1], "show");
    }

    #[cfg(unix)]
    #[test]
    fn relative_exec_env_runs_from_the_sandbox_workdir() {
        use std::os::unix::fs::PermissionsExt;

        let env_dir = tempfile::Builder::new()
            .prefix("exec_env")
            .tempdir_in(".")
            .expect("env dir");
        let bin = env_dir.path().join("bin");
        fs::create_dir_all(&bin).expect("mkdir");
        for (name, body) in [("python", "#!/bin/sh\nexec sh \"$@\"\n"), ("pip", "#!/bin/sh\nexit 0\n")] {
            let path = bin.join(name);
            fs::write(&path, body).expect("write wrapper");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        let relative = Path::new(env_dir.path().file_name().expect("env dir name"));
        assert!(relative.is_relative());

        let workdir = tempfile::tempdir().expect("workdir");
        let mut config = sh_config(workdir.path());
        config.exec_env = Some(relative.to_path_buf());
        let runner = SandboxRunner::new(&config);
        assert!(Path::new(&runner.commands().interpreter[0]).is_absolute());
        assert!(Path::new(&runner.commands().install[0]).is_absolute());

        let operator = ScriptedOperator::new().confirm(true);
        let result = runner
            .execute("echo ok", &operator, &mut StaticPackageResolver)
            .expect("execute");
        assert_eq!(
            result,
            ExecutionResult::Success {
                stdout: "ok\n".to_string()
            }
        );
    }

    #[test]
    fn static_resolver_uses_alias_table() {
        let mut resolver = StaticPackageResolver;
        assert_eq!(resolver.resolve("cv2", "").expect("resolve"), "opencv-python");
        assert_eq!(resolver.resolve("numpy", "").expect("resolve"), "numpy");
    }
}
