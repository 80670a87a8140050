//! Lab configuration stored in `lab.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::DEFAULT_FAILURE_INDICATORS;
use crate::core::types::{Mode, TerminationPolicy};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lab.toml";

/// Lab configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// lab ships with; CLI flags override individual fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabConfig {
    pub llm: LlmConfig,
    pub temperatures: Temperatures,
    pub run: RunConfig,
    pub sandbox: SandboxConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Generate endpoint of the model server.
    pub endpoint: String,
    pub model: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Extra attempts after a transport error or a retryable status.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            model: "qwq:latest".to_string(),
            timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 1000,
        }
    }
}

/// Sampling temperature per role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Temperatures {
    pub browsing: f64,
    pub planning: f64,
    pub research: f64,
    pub coding: f64,
    pub review: f64,
    pub critique: f64,
    pub execution: f64,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            browsing: 0.3,
            planning: 0.3,
            research: 0.3,
            coding: 0.2,
            review: 0.4,
            critique: 0.4,
            execution: 0.1,
        }
    }
}

impl Temperatures {
    fn all(&self) -> [(&'static str, f64); 7] {
        [
            ("browsing", self.browsing),
            ("planning", self.planning),
            ("research", self.research),
            ("coding", self.coding),
            ("review", self.review),
            ("critique", self.critique),
            ("execution", self.execution),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub mode: Mode,
    /// Rounds per `coordinate` invocation.
    pub max_rounds: u32,
    /// Executions per round; values above 1 enable the nested fix loop.
    pub max_code_iterations: u32,
    pub termination: TerminationPolicy,
    /// Ask the model for a run plan and require operator approval.
    pub plan_approval: bool,
    /// Ask the model for a coding plan and require operator approval before writing code.
    pub code_plan_approval: bool,
    /// Review failures with an analysis call followed by a fix call.
    pub two_stage_review: bool,
    /// Ask the operator before starting another batch of rounds.
    pub continue_prompt: bool,
    pub output_dir: PathBuf,
    /// Maximum prompt size before droppable sections are cut.
    pub prompt_budget_bytes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Both,
            max_rounds: 3,
            max_code_iterations: 1,
            termination: TerminationPolicy::FirstSuccess,
            plan_approval: false,
            code_plan_approval: false,
            two_stage_review: true,
            continue_prompt: true,
            output_dir: PathBuf::from("output_agent"),
            prompt_budget_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Isolated environment root; `<env>/bin/python` and `<env>/bin/pip` are used when present.
    pub exec_env: Option<PathBuf>,
    /// Working directory for generated programs.
    pub workdir: PathBuf,
    /// Fixed file name the program is written to (overwritten each execution).
    pub script_name: String,
    /// Interpreter command; the script path is appended.
    pub interpreter: Vec<String>,
    /// Installer command; the package name is appended.
    pub install_command: Vec<String>,
    /// Installed-check command; exits 0 when the package is present.
    pub show_command: Vec<String>,
    pub timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Ask the model for a package name when the static table has none.
    pub resolve_packages_with_llm: bool,
    /// Substrings that mark a zero-exit run as failed.
    pub failure_indicators: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            exec_env: None,
            workdir: PathBuf::from(".lab/sandbox"),
            script_name: "temp_code.py".to_string(),
            interpreter: vec!["python3".to_string()],
            install_command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
            ],
            show_command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pip".to_string(),
                "show".to_string(),
            ],
            timeout_secs: 30 * 60,
            install_timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
            resolve_packages_with_llm: true,
            failure_indicators: DEFAULT_FAILURE_INDICATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// Bytes read from each local file.
    pub max_file_bytes: usize,
    /// Extensions (without dot) read from `--files-dir`.
    pub file_extensions: Vec<String>,
    pub link_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 200_000,
            file_extensions: [
                "txt", "md", "csv", "tsv", "json", "py", "r", "tex", "rst", "html",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            link_timeout_secs: 30,
        }
    }
}

impl LabConfig {
    pub fn validate(&self) -> Result<()> {
        if self.llm.endpoint.trim().is_empty() {
            return Err(anyhow!("llm.endpoint must be non-empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must be non-empty"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        for (name, value) in self.temperatures.all() {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("temperatures.{name} must be within 0..=2 (got {value})"));
            }
        }
        if self.run.max_rounds == 0 {
            return Err(anyhow!("run.max_rounds must be > 0"));
        }
        if self.run.max_code_iterations == 0 {
            return Err(anyhow!("run.max_code_iterations must be > 0"));
        }
        if self.run.prompt_budget_bytes == 0 {
            return Err(anyhow!("run.prompt_budget_bytes must be > 0"));
        }
        if self.sandbox.script_name.trim().is_empty() {
            return Err(anyhow!("sandbox.script_name must be non-empty"));
        }
        for (name, command) in [
            ("sandbox.interpreter", &self.sandbox.interpreter),
            ("sandbox.install_command", &self.sandbox.install_command),
            ("sandbox.show_command", &self.sandbox.show_command),
        ] {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!("{name} must be a non-empty array"));
            }
        }
        if self.sandbox.timeout_secs == 0 || self.sandbox.install_timeout_secs == 0 {
            return Err(anyhow!("sandbox timeouts must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        if self.sources.max_file_bytes == 0 {
            return Err(anyhow!("sources.max_file_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LabConfig::default()`.
pub fn load_config(path: &Path) -> Result<LabConfig> {
    if !path.exists() {
        let cfg = LabConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LabConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LabConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
