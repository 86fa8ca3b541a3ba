//! Stage runner configuration stored in `stages.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::FailurePolicy;
use crate::core::stage::{StageKind, StageSpec, TestOptions, TracebackStyle};

pub const DEFAULT_CONFIG_FILE: &str = "stages.toml";

/// Stage runner configuration (TOML).
///
/// Every field has a default, so a missing or empty file reproduces the plain
/// `flake8 ./jsonmore`, `black ./jsonmore`, `pytest ...` sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StagesConfig {
    /// Directory handed to the lint and format stages.
    pub target: String,

    pub failure_policy: FailurePolicy,

    /// Per-stage wall-clock limit in seconds. `0` waits forever.
    pub timeout_secs: u64,

    /// Cap on captured stdout/stderr per stream kept for stage logs.
    pub output_limit_bytes: usize,

    pub lint: ToolConfig,
    pub format: ToolConfig,
    pub test: TestConfig,
}

/// A collaborator that is handed the target directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    pub program: String,
    /// Inserted before the target directory.
    pub extra_args: Vec<String>,
}

impl ToolConfig {
    fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::with_program("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestConfig {
    pub program: String,
    pub verbose: bool,
    pub traceback: TracebackStyle,
    pub disable_warnings: bool,
    /// Stop after this many failures. `0` lets the suite run to the end.
    pub maxfail: u32,
    /// Appended after the recognized options.
    pub extra_args: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        let options = TestOptions::default();
        Self {
            program: "pytest".to_string(),
            verbose: options.verbose,
            traceback: options.traceback,
            disable_warnings: options.disable_warnings,
            maxfail: options.maxfail.unwrap_or(0),
            extra_args: Vec::new(),
        }
    }
}

impl TestConfig {
    pub fn options(&self) -> TestOptions {
        TestOptions {
            verbose: self.verbose,
            traceback: self.traceback,
            disable_warnings: self.disable_warnings,
            maxfail: (self.maxfail > 0).then_some(self.maxfail),
        }
    }
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            target: "./jsonmore".to_string(),
            failure_policy: FailurePolicy::Abort,
            timeout_secs: 0,
            output_limit_bytes: 1_000_000,
            lint: ToolConfig::with_program("flake8"),
            format: ToolConfig::with_program("black"),
            test: TestConfig::default(),
        }
    }
}

impl StagesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(anyhow!("target must be a non-empty path"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.lint.program.trim().is_empty() {
            return Err(anyhow!("lint.program must be non-empty"));
        }
        if self.format.program.trim().is_empty() {
            return Err(anyhow!("format.program must be non-empty"));
        }
        if self.test.program.trim().is_empty() {
            return Err(anyhow!("test.program must be non-empty"));
        }
        Ok(())
    }

    /// `None` when no timeout is configured.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Build the ordered stage plan: lint, format, test.
    pub fn plan(&self) -> Vec<StageSpec> {
        vec![
            StageSpec::targeting(
                StageKind::Lint,
                &self.lint.program,
                &self.lint.extra_args,
                &self.target,
            ),
            StageSpec::targeting(
                StageKind::Format,
                &self.format.program,
                &self.format.extra_args,
                &self.target,
            ),
            StageSpec::test(
                &self.test.program,
                &self.test.options(),
                &self.test.extra_args,
            ),
        ]
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StagesConfig::default()`.
pub fn load_config(path: &Path) -> Result<StagesConfig> {
    if !path.exists() {
        let cfg = StagesConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StagesConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &StagesConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
