//! Test-only helpers: scripted executors and scratch workspaces with fake tools.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::core::policy::{FailurePolicy, StageStatus};
use crate::core::stage::StageKind;
use crate::io::config::{StagesConfig, write_config};
use crate::io::executor::{StageExecutor, StageRequest, StageRun};
use crate::pipeline::PipelineOptions;

/// Pipeline options rooted at `workdir` with defaults otherwise.
pub fn options_in(workdir: &Path) -> PipelineOptions {
    PipelineOptions::from_config(&StagesConfig::default(), workdir.to_path_buf())
}

/// Executor that returns queued verdicts in order and records every request.
///
/// Once the queue is exhausted every further stage passes.
pub struct ScriptedExecutor {
    statuses: RefCell<VecDeque<StageStatus>>,
    requests: RefCell<Vec<StageRequest>>,
    spawn_error: Option<StageKind>,
}

impl ScriptedExecutor {
    pub fn new(statuses: Vec<StageStatus>) -> Self {
        Self {
            statuses: RefCell::new(statuses.into()),
            requests: RefCell::new(Vec::new()),
            spawn_error: None,
        }
    }

    pub fn passing() -> Self {
        Self::new(Vec::new())
    }

    /// Fail to start `kind` the way a missing program would.
    pub fn with_spawn_error(mut self, kind: StageKind) -> Self {
        self.spawn_error = Some(kind);
        self
    }

    pub fn requests(&self) -> Vec<StageRequest> {
        self.requests.borrow().clone()
    }

    pub fn invoked_kinds(&self) -> Vec<StageKind> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.stage.kind)
            .collect()
    }
}

impl StageExecutor for ScriptedExecutor {
    fn run(&self, request: &StageRequest) -> Result<StageRun> {
        self.requests.borrow_mut().push(request.clone());
        if self.spawn_error == Some(request.stage.kind) {
            bail!("spawn {}: No such file or directory", request.stage.kind);
        }
        let status = self
            .statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or(StageStatus::Passed);
        Ok(StageRun::bare(status))
    }
}

/// Scratch directory with `sh` scripts standing in for the lint, format and
/// test tools.
///
/// Every fake tool appends `<stage> <args..>` to `trace.log` before exiting
/// with its configured code, so tests can assert which stages ran and with
/// which arguments.
pub struct FakeTools {
    dir: tempfile::TempDir,
}

impl FakeTools {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        fs::create_dir_all(dir.path().join("jsonmore")).context("create target dir")?;
        let tools = Self { dir };
        for kind in StageKind::ALL {
            tools.set_exit(kind, 0)?;
        }
        Ok(tools)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tool_path(&self, kind: StageKind) -> PathBuf {
        self.path().join("tools").join(format!("fake-{kind}"))
    }

    pub fn trace_path(&self) -> PathBuf {
        self.path().join("trace.log")
    }

    /// Rewrite the fake tool for `kind` to exit with `code`.
    pub fn set_exit(&self, kind: StageKind, code: i32) -> Result<()> {
        self.set_script(kind, &format!("exit {code}"))
    }

    /// Rewrite the fake tool for `kind` to run `body` after tracing its call.
    pub fn set_script(&self, kind: StageKind, body: &str) -> Result<()> {
        let path = self.tool_path(kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let script = format!(
            "#!/bin/sh\necho \"{kind} $*\" >> \"{trace}\"\n{body}\n",
            trace = self.trace_path().display()
        );
        fs::write(&path, script).with_context(|| format!("write {}", path.display()))?;
        make_executable(&path)
    }

    /// Config pointing every stage at its fake tool, target `jsonmore`.
    pub fn config(&self) -> StagesConfig {
        let mut cfg = StagesConfig {
            target: "jsonmore".to_string(),
            failure_policy: FailurePolicy::Abort,
            ..StagesConfig::default()
        };
        cfg.lint.program = self.tool_path(StageKind::Lint).display().to_string();
        cfg.format.program = self.tool_path(StageKind::Format).display().to_string();
        cfg.test.program = self.tool_path(StageKind::Test).display().to_string();
        cfg
    }

    /// Write [`FakeTools::config`] to `stages.toml` and return its path.
    pub fn write_config(&self) -> Result<PathBuf> {
        let path = self.path().join("stages.toml");
        write_config(&path, &self.config())?;
        Ok(path)
    }

    /// Lines recorded by the fake tools, in call order.
    pub fn trace(&self) -> Result<Vec<String>> {
        let path = self.trace_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(contents.lines().map(str::to_string).collect())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
