//! Stage model and argument rendering.
//!
//! A stage is one external collaborator invocation. The set of stages is
//! fixed (lint, format, test) and always runs in that order; only the
//! programs and their arguments vary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three collaborators, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Lint,
    Format,
    Test,
}

impl StageKind {
    /// All stages in the order they run.
    pub const ALL: [StageKind; 3] = [StageKind::Lint, StageKind::Format, StageKind::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Lint => "lint",
            StageKind::Format => "format",
            StageKind::Test => "test",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown stage {s:?} (expected lint, format or test)"))
    }
}

/// Traceback rendering requested from the test collaborator (`--tb=<style>`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracebackStyle {
    Auto,
    Long,
    #[default]
    Short,
    Line,
    Native,
    No,
}

impl TracebackStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            TracebackStyle::Auto => "auto",
            TracebackStyle::Long => "long",
            TracebackStyle::Short => "short",
            TracebackStyle::Line => "line",
            TracebackStyle::Native => "native",
            TracebackStyle::No => "no",
        }
    }
}

/// Recognized options for the test collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOptions {
    pub verbose: bool,
    pub traceback: TracebackStyle,
    pub disable_warnings: bool,
    /// Stop after this many failures. `None` lets the suite run to the end.
    pub maxfail: Option<u32>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            verbose: true,
            traceback: TracebackStyle::Short,
            disable_warnings: true,
            maxfail: Some(1),
        }
    }
}

impl TestOptions {
    /// Render as command-line flags in a fixed order.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.verbose {
            args.push("-v".to_string());
        }
        args.push(format!("--tb={}", self.traceback.as_str()));
        if self.disable_warnings {
            args.push("--disable-warnings".to_string());
        }
        if let Some(maxfail) = self.maxfail {
            args.push(format!("--maxfail={maxfail}"));
        }
        args
    }
}

/// A fully resolved invocation for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub kind: StageKind,
    pub program: String,
    pub args: Vec<String>,
}

impl StageSpec {
    /// `<program> [extra..] <target>`, used by the lint and format stages.
    pub fn targeting(kind: StageKind, program: &str, extra_args: &[String], target: &str) -> Self {
        let mut args = extra_args.to_vec();
        args.push(target.to_string());
        Self {
            kind,
            program: program.to_string(),
            args,
        }
    }

    /// `<program> <options..> [extra..]`, used by the test stage.
    pub fn test(program: &str, options: &TestOptions, extra_args: &[String]) -> Self {
        let mut args = options.to_args();
        args.extend(extra_args.iter().cloned());
        Self {
            kind: StageKind::Test,
            program: program.to_string(),
            args,
        }
    }

    /// Program followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = Vec::with_capacity(self.args.len() + 1);
        line.push(self.program.clone());
        line.extend(self.args.iter().cloned());
        line
    }

    /// Shell-like rendering for display; arguments with whitespace are quoted.
    pub fn display(&self) -> String {
        self.command_line()
            .iter()
            .map(|part| {
                if part.is_empty() || part.chars().any(char::is_whitespace) {
                    format!("'{part}'")
                } else {
                    part.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Restrict `plan` to the kinds in `only`, keeping plan order.
///
/// An empty `only` keeps every stage.
pub fn select_stages(plan: Vec<StageSpec>, only: &[StageKind]) -> Vec<StageSpec> {
    if only.is_empty() {
        return plan;
    }
    plan.into_iter()
        .filter(|stage| only.contains(&stage.kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_options_render_fixed_flags() {
        let args = TestOptions::default().to_args();
        assert_eq!(
            args,
            vec!["-v", "--tb=short", "--disable-warnings", "--maxfail=1"]
        );
    }

    #[test]
    fn disabled_test_options_are_omitted() {
        let options = TestOptions {
            verbose: false,
            traceback: TracebackStyle::Long,
            disable_warnings: false,
            maxfail: None,
        };
        assert_eq!(options.to_args(), vec!["--tb=long"]);
    }

    #[test]
    fn targeting_puts_target_last() {
        let spec = StageSpec::targeting(
            StageKind::Lint,
            "flake8",
            &["--max-line-length=100".to_string()],
            "./jsonmore",
        );
        assert_eq!(
            spec.command_line(),
            vec!["flake8", "--max-line-length=100", "./jsonmore"]
        );
    }

    #[test]
    fn display_quotes_whitespace() {
        let spec = StageSpec::targeting(StageKind::Format, "black", &[], "my project");
        assert_eq!(spec.display(), "black 'my project'");
    }

    #[test]
    fn select_stages_keeps_plan_order() {
        let plan = vec![
            StageSpec::targeting(StageKind::Lint, "flake8", &[], "t"),
            StageSpec::targeting(StageKind::Format, "black", &[], "t"),
            StageSpec::test("pytest", &TestOptions::default(), &[]),
        ];
        let selected = select_stages(plan, &[StageKind::Test, StageKind::Lint]);
        let kinds: Vec<StageKind> = selected.iter().map(|stage| stage.kind).collect();
        assert_eq!(kinds, vec![StageKind::Lint, StageKind::Test]);
    }

    #[test]
    fn stage_kind_parses_lowercase_names() {
        assert_eq!("format".parse::<StageKind>(), Ok(StageKind::Format));
        assert!("Lint".parse::<StageKind>().is_err());
    }

    #[test]
    fn stage_kind_order_matches_execution_order() {
        let mut kinds = vec![StageKind::Test, StageKind::Lint, StageKind::Format];
        kinds.sort();
        assert_eq!(kinds, StageKind::ALL.to_vec());
    }
}
