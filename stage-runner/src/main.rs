//! Lint, format and test a target directory in one command.
//!
//! With no arguments this runs `flake8 ./jsonmore`, `black ./jsonmore` and
//! `pytest -v --tb=short --disable-warnings --maxfail=1` in that order,
//! stopping at the first stage that fails. `stages.toml` overrides programs,
//! options and the failure policy.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use stage_runner::core::policy::FailurePolicy;
use stage_runner::core::stage::{StageKind, StageSpec, select_stages};
use stage_runner::exit_codes;
use stage_runner::io::config::{DEFAULT_CONFIG_FILE, StagesConfig, load_config, write_config};
use stage_runner::io::executor::ProcessExecutor;
use stage_runner::logging;
use stage_runner::pipeline::{PipelineOptions, run_pipeline};
use stage_runner::report::{summary_lines, write_json};

#[derive(Parser)]
#[command(
    name = "stage-runner",
    version,
    about = "Run the lint, format and test stages against a target directory"
)]
struct Cli {
    /// Config file. A missing file means built-in defaults.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Raise runner diagnostics on stderr (-v info, -vv debug). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the stages in order (default when no command is given).
    Run(RunArgs),
    /// Print the commands that would run, one per line.
    Plan(StageArgs),
    /// Write a default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Default)]
struct StageArgs {
    /// Override the target directory handed to lint and format.
    #[arg(long)]
    target: Option<String>,

    /// Run only this stage (repeatable). Order stays lint, format, test.
    #[arg(long = "only", value_name = "STAGE")]
    only: Vec<StageKind>,
}

#[derive(Args, Default)]
struct RunArgs {
    #[command(flatten)]
    stages: StageArgs,

    /// Working directory for the stage processes.
    #[arg(short = 'C', long)]
    workdir: Option<PathBuf>,

    /// Keep running later stages after a failure.
    #[arg(long)]
    keep_going: bool,

    /// Write `<n>-<stage>.log` per executed stage into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write the run summary as JSON.
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("stage-runner: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        None => cmd_run(&cli.config, RunArgs::default()),
        Some(Command::Run(args)) => cmd_run(&cli.config, args),
        Some(Command::Plan(args)) => cmd_plan(&cli.config, &args),
        Some(Command::Init { force }) => cmd_init(&cli.config, force),
    }
}

fn cmd_run(config_path: &Path, args: RunArgs) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    if args.keep_going {
        cfg.failure_policy = FailurePolicy::Continue;
    }
    let plan = resolve_plan(&mut cfg, &args.stages)?;

    let workdir = match args.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    if !workdir.is_dir() {
        bail!("workdir {} is not a directory", workdir.display());
    }

    let mut options = PipelineOptions::from_config(&cfg, workdir);
    options.log_dir = args.log_dir;
    options.announce = true;

    let summary = run_pipeline(&plan, &ProcessExecutor::default(), &options)?;
    for line in summary_lines(&summary) {
        eprintln!("{line}");
    }
    if let Some(path) = &args.summary_json {
        write_json(path, &summary).context("write summary json")?;
    }

    if let Some(err) = &summary.error {
        eprintln!("stage-runner: {err}");
        return Ok(exit_codes::INVALID);
    }
    if summary.success() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::STAGE_FAILED)
    }
}

fn cmd_plan(config_path: &Path, args: &StageArgs) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    for stage in resolve_plan(&mut cfg, args)? {
        println!("{}", stage.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &StagesConfig::default())?;
    println!("init: wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

/// Apply CLI overrides to `cfg` and build the (possibly filtered) plan.
fn resolve_plan(cfg: &mut StagesConfig, args: &StageArgs) -> Result<Vec<StageSpec>> {
    if let Some(target) = &args.target {
        cfg.target.clone_from(target);
    }
    cfg.validate().context("invalid stage configuration")?;
    let plan = select_stages(cfg.plan(), &args.only);
    debug!(stages = plan.len(), target = %cfg.target, "resolved plan");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_no_args_runs_defaults() {
        let cli = Cli::parse_from(["stage-runner"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_run_flags() {
        let cli = Cli::parse_from([
            "stage-runner",
            "run",
            "--keep-going",
            "--only",
            "lint",
            "--only",
            "test",
            "--target",
            "src",
        ]);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert!(args.keep_going);
        assert_eq!(args.stages.only, vec![StageKind::Lint, StageKind::Test]);
        assert_eq!(args.stages.target.as_deref(), Some("src"));
    }

    #[test]
    fn parse_counts_verbose_flags() {
        let cli = Cli::parse_from(["stage-runner", "-vv", "plan"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Some(Command::Plan(_))));
    }

    #[test]
    fn parse_rejects_unknown_stage() {
        let result = Cli::try_parse_from(["stage-runner", "run", "--only", "deploy"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_init_force_with_global_config() {
        let cli = Cli::parse_from(["stage-runner", "init", "--force", "-c", "ci/stages.toml"]);
        assert!(matches!(cli.command, Some(Command::Init { force: true })));
        assert_eq!(cli.config, PathBuf::from("ci/stages.toml"));
    }

    #[test]
    fn resolve_plan_applies_target_override() {
        let mut cfg = StagesConfig::default();
        let args = StageArgs {
            target: Some("pkg".to_string()),
            only: vec![StageKind::Format],
        };
        let plan = resolve_plan(&mut cfg, &args).expect("plan");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].display(), "black pkg");
    }

    #[test]
    fn resolve_plan_rejects_empty_target() {
        let mut cfg = StagesConfig::default();
        let args = StageArgs {
            target: Some("  ".to_string()),
            only: Vec::new(),
        };
        assert!(resolve_plan(&mut cfg, &args).is_err());
    }
}
