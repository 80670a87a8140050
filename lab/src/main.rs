//! Multi-agent research and code lab.
//!
//! `lab run` gathers sources for a topic, then iterates research drafting and
//! code generation with operator-confirmed execution until the result is
//! accepted or the operator stops. Every round lands in a timestamped
//! directory under `run.output_dir`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use lab::coordinator::{Collaborators, Coordinator, RunSettings};
use lab::core::types::{Mode, RoundRecord};
use lab::driver::run_until_finalized;
use lab::exit_codes;
use lab::io::artifacts::RunArtifacts;
use lab::io::config::{DEFAULT_CONFIG_FILE, LabConfig, load_config, write_config};
use lab::io::llm::{LlmSession, OllamaGateway};
use lab::io::operator::ConsoleOperator;
use lab::io::prompt::PromptBuilder;
use lab::io::sandbox::SandboxRunner;
use lab::io::sources::{LocalSourceCollector, SourceRequest};
use lab::logging;

#[derive(Parser)]
#[command(
    name = "lab",
    version,
    about = "Multi-agent research and code lab"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a topic and iterate on a report and a program.
    Run(RunArgs),
    /// Write the default config file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Research topic or question.
    #[arg(long)]
    topic: String,
    /// PDF files to extract text from.
    #[arg(long, num_args = 1..)]
    pdfs: Vec<PathBuf>,
    /// Web pages to fetch.
    #[arg(long, num_args = 1..)]
    links: Vec<String>,
    /// Directory of local text files.
    #[arg(long)]
    files_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// Answer once from the sources and exit without rounds.
    #[arg(long)]
    quick_search: bool,
    #[arg(long)]
    max_rounds: Option<u32>,
    #[arg(long)]
    max_code_iterations: Option<u32>,
    /// Isolated environment whose interpreter and installer run the code.
    #[arg(long)]
    exec_env: Option<PathBuf>,
    /// Require operator approval of a run plan.
    #[arg(long)]
    plan: bool,
    /// Require operator approval of a coding plan.
    #[arg(long)]
    code_plan: bool,
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

impl RunArgs {
    /// Fold CLI overrides into the file config.
    fn apply(&self, config: &mut LabConfig) {
        if let Some(mode) = self.mode {
            config.run.mode = mode;
        }
        if let Some(max_rounds) = self.max_rounds {
            config.run.max_rounds = max_rounds;
        }
        if let Some(iterations) = self.max_code_iterations {
            config.run.max_code_iterations = iterations;
        }
        if let Some(env) = &self.exec_env {
            config.sandbox.exec_env = Some(env.clone());
        }
        config.run.plan_approval |= self.plan;
        config.run.code_plan_approval |= self.code_plan;
    }
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Init { config, force } => cmd_init(&config, force),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("init: {} already exists (use --force to overwrite)", path.display());
        return Ok(());
    }
    write_config(path, &LabConfig::default()).context("write default config")?;
    println!("init: wrote {}", path.display());
    Ok(())
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    let topic = args.topic.trim();
    if topic.is_empty() {
        bail!("--topic must not be empty");
    }
    debug!(mode = config.run.mode.as_str(), max_rounds = config.run.max_rounds, "config loaded");

    let gateway = OllamaGateway::new(&config.llm)?;
    let llm = LlmSession::new(&gateway, config.llm.model.clone(), config.temperatures.clone());
    let prompts = PromptBuilder::new(config.run.prompt_budget_bytes);
    let operator = ConsoleOperator::stdio();
    let collector = LocalSourceCollector::new(config.sources.clone())?;
    let sandbox = SandboxRunner::new(&config.sandbox);
    let artifacts = RunArtifacts::create(&config.run.output_dir, &config.sandbox.script_name)?;

    let request = SourceRequest {
        topic: topic.to_string(),
        pdfs: args.pdfs.clone(),
        links: args.links.clone(),
        files_dir: args.files_dir.clone(),
    };
    let mut coordinator = Coordinator::new(
        RunSettings::from_config(&config),
        Collaborators {
            llm: &llm,
            prompts: &prompts,
            operator: &operator,
            collector: &collector,
            executor: &sandbox,
            sink: &artifacts,
        },
        request,
    );

    if args.quick_search {
        coordinator.quick_search(topic)?;
        println!("quick-search: artifacts={}", artifacts.dir().display());
        return Ok(());
    }

    let result = run_until_finalized(&mut coordinator, topic, config.run.continue_prompt, print_round)?;
    info!(batches = result.batches, "run finished");
    println!(
        "run: finalized={} rounds={} artifacts={}",
        result.outcome.finalized,
        result.rounds,
        artifacts.dir().display()
    );
    Ok(())
}

fn print_round(record: &RoundRecord) {
    let execution = match &record.execution {
        Some(execution) if execution.is_success() => "success".to_string(),
        Some(execution) => execution
            .failure_kind()
            .map(|kind| kind.to_string())
            .unwrap_or_default(),
        None => "skipped".to_string(),
    };
    println!(
        "round: {} report={} code={} execution={}",
        record.round + 1,
        record.report.is_some(),
        record.code.is_some(),
        execution
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_defaults() {
        let cli = Cli::parse_from(["lab", "init"]);
        match cli.command {
            Command::Init { config, force } => {
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_FILE));
                assert!(!force);
            }
            Command::Run(_) => panic!("expected init"),
        }
    }

    #[test]
    fn parse_run_with_sources_and_overrides() {
        let cli = Cli::parse_from([
            "lab",
            "run",
            "--topic",
            "enzyme kinetics",
            "--pdfs",
            "a.pdf",
            "b.pdf",
            "--links",
            "https://example.org",
            "--mode",
            "code_only",
            "--max-rounds",
            "5",
            "--plan",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.topic, "enzyme kinetics");
        assert_eq!(args.pdfs, vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]);
        assert_eq!(args.links, vec!["https://example.org".to_string()]);
        assert_eq!(args.mode, Some(Mode::CodeOnly));
        assert!(!args.quick_search);

        let mut config = LabConfig::default();
        args.apply(&mut config);
        assert_eq!(config.run.mode, Mode::CodeOnly);
        assert_eq!(config.run.max_rounds, 5);
        assert!(config.run.plan_approval);
        assert!(!config.run.code_plan_approval);
        assert_eq!(config.run.max_code_iterations, 1);
    }

    #[test]
    fn run_requires_topic() {
        assert!(Cli::try_parse_from(["lab", "run"]).is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["lab", "run", "--topic", "t", "--mode", "poetry"]).is_err());
    }
}
