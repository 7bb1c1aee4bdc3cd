use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use runner::client::{HttpToolClient, LocalToolClient, ToolClient};
use runner::config::{RunnerConfig, load_config};
use runner::exit_codes;
use runner::logging;
use runner::looping::{LoopOutcome, LoopStop, run_loop};
use runner::state::TaskState;
use runner::steps::StepSet;

#[derive(Parser)]
#[command(
    name = "runner",
    version,
    about = "Drive a ticket through plan, requirements, implementation, verification and publish"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline until it finishes or runs out of budget.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Ticket id (defaults to MVP-001).
    #[arg(long)]
    ticket: Option<String>,
    /// One-line goal for the ticket.
    #[arg(long)]
    goal: Option<String>,
    /// Pull-request owner; overrides `publish.default_owner`.
    #[arg(long)]
    owner: Option<String>,
    /// Pull-request repository; overrides `publish.default_repo`.
    #[arg(long)]
    repo: Option<String>,
    /// Tool server base URL; overrides `server_url`.
    #[arg(long)]
    server_url: Option<String>,
    /// Run tools in-process with this tool-server config instead of over HTTP.
    #[arg(long, value_name = "SERVER_CONFIG")]
    local: Option<PathBuf>,
    #[arg(long, default_value = "runner.toml")]
    config: PathBuf,
    #[arg(long)]
    max_iterations: Option<u32>,
    /// Print the final state as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let mut config = load_config(&args.config)?;
    if let Some(server_url) = &args.server_url {
        config.server_url = server_url.clone();
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    config
        .validate()
        .with_context(|| format!("invalid config {}", args.config.display()))?;

    let tools = tool_client(&args, &config)?;
    let steps = StepSet::standard(&config)?;
    let mut initial = TaskState::new(args.ticket.clone(), args.goal.clone());
    initial.github_owner = args.owner.clone();
    initial.github_repo = args.repo.clone();

    let outcome = run_loop(
        initial,
        &steps,
        tools.as_ref(),
        &config.retry_policy(),
        |_| {},
    )?;

    if args.json {
        print_json(&outcome)?;
    } else {
        print_summary(&outcome)?;
    }
    Ok(match outcome.stop {
        LoopStop::Terminal => exit_codes::OK,
        LoopStop::BudgetExhausted { .. } | LoopStop::RetriesExhausted { .. } => {
            exit_codes::EXHAUSTED
        }
    })
}

fn tool_client(args: &RunArgs, config: &RunnerConfig) -> Result<Box<dyn ToolClient>> {
    match &args.local {
        Some(path) => {
            let server_config = tool_server::config::load_config(path)?;
            server_config
                .validate()
                .with_context(|| format!("invalid config {}", path.display()))?;
            let registry = tool_server::tools::default_registry(server_config)?;
            Ok(Box::new(LocalToolClient::new(registry)))
        }
        None => Ok(Box::new(HttpToolClient::new(
            &config.server_url,
            config.request_timeout(),
        )?)),
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    stop: String,
    steps_executed: u32,
    state: &'a TaskState,
}

fn stop_label(stop: &LoopStop) -> String {
    match stop {
        LoopStop::Terminal => "terminal".to_string(),
        LoopStop::BudgetExhausted { max_iterations } => {
            format!("budget exhausted after {max_iterations} steps")
        }
        LoopStop::RetriesExhausted {
            fix_attempts,
            max_fix_attempts,
        } => format!("retries exhausted ({fix_attempts}/{max_fix_attempts} fix attempts)"),
    }
}

fn print_json(outcome: &LoopOutcome) -> Result<()> {
    let report = RunReport {
        stop: stop_label(&outcome.stop),
        steps_executed: outcome.steps_executed,
        state: &outcome.state,
    };
    let payload = serde_json::to_string_pretty(&report).context("serialize run report")?;
    println!("{payload}");
    Ok(())
}

fn print_summary(outcome: &LoopOutcome) -> Result<()> {
    println!("Status: {}", outcome.state.status());
    println!("Stop: {}", stop_label(&outcome.stop));
    println!("Notes:");
    for note in &outcome.state.notes {
        println!(" - {note}");
    }
    if let Some(pr) = &outcome.state.pr_response {
        let payload = serde_json::to_string(pr).context("serialize pr response")?;
        println!("PR response: {payload}");
    }
    Ok(())
}
