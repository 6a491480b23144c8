use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use scanwright_core::{JudgeMode, JudgeVariant, ScanRequest};
use scanwright_runtime::{
    CancelFlag, CommandProbeRunner, JsonResultStore, JudgeRegistry, LoopReport, Orchestrator,
    OrchestratorError, RuntimeConfig, ScanPlan,
};

#[derive(Parser)]
#[command(name = "scanwright", version, about = "Adaptive probe, classify and retry scans")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the adaptive loop for every target in a request
    Run(ScanArgs),

    /// Probe and classify once per target, without retries
    Interpret(ScanArgs),

    /// Validate a request without probing anything
    Validate {
        #[arg(short, long)]
        request: PathBuf,
    },

    /// List judge variants and their accepted model flavors
    Flavors,
}

#[derive(Args)]
struct ScanArgs {
    /// Request file (YAML, or JSON with a .json extension)
    #[arg(short, long)]
    request: PathBuf,

    /// Replace the request's targets
    #[arg(short, long = "target")]
    targets: Vec<String>,

    /// Program invoked as `<program> <target> <configuration tokens...>`
    #[arg(long, default_value = "scanwright-probe")]
    probe_command: PathBuf,

    /// Arguments passed to the probe program before the target
    #[arg(long = "probe-arg", allow_hyphen_values = true)]
    probe_args: Vec<String>,

    /// Override the request's judge mode
    #[arg(short, long)]
    mode: Option<JudgeMode>,

    /// Judge credential; defaults to the variant's environment variable
    #[arg(long)]
    api_key: Option<String>,

    /// Name recorded in verdict artifacts
    #[arg(long, default_value = "primary")]
    judge_name: String,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    let result = match cli.command {
        Command::Run(args) => scan(args, false).await,
        Command::Interpret(args) => scan(args, true).await,
        Command::Validate { request } => validate(&request),
        Command::Flavors => {
            print_flavors();
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_request(path: &Path) -> Result<ScanRequest> {
    ScanRequest::from_file(path).with_context(|| format!("Failed to load request {}", path.display()))
}

fn validate(path: &Path) -> Result<ExitCode> {
    let request = load_request(path)?;
    RuntimeConfig::from_value(request.runtime.as_ref()).context("Invalid runtime settings")?;

    println!(
        "OK: {} target(s), judge {} / {} in {} mode, base configuration '{}'",
        request.probe.targets().len(),
        request.judge.variant(),
        request.judge.model_flavor(),
        request.judge.mode(),
        request.probe.base_configuration()
    );
    Ok(ExitCode::SUCCESS)
}

fn print_flavors() {
    for variant in JudgeVariant::ALL {
        let credential = variant.credential_env().unwrap_or("none");
        println!("{} (credential: {})", variant, credential);
        for flavor in variant.accepted_flavors() {
            let marker = if *flavor == variant.default_flavor() { " (default)" } else { "" };
            println!("  {flavor}{marker}");
        }
    }
}

async fn scan(args: ScanArgs, single_shot: bool) -> Result<ExitCode> {
    let mut request = load_request(&args.request)?;
    if !args.targets.is_empty() {
        request = request
            .with_targets(args.targets.clone())
            .context("Invalid --target")?;
    }
    if let Some(mode) = args.mode {
        request = request.with_mode(mode);
    }

    let config = RuntimeConfig::from_value(request.runtime.as_ref()).context("Invalid runtime settings")?;
    let registry = JudgeRegistry::new(&config);

    let mut judge = registry.create_for(request.judge.config().clone(), &args.judge_name, args.api_key.clone());
    judge.configure().context("Failed to configure judge")?;

    let probe = CommandProbeRunner::new(&args.probe_command).with_leading_args(args.probe_args.clone());
    let orchestrator = Orchestrator::builder()
        .judge(Arc::from(judge))
        .probe_runner(Arc::new(probe))
        .store(Arc::new(JsonResultStore::new()))
        .usage_tracker(registry.usage())
        .config(config)
        .build()?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        });
    }

    let plan = ScanPlan::from_request(&request);
    let targets = request.probe.targets().to_vec();
    let results = if single_shot {
        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            let result = orchestrator
                .interpret(target, &plan.for_target(target), &cancel)
                .await;
            results.push((target.clone(), result));
        }
        results
    } else {
        orchestrator.run_targets(&targets, &plan, &cancel).await
    };

    print_results(&results, args.json)?;
    if let Some(usage) = orchestrator.usage() {
        tracing::info!(
            calls = usage.calls,
            error_verdicts = usage.error_verdicts,
            total_tokens = usage.total_tokens,
            "Judge usage"
        );
    }

    Ok(ExitCode::from(exit_status(&results)))
}

fn print_results(results: &[(String, Result<LoopReport, OrchestratorError>)], json: bool) -> Result<()> {
    if json {
        let reports: Vec<serde_json::Value> = results
            .iter()
            .map(|(target, result)| match result {
                Ok(report) => serde_json::to_value(report),
                Err(e) => Ok(serde_json::json!({ "target": target, "error": e.to_string() })),
            })
            .collect::<Result<_, _>>()?;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for (target, result) in results {
        match result {
            Ok(report) => {
                println!(
                    "{target}: {} ({}) with {} observation(s) after {} retr{}{}",
                    report.phase,
                    report.verdict.status,
                    report.observations.len(),
                    report.attempts,
                    if report.attempts == 1 { "y" } else { "ies" },
                    if report.exhausted { ", retry limit reached" } else { "" }
                );
                if let Some(explanation) = &report.verdict.explanation {
                    println!("  {}", explanation.lines().next().unwrap_or_default());
                }
                println!("  results in {}", report.save_dir.display());
            }
            Err(e) => println!("{target}: error: {e}"),
        }
    }
    Ok(())
}

/// 0 when every target is Done, 2 when any judge failed, 1 on hard errors.
fn exit_status(results: &[(String, Result<LoopReport, OrchestratorError>)]) -> u8 {
    if results.iter().any(|(_, r)| r.is_err()) {
        1
    } else if results
        .iter()
        .any(|(_, r)| matches!(r, Ok(report) if !report.is_done()))
    {
        2
    } else {
        0
    }
}
