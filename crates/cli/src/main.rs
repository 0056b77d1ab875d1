//! Lifecheck CLI - end-to-end lifecycle verification of the local environment
//!
//! `run` boots the environment through every readiness phase and tears it down,
//! `reap` and `scan` operate on leftover environment processes directly.

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lifecheck_core::application::{
    custom_image_scenario, reference_scenario, Harness, LifecycleSequencer, ProcessReaper,
    ProcessScanner, ReapOutcome, ScenarioReport,
};
use lifecheck_core::domain::{ProcessPatterns, ProcessRecord};
use lifecheck_core::LifecycleError;
use lifecheck_infra_system::{
    CommandControlSurface, SignalTerminator, SysinfoProcessTable, SystemReadinessObserver,
};

use settings::HarnessSettings;

const DEFAULT_LOG_FILTER: &str = "lifecheck=info";

#[derive(Parser)]
#[command(name = "lifecheck")]
#[command(about = "Lifecycle verification for the local Cloud Foundry environment", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot, verify and tear down the environment
    Run {
        /// Boot a custom environment image and stop after the container runtime is up
        #[arg(long)]
        image: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Kill leftover environment processes and verify they are gone
    Reap {
        /// Command line substring (repeatable; default: configured patterns)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,
    },

    /// List running environment processes
    Scan {
        /// Command line substring (repeatable; default: configured patterns)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,
    },
}

#[derive(Tabled)]
struct ProcessRow {
    pid: String,
    command_line: String,
}

impl From<&ProcessRecord> for ProcessRow {
    fn from(record: &ProcessRecord) -> Self {
        Self {
            pid: record.pid.to_string(),
            command_line: record.command_line.clone(),
        }
    }
}

#[derive(Tabled)]
struct PhaseRow {
    phase: String,
    elapsed: String,
    checks: u32,
}

fn init_logging() {
    let log_format = std::env::var("LIFECHECK_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // stdout carries reports; logs go to stderr
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn patterns_or_default(args: Vec<String>, settings: &HarnessSettings) -> ProcessPatterns {
    if args.is_empty() {
        settings.environment().patterns
    } else {
        ProcessPatterns::new(args)
    }
}

fn reaper(settings: &HarnessSettings) -> ProcessReaper {
    ProcessReaper::new(
        ProcessScanner::new(Arc::new(SysinfoProcessTable::new())),
        Arc::new(SignalTerminator::new()),
        settings.reap_policy(),
    )
}

fn print_processes(records: &[ProcessRecord]) {
    let rows: Vec<ProcessRow> = records.iter().map(ProcessRow::from).collect();
    println!("{}", Table::new(rows));
}

fn print_report(report: &ScenarioReport) {
    println!(
        "{}",
        format!("✓ Scenario '{}' completed", report.scenario).green().bold()
    );
    println!("  {} {}", "Run ID:".bold(), report.run_id);
    println!(
        "  {} {}s",
        "Duration:".bold(),
        (report.finished_at - report.started_at).num_seconds()
    );
    if let Some(code) = report.workload_exit_code {
        println!("  {} {}", "Workload exit:".bold(), code);
    }
    println!();

    let rows: Vec<PhaseRow> = report
        .phases
        .iter()
        .map(|p| PhaseRow {
            phase: p.name.clone(),
            elapsed: format!("{:.1}s", p.elapsed_ms as f64 / 1000.0),
            checks: p.checks,
        })
        .collect();
    println!("{}", Table::new(rows));

    if !report.tracked_pids.is_empty() {
        let pids: Vec<String> = report.tracked_pids.iter().map(|p| p.to_string()).collect();
        println!();
        println!("  {} {}", "Exited after stop:".bold(), pids.join(", "));
    }
}

async fn run(settings: &HarnessSettings, image: Option<PathBuf>, json: bool) -> Result<ExitCode> {
    let env = settings.environment();
    info!(home = %env.home().display(), "Environment configured");

    let scenario = match image {
        Some(image) => custom_image_scenario(&env, image),
        None => reference_scenario(&env),
    }
    .context("Invalid scenario")?;

    let observer = Arc::new(
        SystemReadinessObserver::new(settings.probe_request_timeout())
            .context("Failed to create readiness observer")?,
    );
    let control = Arc::new(CommandControlSurface::new(
        settings.control_surface_config(&env),
    ));

    let harness = Harness::new(
        LifecycleSequencer::new(control.clone(), observer),
        reaper(settings),
        control,
        env.patterns.clone(),
    );

    match harness.run(&scenario).await {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(LifecycleError::ProcessLeak { survivors }) => {
            eprintln!(
                "{}",
                format!("✗ {} process(es) survived the reaper", survivors.len())
                    .red()
                    .bold()
            );
            print_processes(&survivors);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            eprintln!("{} {}", "✗ Scenario failed:".red().bold(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn reap(settings: &HarnessSettings, patterns: ProcessPatterns) -> Result<ExitCode> {
    let outcome = reaper(settings)
        .reap(&patterns)
        .await
        .context("Reap failed")?;

    match outcome {
        ReapOutcome::Clean { killed } => {
            println!(
                "{}",
                format!("✓ No '{}' processes left ({} killed)", patterns, killed)
                    .green()
                    .bold()
            );
            Ok(ExitCode::SUCCESS)
        }
        ReapOutcome::LeakDetected(survivors) => {
            println!(
                "{}",
                format!("✗ {} process(es) survived", survivors.len()).red().bold()
            );
            print_processes(&survivors);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn scan(patterns: ProcessPatterns) -> Result<ExitCode> {
    let found = ProcessScanner::new(Arc::new(SysinfoProcessTable::new()))
        .scan(&patterns)
        .await
        .context("Failed to read process table")?;

    if found.is_empty() {
        println!("{}", format!("No '{}' processes running", patterns).green());
    } else {
        println!(
            "{}",
            format!("{} matching process(es)", found.len()).yellow().bold()
        );
        print_processes(&found);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging();

    let settings = HarnessSettings::load().context("Failed to load configuration")?;
    info!("Lifecheck v{} starting...", lifecheck_core::VERSION);

    match cli.command {
        Commands::Run { image, json } => run(&settings, image, json).await,
        Commands::Reap { patterns } => reap(&settings, patterns_or_default(patterns, &settings)).await,
        Commands::Scan { patterns } => scan(patterns_or_default(patterns, &settings)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_image() {
        let cli = Cli::try_parse_from(["lifecheck", "run", "--image", "/tmp/custom.iso", "--json"])
            .unwrap();

        match cli.command {
            Commands::Run { image, json } => {
                assert_eq!(image, Some(PathBuf::from("/tmp/custom.iso")));
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_repeated_patterns() {
        let cli = Cli::try_parse_from(["lifecheck", "reap", "-p", "hyperkit", "--pattern", "vpnkit"])
            .unwrap();

        match cli.command {
            Commands::Reap { patterns } => assert_eq!(patterns, vec!["hyperkit", "vpnkit"]),
            _ => panic!("expected reap"),
        }
    }
}
