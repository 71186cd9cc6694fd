//! Mergeline command-line tool.
//!
//! Provides subcommands for running an integration pass, inspecting report
//! artifacts, printing the contributors' shared-state digest, and generating
//! / validating configuration files.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mergeline_core::config::{EngineConfig, DEFAULT_CONFIG_FILE};
use mergeline_core::engine::MergeEngine;
use mergeline_core::gateway::GitGateway;
use mergeline_core::insight::InsightSummarizer;
use mergeline_core::models::{slug, ReportStatus, Resolution, RunSummary};
use mergeline_core::report::ReportEmitter;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Mergeline command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "mergeline",
    version,
    about = "Integrate contributor branches into a shared mainline"
)]
struct Cli {
    /// Path to the TOML configuration file (default: ./mergeline.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one integration pass over all candidate branches.
    Run,

    /// Print the contributors' shared-state digest.
    Insights,

    /// Inspect report artifacts from previous runs.
    Reports {
        #[command(subcommand)]
        action: ReportsAction,
    },

    /// Validate the configuration file.
    Validate,

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Overwrite an existing file without prompting.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ReportsAction {
    /// List recent report artifacts, newest first.
    List {
        /// Maximum number of artifacts to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show the most recent report for a branch.
    Show {
        /// Branch name, e.g. agent/pricing.
        branch: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // Logs go to stderr so artifact and digest output on stdout stays
    // machine-consumable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MERGELINE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run => cmd_run(cli.config.as_deref()),
        Commands::Insights => cmd_insights(cli.config.as_deref()),
        Commands::Reports { action } => cmd_reports(cli.config.as_deref(), action),
        Commands::Validate => cmd_validate(cli.config.as_deref()),
        Commands::Init { output, force } => cmd_init(&output, force),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = EngineConfig::load_or_default(path).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    debug!(workspace = %config.repository.workspace.display(), "configuration ready");
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    // Advisory digest before any repository work.
    let digest = InsightSummarizer::digest(&config.shared_state_path());
    if !digest.is_empty() {
        println!("{}", style::header("Contributor insights"));
        println!("{}", digest);
    }

    let gateway = GitGateway::open(&config).context("failed to open workspace repository")?;
    let engine = MergeEngine::new(config, gateway);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message("Integrating contributor branches...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = engine.run();
    spinner.finish_and_clear();

    // Unresolved conflicts are a reported state, not a process failure;
    // only a fatal synchronize/discovery error propagates out.
    let summary = result.context("integration run failed")?;
    print_summary(&summary);
    Ok(())
}

fn cmd_insights(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let path = config.shared_state_path();
    let digest = InsightSummarizer::digest(&path);
    if digest.is_empty() {
        println!("No contributor insights at {}", path.display());
    } else {
        println!("{}", digest);
    }
    Ok(())
}

fn cmd_reports(config_path: Option<&Path>, action: ReportsAction) -> Result<()> {
    let config = load_config(config_path)?;
    let emitter = ReportEmitter::from_config(&config);

    match action {
        ReportsAction::List { limit } => {
            let names = emitter.list().context("failed to list report artifacts")?;
            if names.is_empty() {
                println!("No report artifacts in {}", emitter.directory().display());
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Branch", "Status", "Timestamp", "Artifact"]);

            for name in names.iter().take(limit) {
                match emitter.load(name) {
                    Ok(report) => {
                        table.add_row(vec![
                            Cell::new(&report.branch),
                            status_cell(report.status),
                            Cell::new(report.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                            Cell::new(name),
                        ]);
                    }
                    Err(e) => {
                        table.add_row(vec![
                            Cell::new("?"),
                            Cell::new("unreadable").fg(comfy_table::Color::Yellow),
                            Cell::new(e.to_string()),
                            Cell::new(name),
                        ]);
                    }
                }
            }

            println!("{}", table);
            println!();
            println!("{} artifact(s) shown", names.len().min(limit));
            Ok(())
        }

        ReportsAction::Show { branch } => {
            let prefix = format!("report-{}-", slug(&branch));
            let name = emitter
                .list()
                .context("failed to list report artifacts")?
                .into_iter()
                .find(|n| n.starts_with(&prefix))
                .ok_or_else(|| anyhow::anyhow!("no reports found for branch '{}'", branch))?;
            let report = emitter.load(&name).context("failed to read report artifact")?;

            println!("{}", style::header(&format!("Report: {}", name)));
            println!();
            println!("  Branch    : {}", report.branch);
            println!("  Status    : {}", report.status);
            println!("  Mainline  : {}", report.mainline_branch);
            println!("  Timestamp : {}", report.timestamp.to_rfc3339());
            println!("  Details   : {}", report.details);

            if !report.conflicts.is_empty() {
                println!();
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_content_arrangement(ContentArrangement::Dynamic);
                table.set_header(vec!["File", "Category", "Resolution"]);
                for entry in &report.conflicts {
                    table.add_row(vec![
                        Cell::new(&entry.path),
                        Cell::new(entry.category.to_string()),
                        resolution_cell(entry.resolution),
                    ]);
                }
                println!("{}", table);
            }

            Ok(())
        }
    }
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    let shown = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    println!("Validating configuration: {}", shown.display());
    println!();

    let config =
        EngineConfig::load_or_default(config_path).context("failed to parse configuration")?;
    if config_path.is_none() && !Path::new(DEFAULT_CONFIG_FILE).exists() {
        println!("  [OK] No config file present, built-in defaults apply");
    } else {
        println!("  [OK] TOML structure is valid");
    }

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Workspace     : {}", config.repository.workspace.display());
    println!("  Mainline      : {}", config.repository.mainline);
    println!("  Remote        : {}", config.repository.remote);
    println!("  Branch prefix : {}", config.repository.branch_prefix);
    println!("  Reports dir   : {}", config.reports_dir().display());
    println!("  Summary tail  : {}", config.reports.tail);
    println!("  Shared state  : {}", config.shared_state_path().display());
    println!(
        "  Committer     : {} <{}>",
        config.identity.name, config.identity.email
    );
    println!();
    println!("Configuration is valid.");

    Ok(())
}

/// Commented scaffold written by `mergeline init`. The values mirror the
/// built-in defaults.
const CONFIG_SCAFFOLD: &str = r#"# Mergeline configuration
# All fields are optional; the values below are the built-in defaults.

[repository]
# Working-tree repository the engine operates in.
workspace = "."
# Long-lived branch contributor work is integrated into.
mainline = "main"
# Remote whose branches are enumerated and fetched.
remote = "origin"
# Prefix selecting candidate contributor branches.
branch_prefix = "agent/"

[reports]
# Directory report artifacts are written to (relative to the workspace).
directory = ".mergeline/reports"
# How many recent artifacts the run summary references.
tail = 10

[insights]
# Contributors' shared-memory file (relative to the workspace).
shared_state = "shared/agent_memory.json"

[identity]
# Committer identity for integration merge commits.
name = "mergeline"
email = "mergeline@localhost"
"#;

fn cmd_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;

        if !overwrite {
            println!(
                "{}",
                style::warn("Init cancelled. Existing file was not modified.")
            );
            return Ok(());
        }
    }

    std::fs::write(output, CONFIG_SCAFFOLD).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Edit the file to point at your workspace repository");
    println!(
        "  2. Validate with: mergeline validate --config {}",
        output.display()
    );
    println!(
        "  3. Run an integration pass: mergeline run --config {}",
        output.display()
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.records.is_empty() {
        println!("{}", style::success("No candidate branches found"));
        println!("{}", style::dim(&format!("run {}", summary.run_id)));
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Branch", "Status", "Details"]);
    for record in &summary.records {
        table.add_row(vec![
            Cell::new(&record.branch),
            status_cell(record.status),
            Cell::new(&record.details),
        ]);
    }
    println!("{}", table);

    let unchanged = summary
        .records
        .iter()
        .filter(|r| r.status == ReportStatus::NoChanges)
        .count();
    let errored = summary
        .records
        .iter()
        .filter(|r| r.status == ReportStatus::Error)
        .count();

    println!();
    println!(
        "{} branch(es): {} merged, {} unchanged, {} in conflict, {} errored",
        summary.records.len(),
        summary.merged_count(),
        unchanged,
        summary.conflict_count(),
        errored
    );
    if summary.interrupted {
        println!(
            "{}",
            style::warn("Run was interrupted; remaining branches were skipped")
        );
    }
    if summary.conflict_count() > 0 {
        println!(
            "{}",
            style::warn(&format!(
                "{} branch(es) need manual attention; see `mergeline reports list`",
                summary.conflict_count()
            ))
        );
    }
    println!("{}", style::dim(&format!("run {}", summary.run_id)));
}

fn status_cell(status: ReportStatus) -> Cell {
    match status {
        ReportStatus::Success => Cell::new("✓ merged").fg(comfy_table::Color::Green),
        ReportStatus::NoChanges => Cell::new("○ no changes").fg(comfy_table::Color::Grey),
        ReportStatus::Conflict => Cell::new("✗ conflict").fg(comfy_table::Color::Red),
        ReportStatus::Error => Cell::new("! error").fg(comfy_table::Color::Yellow),
    }
}

fn resolution_cell(resolution: Resolution) -> Cell {
    match resolution {
        Resolution::AutoMerged => Cell::new("auto merged").fg(comfy_table::Color::Green),
        Resolution::DualRetained => Cell::new("dual retained").fg(comfy_table::Color::Cyan),
        Resolution::RequiresManual => Cell::new("requires manual").fg(comfy_table::Color::Red),
    }
}
