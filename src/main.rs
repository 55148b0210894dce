//! org-labeler CLI
//!
//! Command line tool for reconciling labels across an organization's repositories

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use org_labeler::{
    commands::{search_labels, DeletePlan, ExecutionReport, Outcome, SyncPlan},
    config::{default_config_path, load_config, resolve_access_token, sample_config},
    Error, GitHubClient, LabelApi, OrgConfig,
};

/// org-labeler CLI
///
/// Reconcile GitHub labels across an organization
#[derive(Parser)]
#[command(
    name = "org-labeler",
    version,
    about = "Manage GitHub labels for an organization",
    long_about = "Reconciles the labels of every configured repository against a declarative \
    configuration, merging synonym labels into their canonical label.",
    after_help = "Reads configuration from ~/.org-labeler.yaml unless --config is given"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (YAML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// GitHub access token
    #[arg(short = 't', long, global = true)]
    access_token: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage labels for a GitHub organization
    Label {
        #[command(subcommand)]
        command: LabelCommands,
    },

    /// Output a sample configuration
    Init {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LabelCommands {
    /// Sync labels for a GitHub organization
    Sync {
        /// Relabel issues when a synonym is merged as part of a sync (slow)
        #[arg(short = 'r', long)]
        relabel: bool,

        /// Show the planned actions without executing them
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Search for labels in a GitHub organization
    Search {
        /// Pattern to search for (case-insensitive regex)
        #[arg(short = 'p', long, value_name = "PATTERN")]
        pattern: String,
    },

    /// Delete a label from a GitHub organization
    Delete {
        /// Label to delete
        label: String,

        /// Show the affected repositories without deleting
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = match cli.command {
        Commands::Init { output } => return run_init(output),
        Commands::Label { command } => command,
    };

    let config = load_label_config(cli.config)?;
    let token = resolve_access_token(cli.access_token, &config)?;
    let client = GitHubClient::new(&token, &config.endpoint)?;

    let login = client
        .viewer_login()
        .await
        .context("Authentication failed")?;
    tracing::info!(login = %login, "authenticated");

    let report = match command {
        LabelCommands::Sync {
            relabel,
            dry_run,
            yes,
        } => run_sync(&client, &config, relabel, dry_run, yes).await?,
        LabelCommands::Search { pattern } => {
            run_search(&client, &config, &pattern).await?;
            None
        }
        LabelCommands::Delete {
            label,
            dry_run,
            yes,
        } => run_delete(&client, &config, &label, dry_run, yes).await?,
    };

    if let Some(report) = report {
        display_report(&report);
        if report.has_failures() {
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Install the stderr log subscriber
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute sync command
async fn run_sync(
    client: &GitHubClient,
    config: &OrgConfig,
    relabel: bool,
    dry_run: bool,
    yes: bool,
) -> anyhow::Result<Option<ExecutionReport>> {
    let mut plan = SyncPlan::prepare(client, config, relabel).await?;
    display_skipped(&plan.skipped);

    if plan.is_empty() {
        println!("{} No changes required", "✓".green());
        return Ok(None);
    }

    println!("The following label actions will be executed:");
    if relabel {
        println!("  <action>: [# issues] (label edits)");
    } else {
        println!("  <action>: (label edits)");
    }
    let lines = plan.describe();
    for line in &lines {
        println!("  {line}");
    }

    if dry_run {
        println!("\n{} Dry run, nothing executed", "!".yellow());
        return Ok(None);
    }

    let prompt = format!("\nConfirm {} label actions: [y/N]: ", lines.len());
    if !yes && !confirm(&prompt)? {
        return Ok(None);
    }

    let width = lines.iter().map(String::len).max().unwrap_or(0) + 2;
    let report = plan
        .execute(client, |description, outcome| {
            print_step(description, outcome, width)
        })
        .await;

    Ok(Some(report))
}

/// Execute search command
async fn run_search(client: &GitHubClient, config: &OrgConfig, pattern: &str) -> anyhow::Result<()> {
    let found = search_labels(client, config, pattern).await?;

    println!("Labels found in the following repositories:");
    for (repository, labels) in &found {
        for label in labels {
            println!("  {}/{}: {}", config.organization, repository, label.cyan());
        }
    }

    Ok(())
}

/// Execute delete command
async fn run_delete(
    client: &GitHubClient,
    config: &OrgConfig,
    label: &str,
    dry_run: bool,
    yes: bool,
) -> anyhow::Result<Option<ExecutionReport>> {
    let plan = DeletePlan::prepare(client, config, label).await?;
    display_skipped(&plan.skipped);

    if plan.is_empty() {
        println!("{} Label \"{}\" not found in any repository", "✓".green(), label);
        return Ok(None);
    }

    println!(
        "Label \"{}\" will be deleted from the following repositories:",
        label
    );
    for line in plan.describe() {
        println!("  {line}");
    }

    if dry_run {
        println!("\n{} Dry run, nothing deleted", "!".yellow());
        return Ok(None);
    }

    let prompt = format!(
        "\nConfirm deletion from {} repositories: [y/N]: ",
        plan.targets.len()
    );
    if !yes && !confirm(&prompt)? {
        return Ok(None);
    }

    let report = plan
        .execute(client, |description, outcome| print_step(description, outcome, 50))
        .await;

    Ok(Some(report))
}

/// Execute init command
fn run_init(output: Option<PathBuf>) -> anyhow::Result<()> {
    let content = serde_yaml::to_string(&sample_config())?;

    if let Some(output_path) = output {
        if output_path.exists() {
            bail!("Refusing to overwrite {}", output_path.display());
        }
        std::fs::write(&output_path, content)?;
        println!(
            "{} Sample configuration written to: {}",
            "✓".green(),
            output_path.display().to_string().cyan()
        );
    } else {
        print!("{content}");
    }

    Ok(())
}

/// Load organization configuration
fn load_label_config(config_path: Option<PathBuf>) -> anyhow::Result<OrgConfig> {
    let path = config_path
        .or_else(default_config_path)
        .ok_or_else(|| Error::config_validation("Cannot locate home directory, use --config"))?;

    load_config(&path).with_context(|| {
        format!(
            "Failed to read configuration from {}. Create one with: org-labeler init -o {}",
            path.display(),
            path.display()
        )
    })
}

/// Ask for confirmation on stdin
fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_step(description: &str, outcome: &Outcome, width: usize) {
    let marker = match outcome {
        Outcome::Succeeded => format!("[{}]", "OK".green()),
        Outcome::Skipped => format!("[{}]", "SKIPPED".red()),
        Outcome::Failed(_) => format!("[{}]", "FAILED".red()),
    };
    println!("  {description:<width$}{marker}");
}

fn display_skipped(skipped: &[(String, Error)]) {
    for (repository, error) in skipped {
        eprintln!("{} Skipped {}: {}", "✗".red(), repository, error.to_string().red());
    }
}

/// Display execution results
fn display_report(report: &ExecutionReport) {
    if report.has_failures() {
        eprintln!("\n{} Errors occurred:", "✗".red());
        for failure in &report.failures {
            eprintln!("  {}", failure.red());
        }
        if report.not_attempted > 0 {
            eprintln!(
                "  {} remaining actions were not attempted",
                report.not_attempted
            );
        }
    } else {
        println!(
            "\n{} Done: {} executed, {} skipped",
            "✓".green(),
            report.succeeded,
            report.skipped
        );
    }
}
