use anyhow::Result;
use clap::Parser;
use console::style;
use devpost_upgrade::checkpoint::Checkpointer;
use devpost_upgrade::config::{self, CliOverrides, RunOptions};
use devpost_upgrade::model::{GeminiClient, ModelClient};
use devpost_upgrade::orchestrator::Orchestrator;
use devpost_upgrade::package_manager::Npm;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "devpost-upgrade")]
#[command(version, about = "Autonomous dependency upgrader - analyze, upgrade, heal, commit")]
struct Cli {
    /// Print the upgrade plan without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Confirm each group before upgrading it
    #[arg(long)]
    interactive: bool,

    /// Upgrade without creating commits
    #[arg(long)]
    no_commit: bool,

    /// Build command to verify upgrades (default: npm run build)
    #[arg(long, value_name = "CMD")]
    build_command: Option<String>,

    /// Test command to verify upgrades (default: npm test)
    #[arg(long, value_name = "CMD")]
    test_command: Option<String>,

    /// Fix attempts per group before rolling back
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Extra migration doc, repeatable: --migration-doc react=https://...
    #[arg(long = "migration-doc", value_name = "PKG=URL")]
    migration_doc: Vec<String>,

    /// Continue from the checkpoint of an interrupted run
    #[arg(long)]
    resume: bool,

    /// Delete the checkpoint and exit
    #[arg(long)]
    clear_state: bool,

    /// Project directory (default: current directory)
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing() {
    let debug = std::env::var("DEBUG")
        .map(|v| v == "true")
        .unwrap_or(false);
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let project_dir = config::resolve_project_dir(cli.project_dir.clone())?;

    if cli.clear_state {
        Checkpointer::new(&project_dir).clear()?;
        println!("Checkpoint cleared");
        return Ok(0);
    }

    let mut migration_docs = Vec::new();
    for value in &cli.migration_doc {
        migration_docs.push(config::parse_migration_doc(value)?);
    }
    let options = RunOptions::load(
        &project_dir,
        CliOverrides {
            build_command: cli.build_command.clone(),
            test_command: cli.test_command.clone(),
            max_retries: cli.max_retries,
            no_commit: cli.no_commit,
            dry_run: cli.dry_run,
            interactive: cli.interactive,
            migration_docs,
        },
    )?;

    // A missing API key disables grouping and fixing, not the run
    let model = match GeminiClient::from_env(&options.model_name) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "model-assisted paths disabled");
            None
        }
    };
    let model_ref: Option<&dyn ModelClient> = model.as_ref().map(|c| c as &dyn ModelClient);
    let package_manager = Npm;

    let mut orchestrator = if cli.resume {
        Orchestrator::resume(project_dir, &package_manager, model_ref, cli.verbose)?
    } else {
        Orchestrator::new(project_dir, options, &package_manager, model_ref, cli.verbose)
    };

    let summary = orchestrator.run().await?;
    Ok(summary.exit_code())
}
