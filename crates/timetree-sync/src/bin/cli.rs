use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use shared_types::{artifact_file_name, ErrorResponse, Mapping, StatusResponse};
use std::path::PathBuf;
use std::sync::Arc;

use timetree_sync::config::{MappingSource, ProcessEnv, Settings};
use timetree_sync::exporter::Exporter;
use timetree_sync::pollers::run_sync_cycle;

#[derive(Parser)]
#[command(name = "timetree-sync-cli")]
#[command(about = "Inspect and drive a timetree-sync deployment")]
#[command(
    long_about = "A command-line companion for the timetree-sync service.\n\n\
    Talks to a running service over HTTP (status, fetch), or works directly\n\
    from the local environment and .env file (units, sync-once)."
)]
struct Cli {
    /// Base URL of the running timetree-sync service.
    #[arg(
        short,
        long,
        default_value = "http://localhost:8000",
        env = "TIMETREE_SYNC_URL"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the service status and the units it currently sees
    Status,

    /// Download the published calendar of one unit
    Fetch {
        /// Unit name, i.e. the environment key of the mapping
        unit: String,

        /// Where to write the calendar. Defaults to `<unit>.ics`.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List the mappings found in the local environment
    ///
    /// Useful to check a .env file before deploying it.
    Units,

    /// Run one sync cycle locally and exit
    ///
    /// Uses the same settings as the service (TIMETREE_EMAIL, OUTPUT_DIR,
    /// EXPORTER_BIN, ...). Exits non-zero when any unit fails.
    SyncOnce {
        /// Only sync this unit
        unit: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    timetree_sync::init_tracing("timetree_sync=info");

    let base_url = cli.base_url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Status => show_status(&Client::new(), &base_url).await,
        Commands::Fetch { unit, output } => {
            fetch_calendar(&Client::new(), &base_url, &unit, output).await
        }
        Commands::Units => {
            print_units(&ProcessEnv.mappings());
            Ok(())
        }
        Commands::SyncOnce { unit } => sync_once(unit).await,
    }
}

async fn show_status(client: &Client, base_url: &str) -> anyhow::Result<()> {
    let response = client
        .get(format!("{}/", base_url))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", base_url))?;

    if !response.status().is_success() {
        bail!("Status endpoint returned {}", response.status());
    }

    let status: StatusResponse = response
        .json()
        .await
        .context("Failed to parse status response")?;

    println!("Status:        {}", status.status);
    println!("Sync interval: {} minutes", status.sync_interval_minutes);
    print_units(&status.units);
    Ok(())
}

async fn fetch_calendar(
    client: &Client,
    base_url: &str,
    unit: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let file_name = artifact_file_name(unit);
    let response = client
        .get(format!("{}/{}", base_url, file_name))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", base_url))?;

    match response.status() {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => {
            let reason = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| "not found".to_string());
            bail!("{} is not available: {}", unit, reason);
        }
        other => bail!("Server returned {} for {}", other, file_name),
    }

    let body = response.bytes().await.context("Failed to read calendar")?;
    let output = output.unwrap_or_else(|| PathBuf::from(&file_name));
    tokio::fs::write(&output, &body)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Saved {} ({} bytes)", output.display(), body.len());
    Ok(())
}

async fn sync_once(unit: Option<String>) -> anyhow::Result<()> {
    let settings = Arc::new(Settings::from_env()?);
    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.output_dir.display()))?;

    let mut mappings = ProcessEnv.mappings();
    if let Some(unit) = &unit {
        mappings.retain(|m| &m.name == unit);
        if mappings.is_empty() {
            bail!("No mapping named {} in the environment", unit);
        }
    }

    let exporter = Exporter::new(settings);
    let stats = run_sync_cycle(&exporter, &mappings).await;

    println!(
        "{} units: {} synced, {} failed",
        stats.units, stats.synced, stats.failed
    );
    if stats.failed > 0 {
        bail!("{} unit(s) failed to sync", stats.failed);
    }
    Ok(())
}

fn print_units(units: &[Mapping]) {
    if units.is_empty() {
        println!("No units configured");
        return;
    }

    println!("Units:");
    for unit in units {
        println!(
            "  {:<20} TimeTree {:<16} -> Google {}",
            unit.name, unit.source_id, unit.destination_id
        );
    }
}
