//! aislog: CLI + live pipeline for AIS vessel tracking.

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::info;

use ais_core::config::{self, ContactConfig, PositionConfig};
use ais_core::{ContactStore, RoutingHub, RoutingMatrix};

mod db;
mod outputs;
mod pipeline;
mod sources;

use pipeline::{Pipeline, PipelineOptions, StoreCommand};

#[derive(Parser)]
#[command(name = "aislog", version, about = "AIS decoder, router and vessel tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a sentence log and print a vessel table
    Decode {
        /// Path to file containing NMEA/AIS sentences (one per line), or - for stdin
        file: PathBuf,

        /// Print every decoded record as JSON instead of the table
        #[arg(short, long)]
        raw: bool,
    },

    /// Run the live pipeline, printing change events as JSON lines
    Run {
        /// Configuration file
        #[arg(long, env = "AISLOG_CONFIG")]
        config: Option<PathBuf>,

        /// SQLite database for snapshot logs
        #[arg(long)]
        db_path: Option<String>,

        /// Do not write snapshot logs
        #[arg(long)]
        no_db: bool,

        /// Manual own position as LAT,LON
        #[arg(long)]
        own_position: Option<String>,
    },

    /// Show database statistics
    Stats {
        /// SQLite database path
        #[arg(long)]
        db_path: Option<String>,

        /// Also list the latest stored positions of this vessel
        #[arg(long)]
        mmsi: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the event stream.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { file, raw } => cmd_decode(file, raw),
        Commands::Run {
            config,
            db_path,
            no_db,
            own_position,
        } => cmd_run(config, db_path, no_db, own_position).await,
        Commands::Stats { db_path, mmsi } => cmd_stats(db_path, mmsi),
    }
}

fn default_db_path() -> String {
    config::config_dir().join("aislog.db").display().to_string()
}

fn parse_lat_lon(val: &str) -> Result<(f64, f64)> {
    let Some((lat, lon)) = val.split_once(',') else {
        bail!("expected LAT,LON, got {val:?}");
    };
    let lat: f64 = lat.trim().parse().context("latitude")?;
    let lon: f64 = lon.trim().parse().context("longitude")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        bail!("position out of range: {lat},{lon}");
    }
    Ok((lat, lon))
}

fn cmd_decode(file: PathBuf, raw: bool) -> Result<()> {
    let reader: Box<dyn BufRead> = if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(&file)
            .with_context(|| format!("opening {}", file.display()))?;
        Box::new(io::BufReader::new(f))
    };

    let source = file.display().to_string();
    let mut hub = RoutingHub::new(RoutingMatrix::default());
    let settings = ContactConfig {
        min_updates: 1,
        ..ContactConfig::default()
    };
    let mut store = ContactStore::new(settings, PositionConfig::default());
    let mut timestamp = 0.0f64;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        // Auto-increment for logs without timestamps
        timestamp += 0.1;

        let Some(record) = hub.ingest(&source, &line, timestamp) else {
            continue;
        };
        if raw {
            println!("{}", serde_json::to_string(&record)?);
        }
        store.apply(&source, &record);
    }

    if !raw {
        let stats = hub.stats();
        let s = stats.get(&source).copied().unwrap_or_default();
        print_summary(&store, s.received, s.parsed);
    }
    Ok(())
}

fn print_summary(store: &ContactStore, received: u64, parsed: u64) {
    println!();
    println!(
        "Sentences: {received} received, {parsed} parsed, {} vessels",
        store.len()
    );
    println!();

    if store.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "MMSI", "Name", "Callsign", "Type", "Class", "Nation", "Lat", "Lon", "SOG", "COG",
        "Hdg", "Destination", "Msgs",
    ]);

    let mut sorted = store.contacts();
    sorted.sort_by_key(|c| std::cmp::Reverse(c.version));

    for c in sorted {
        table.add_row(vec![
            Cell::new(c.mmsi),
            Cell::new(c.name.as_deref().unwrap_or("-")),
            Cell::new(c.callsign.as_deref().unwrap_or("-")),
            Cell::new(c.typename.unwrap_or("-")),
            Cell::new(
                c.transponder
                    .map(|t| t.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(c.nation.map(|n| n.code).unwrap_or("-")),
            Cell::new(c.lat.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(c.lon.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(c.sog.map(|s| format!("{s:.1}")).unwrap_or("-".into())),
            Cell::new(c.cog.map(|h| format!("{h:.1}")).unwrap_or("-".into())),
            Cell::new(c.heading.map(|h| h.to_string()).unwrap_or("-".into())),
            Cell::new(c.destination.as_deref().unwrap_or("-")),
            Cell::new(c.version),
        ]);
    }

    println!("{table}");
}

async fn cmd_run(
    config_path: Option<PathBuf>,
    db_path: Option<String>,
    no_db: bool,
    own_position: Option<String>,
) -> Result<()> {
    let config_path = config_path.unwrap_or_else(config::config_file);
    let config = config::load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(path = %config_path.display(), sources = config.sources.len(), "configuration loaded");

    let manual = own_position.as_deref().map(parse_lat_lon).transpose()?;

    let database = if no_db {
        None
    } else {
        let path = db_path.unwrap_or_else(default_db_path);
        let database =
            db::Database::open(&path).with_context(|| format!("opening database {path}"))?;
        info!(path = %path, "database open");
        Some(database)
    };

    let mut pipeline = Pipeline::start(&config, database, PipelineOptions::default()).await?;
    if let Some((lat, lon)) = manual {
        let _ = pipeline
            .store_commands
            .send(StoreCommand::SetManualPosition { lat, lon });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
        _ = pipeline.sources_finished() => info!("all sources finished"),
    }

    let summary = pipeline.shutdown().await?;
    for (source, s) in &summary.stats {
        info!(source = %source, received = s.received, parsed = s.parsed, failed = s.failed, "final source stats");
    }
    info!(
        contacts = summary.contacts,
        events_dropped = summary.events_dropped,
        "done"
    );
    Ok(())
}

fn cmd_stats(db_path: Option<String>, mmsi: Option<u32>) -> Result<()> {
    let db_path = db_path.unwrap_or_else(default_db_path);
    let database =
        db::Database::open(&db_path).with_context(|| format!("opening database {db_path}"))?;

    let stats = database.stats();

    println!();
    println!("Database: {db_path}");
    println!();
    println!("  Vessels:          {}", stats.vessels);
    println!("  Positions:        {}", stats.positions);
    println!("  Metadata rows:    {}", stats.metadata);
    println!("  Identifications:  {}", stats.identifications);
    println!();

    if let Some(mmsi) = mmsi {
        let positions = database.get_positions(mmsi, 20);
        let mut table = Table::new();
        table.set_header(vec!["Time", "Lat", "Lon", "Georef", "SOG", "COG"]);
        for p in &positions {
            table.add_row(vec![
                Cell::new(format!("{:.0}", p.timestamp)),
                Cell::new(format!("{:.5}", p.lat)),
                Cell::new(format!("{:.5}", p.lon)),
                Cell::new(p.georef.as_deref().unwrap_or("-")),
                Cell::new(p.sog.map(|s| format!("{s:.1}")).unwrap_or("-".into())),
                Cell::new(p.cog.map(|c| format!("{c:.1}")).unwrap_or("-".into())),
            ]);
        }
        println!("{mmsi}: {} positions", positions.len());
        println!("{table}");
    }
    Ok(())
}
