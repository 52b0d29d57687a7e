use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use swipesort::config::CacheConfig;
use swipesort::models::PreferenceStore;
use swipesort::{EngineConfig, Side, TriageEngine};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Args {
    from: Option<PathBuf>,
    to: Option<PathBuf>,
    db: Option<PathBuf>,
    moves: Vec<String>,
    back: Vec<String>,
    memory_mb: Option<usize>,
}

fn parse_args() -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--from" => {
                let value = args.next().context("Missing value for --from")?;
                parsed.from = Some(PathBuf::from(value));
            }
            "--to" => {
                let value = args.next().context("Missing value for --to")?;
                parsed.to = Some(PathBuf::from(value));
            }
            "--db" => {
                let value = args.next().context("Missing value for --db")?;
                parsed.db = Some(PathBuf::from(value));
            }
            "--move" => {
                let value = args.next().context("Missing value for --move")?;
                parsed.moves.push(value);
            }
            "--move-back" => {
                let value = args.next().context("Missing value for --move-back")?;
                parsed.back.push(value);
            }
            "--memory-mb" => {
                let value = args.next().context("Missing value for --memory-mb")?;
                parsed.memory_mb = Some(
                    value
                        .parse::<usize>()
                        .context("Failed to parse --memory-mb as a positive integer")?,
                );
            }
            "-h" | "--help" => {
                println!(
                    "usage: swipesort [--from DIR] [--to DIR] [--db FILE] \
                     [--move NAME]... [--move-back NAME]... [--memory-mb N]"
                );
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

fn print_pane(engine: &TriageEngine, side: Side) {
    let pane = engine.pane(side);
    println!("[{}] {} ({} items)", side.name(), pane.label(), pane.len());
    for entry in pane.entries() {
        println!("  {}  {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S"), entry.file_name);
    }
}

fn run() -> Result<()> {
    let args = parse_args()?;

    let store = match &args.db {
        Some(path) => PreferenceStore::open(path)?,
        None => PreferenceStore::open_default()?,
    };

    let mut config = EngineConfig::default();
    if let Some(mb) = args.memory_mb {
        config = config.with_cache(CacheConfig {
            max_memory_mb: mb,
            ..Default::default()
        });
    }
    let mut engine = TriageEngine::new(config)?;
    engine.restore_preferences(&store);
    if let Some(dir) = &args.from {
        engine.set_directory(Side::From, dir);
    }
    if let Some(dir) = &args.to {
        engine.set_directory(Side::To, dir);
    }
    if engine.needs_introduction() {
        bail!("Both directories must be chosen: pass --from DIR and --to DIR");
    }

    engine.mark_layout_complete();
    if !engine.settle(SETTLE_TIMEOUT) {
        warn!("Timed out waiting for the initial scan");
    }

    let requests = args
        .moves
        .iter()
        .map(|name| (Side::From, name))
        .chain(args.back.iter().map(|name| (Side::To, name)));
    for (side, name) in requests {
        if let Err(e) = engine.commit_swipe(side, name) {
            warn!(file = %name, error = %e, "Move rejected");
        }
    }
    if !engine.settle(SETTLE_TIMEOUT) {
        warn!("Timed out waiting for moves");
    }
    for note in engine.drain_notifications() {
        eprintln!("{}: {}", note.file_name, note.message);
    }

    print_pane(&engine, Side::From);
    print_pane(&engine, Side::To);

    engine.save_preferences(&store)?;
    info!("Saved directory selection");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swipesort=info".parse().unwrap()),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("swipesort: {e:#}");
        std::process::exit(1);
    }
}
