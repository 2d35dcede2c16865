use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

use salvage::application::dto::{IoMode, ScanEvent};
use salvage::application::{RecoveryWriter, SessionHandle};
use salvage::domain::entities::{RecordStatus, format_bytes};
use salvage::domain::services::SignatureCatalog;
use salvage::presentation::cli::{Cli, Commands, ProgressReporter};
use salvage::{Bridge, Config};

const PROGRESS_TICK: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    init_tracing(&cli, &config);

    match cli.command {
        Commands::Volumes { json } => list_volumes(&Bridge::new(&config), json),
        Commands::Signatures => {
            list_signatures();
            Ok(())
        }
        Commands::Scan {
            target,
            mode,
            window,
            types,
            mmap,
            save_to,
            parallel,
            json,
        } => {
            if let Some(mode) = mode {
                config.scan.extent_mode = mode.into();
            }
            if let Some(bytes) = window {
                config.scan.window_size = bytes;
            }
            if let Some(types) = types {
                config.scan.categories = types;
            }
            if mmap {
                config.scan.io_mode = IoMode::Mmap;
            }
            config.validate().context("Invalid scan options")?;

            let bridge = Bridge::new(&config);
            let handle = run_scan(&bridge, &target, json).await?;

            if let Some(dir) = save_to {
                save_all(&config, &handle, &dir, parallel)?;
            }
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        config.log_level.into()
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn list_volumes(bridge: &Bridge, json: bool) -> Result<()> {
    let volumes = bridge.list_volumes().context("Failed to list volumes")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&volumes)?);
        return Ok(());
    }
    if volumes.is_empty() {
        println!("No volumes found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<24} {:<8} {:>12} {:>12} {:>6}",
        "NAME", "MOUNT", "FS", "SIZE", "FREE", "USED"
    );
    println!("{}", "-".repeat(80));
    for v in &volumes {
        println!(
            "{:<12} {:<24} {:<8} {:>12} {:>12} {:>5.1}%{}",
            v.name,
            v.mount_point,
            v.file_system,
            format_bytes(v.total_space),
            format_bytes(v.available_space),
            v.used_percentage,
            if v.is_removable { "  removable" } else { "" }
        );
    }
    Ok(())
}

fn list_signatures() {
    let catalog = SignatureCatalog::default_catalog();

    println!("Supported File Signatures (in match priority):\n");
    println!("{:<12} {:<10} {:<6} {:>12}  HEADER", "RULE", "CATEGORY", "EXT", "MAX SIZE");
    println!("{}", "-".repeat(70));
    for rule in catalog.rules() {
        let header: Vec<String> = rule.header().iter().map(|b| format!("{b:02X}")).collect();
        println!(
            "{:<12} {:<10} {:<6} {:>12}  {}",
            rule.id(),
            rule.category(),
            rule.extension(),
            format_bytes(rule.max_size()),
            header.join(" ")
        );
    }
}

async fn run_scan(bridge: &Bridge, target: &str, json: bool) -> Result<SessionHandle> {
    let start = bridge
        .start_scan(target)
        .with_context(|| format!("Failed to start scan of {target}"))?;
    let handle = start.handle;
    let mut events = start.events;

    let reporter = if json {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::for_scan()
    };
    let mut tick = tokio::time::interval(PROGRESS_TICK);
    let mut interrupted = false;
    let mut terminal = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else if let ScanEvent::FileFound(found) = &event {
                    reporter.println(format!(
                        "  #{:<6} {:<24} {:<10} {:>12}  {}",
                        found.id,
                        found.name,
                        found.category,
                        format_bytes(found.size),
                        found.original_path
                    ));
                }
                if event.is_terminal() {
                    terminal = Some(event);
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                reporter.println("Cancelling...");
                handle.cancel();
            }
            _ = tick.tick() => reporter.update_from_scan(&handle.progress()),
        }
    }

    reporter.update_from_scan(&handle.progress());
    match terminal {
        Some(ScanEvent::ScanComplete(summary)) => reporter.finish(&format!(
            "Scan complete: {} files in {}",
            summary.files_found,
            format_bytes(summary.bytes_scanned)
        )),
        Some(ScanEvent::ScanCancelled(summary)) => reporter.finish(&format!(
            "Scan cancelled: {} files kept",
            summary.files_found
        )),
        Some(ScanEvent::ScanFailed { message }) => {
            reporter.finish("Scan failed");
            bail!("Scan of {target} failed: {message}");
        }
        _ => bail!("Scan of {target} ended without a result"),
    }

    Ok(handle)
}

fn save_all(config: &Config, handle: &SessionHandle, dir: &Path, parallel: bool) -> Result<()> {
    let records = handle.records();
    if records.is_empty() {
        println!("Nothing to save.");
        return Ok(());
    }

    let writer = RecoveryWriter::new(config.recovery.clone());
    let report = if parallel {
        writer.save_batch_parallel(&records, dir)
    } else {
        writer.save_batch(&records, dir)
    };

    for file in &report.files {
        let status = if file.result.is_ok() {
            RecordStatus::Saved
        } else {
            RecordStatus::Failed
        };
        handle
            .set_status(file.id, status)
            .with_context(|| format!("Failed to update {}", file.name))?;
    }

    print!("\n{}", report.summary());
    Ok(())
}
