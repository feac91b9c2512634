//! Ferry - Command-line interface for the file transfer engine.
//!
//! This is a simple CLI for testing and manual use of the transfer engine.
//! It provides argument parsing, a non-interactive conflict policy, and
//! progress reporting to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::Receiver;
use ferry_engine::{
    ChannelObserver, ConflictDecision, ConflictHandler, DownloadRequest, Mode, TransferEvent,
    TransferManager, TransferRequest,
};

/// Ferry - copy, move, and download files with progress tracking
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(version = "0.1.0")]
#[command(about = "Copy, move, and download files with progress tracking")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// What to do when a destination path already exists
    #[arg(long, value_enum, global = true, default_value = "rename")]
    on_conflict: ConflictPolicy,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy files or directories into a destination directory
    Copy {
        /// Source paths
        sources: Vec<PathBuf>,

        /// Destination directory
        #[arg(long, value_name = "PATH")]
        dest: PathBuf,
    },

    /// Move files or directories into a destination directory
    Move {
        /// Source paths
        sources: Vec<PathBuf>,

        /// Destination directory
        #[arg(long, value_name = "PATH")]
        dest: PathBuf,
    },

    /// Download URLs into a destination directory
    Download {
        /// URLs to fetch, in order
        urls: Vec<String>,

        /// Destination directory
        #[arg(long, value_name = "PATH")]
        dest: PathBuf,
    },
}

/// Non-interactive stand-in for the conflict dialog.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum ConflictPolicy {
    /// Replace the existing destination
    Overwrite,
    /// Replace this and every later conflict without asking again
    OverwriteAll,
    /// Keep both, saving under a numbered name
    Rename,
    /// Leave the existing destination untouched
    Skip,
}

impl ConflictPolicy {
    fn handler(self) -> ConflictHandler {
        Arc::new(move |_existing, _source| match self {
            ConflictPolicy::Overwrite => ConflictDecision::Overwrite { apply_all: false },
            ConflictPolicy::OverwriteAll => ConflictDecision::Overwrite { apply_all: true },
            ConflictPolicy::Rename => ConflictDecision::Rename { new_path: None },
            ConflictPolicy::Skip => ConflictDecision::Skip,
        })
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

fn format_duration(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

fn print_progress_bar(percent: u32) -> String {
    let filled = (percent.min(100) / 5) as usize;
    let empty = 20 - filled;
    format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
}

/// Drain events until the terminal one, rendering progress to stderr.
fn drive(events: &Receiver<TransferEvent>, verbose: bool) -> (bool, String) {
    let start = Instant::now();
    let mut done = 0;
    let mut total = 1;

    loop {
        match events.recv() {
            Ok(TransferEvent::Progress {
                done: d,
                total: t,
            }) => {
                done = d;
                total = t.max(1);
                let percent = (done as f64 / total as f64 * 100.0) as u32;
                eprint!(
                    "\rProgress: {} | {}/{}",
                    print_progress_bar(percent),
                    format_bytes(done),
                    format_bytes(total)
                );
                let _ = std::io::Write::flush(&mut std::io::stderr());
            }
            Ok(TransferEvent::FileProgress { path }) => {
                if verbose {
                    eprintln!("\rFinished: {}", path.display());
                }
            }
            Ok(TransferEvent::Finished { success, error }) => {
                eprintln!();
                if success {
                    eprintln!(
                        "Transfer complete: {} in {}",
                        format_bytes(done),
                        format_duration(start.elapsed())
                    );
                } else if error == "Cancelled" {
                    eprintln!("Transfer cancelled");
                } else {
                    eprintln!("Transfer failed: {}", error);
                }
                return (success, error);
            }
            // Worker gone without a terminal event; treat as failure.
            Err(_) => return (false, "event channel closed".to_string()),
        }
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "warn" })
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run_cli(&args) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability.
///
/// Returns Ok(true) on success, Ok(false) when the task itself failed, and
/// Err for argument/validation problems.
fn run_cli(args: &Args) -> Result<bool, String> {
    let manager = TransferManager::new();
    let (observer, events) = ChannelObserver::channel();
    let handler = args.on_conflict.handler();

    match &args.command {
        Command::Copy { sources, dest } | Command::Move { sources, dest } => {
            if sources.is_empty() {
                return Err("No source paths given".to_string());
            }
            validate_dest(dest)?;
            let mode = match &args.command {
                Command::Move { .. } => Mode::Move,
                _ => Mode::Copy,
            };
            tracing::debug!(%mode, sources = sources.len(), "starting transfer");
            manager.start_transfer(
                TransferRequest::new(sources.clone(), dest.clone(), mode)
                    .with_conflict_handler(handler),
                Arc::new(observer),
            );
        }
        Command::Download { urls, dest } => {
            if urls.is_empty() {
                return Err("No URLs given".to_string());
            }
            validate_dest(dest)?;
            tracing::debug!(urls = urls.len(), "starting download");
            manager.start_download(
                DownloadRequest::new(urls.clone(), dest.clone()).with_conflict_handler(handler),
                Arc::new(observer),
            );
        }
    }

    let (success, _error) = drive(&events, args.verbose);
    Ok(success)
}

fn validate_dest(dest: &PathBuf) -> Result<(), String> {
    if !dest.exists() {
        return Err(format!(
            "Destination directory does not exist: {}",
            dest.display()
        ));
    }
    if !dest.is_dir() {
        return Err(format!(
            "Destination is not a directory: {}",
            dest.display()
        ));
    }
    Ok(())
}
