//! Command-line front end for receipt scanning.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tillroll_ocr::ScanConfig;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Extract store, date, totals and line items from receipts
#[derive(Parser, Debug)]
#[command(name = "tillroll")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML scan config (tesseract, pdftoppm, threshold)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// OCR receipt images or PDFs and print the extracted fields
    Scan(commands::ScanArgs),

    /// Parse raw OCR text that was extracted elsewhere
    Parse(commands::ParseArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ScanConfig::default(),
    };

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::Scan(args) => {
            let pipeline = config.pipeline().context("invalid scan configuration")?;
            commands::scan(&pipeline, &args, &mut stdout).await
        }
        Commands::Parse(args) => commands::parse(&args, std::io::stdin().lock(), &mut stdout),
    }
}
