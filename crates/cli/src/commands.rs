use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tillroll_ocr::{OcrBackend, OcrResult, ReceiptPipeline, ReceiptRecord};

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Receipt images or PDFs
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Print one JSON array of records per file instead of page banners
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Text file holding raw OCR output; reads stdin when omitted
    pub file: Option<PathBuf>,
}

/// OCR each file and print its records. Stops at the first file that fails.
pub async fn scan<R: OcrBackend + 'static>(
    pipeline: &ReceiptPipeline<R>,
    args: &ScanArgs,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    for path in &args.files {
        tracing::info!("Scanning {}", path.display());
        let results = pipeline
            .process_file(path)
            .await
            .with_context(|| format!("failed to scan {}", path.display()))?;
        write_results(&results, args.json, out)?;
    }
    Ok(())
}

fn write_results(results: &[OcrResult], json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    if json {
        let records: Vec<&ReceiptRecord> = results.iter().map(|r| &r.record).collect();
        serde_json::to_writer_pretty(&mut *out, &records)?;
        writeln!(out)?;
        return Ok(());
    }
    for result in results {
        writeln!(out, "\n=== Receipt Page {} ===", result.page)?;
        serde_json::to_writer_pretty(&mut *out, &result.record)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Parse already-extracted OCR text; no image tooling involved.
pub fn parse(args: &ParseArgs, mut stdin: impl Read, out: &mut impl Write) -> anyhow::Result<()> {
    let text = match &args.file {
        Some(path) => read_text(path)?,
        None => {
            let mut buf = Vec::new();
            stdin.read_to_end(&mut buf).context("failed to read stdin")?;
            String::from_utf8_lossy(&buf).into_owned()
        }
    };
    let record = tillroll_ocr::parse(&text);
    serde_json::to_writer_pretty(&mut *out, &record)?;
    writeln!(out)?;
    Ok(())
}

/// OCR dumps are not always valid UTF-8; decode lossily rather than refuse.
fn read_text(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
