//! CLI tool for extracting styled text, tables, images and links from PDF,
//! DOCX and PPTX files.

mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use harvest_core::UnifiedRecordBatch;
use harvest_store::{FlatFileSink, Sink, SqlSink, SqliteConnector};
use std::path::{Path, PathBuf};

/// Extract structured content from office documents.
#[derive(Parser, Debug)]
#[command(name = "harvest-extract")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file(s) (.pdf, .docx or .pptx)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Write text_data.txt, tables.csv and images into <OUTPUT>/<file stem>/
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Store records in a SQLite database under this directory
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// Database name used with --db-dir
    #[arg(long, default_value = "extracted")]
    database: String,

    /// Print a JSON summary of each document to stdout
    #[arg(short, long)]
    print: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let mut sql_sink = args
        .db_dir
        .as_ref()
        .map(|dir| SqlSink::new(SqliteConnector::new(dir), args.database.clone()));

    let mut failed = 0;
    for input_path in &args.input {
        if args.verbose {
            eprintln!("Processing: {}", input_path.display());
        }

        if let Err(e) = process_file(input_path, &args, sql_sink.as_mut()) {
            eprintln!("Error processing {}: {:#}", input_path.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} documents failed", failed, args.input.len());
    }
    Ok(())
}

/// Extract one document and hand the batch to every configured sink.
fn process_file(
    input_path: &Path,
    args: &Args,
    sql_sink: Option<&mut SqlSink<SqliteConnector>>,
) -> Result<()> {
    let batch = pipeline::extract_document(input_path)
        .with_context(|| format!("Failed to extract {}", input_path.display()))?;

    if args.verbose {
        let summary = batch.summary();
        eprintln!(
            "  Found {} text spans, {} tables, {} images, {} links",
            summary.texts, summary.tables, summary.images, summary.links
        );
    }

    // Sinks run independently; one failing does not stop the other.
    let mut errors = Vec::new();

    if let Some(root) = &args.output {
        let dir = pipeline::flat_output_dir(root, input_path);
        match FlatFileSink::new(&dir).persist(&batch) {
            Ok(()) if args.verbose => eprintln!("  Written to: {}", dir.display()),
            Ok(()) => {}
            Err(e) => errors.push(format!("flat-file output: {}", e)),
        }
    }

    let stored = sql_sink.is_some();
    if let Some(sink) = sql_sink {
        if let Err(e) = sink.persist(&batch) {
            errors.push(format!("database: {}", e));
        }
    }

    if args.print || (args.output.is_none() && !stored) {
        print_summary(&batch)?;
    }

    // Text, links and tables are already persisted at this point.
    if let Err(e) = batch.check_images() {
        errors.push(format!("image extraction: {}", e));
    }

    if !errors.is_empty() {
        anyhow::bail!(errors.join("; "));
    }
    Ok(())
}

fn print_summary(batch: &UnifiedRecordBatch) -> Result<()> {
    let report = serde_json::json!({
        "summary": batch.summary(),
        "metadata": batch.metadata(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
