use clap::{Parser, Subcommand};
use order_extract::{Config, OrderLineRecord, Policy, extract_document_with, revalidate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "order-extract")]
#[command(about = "Extract purchase-order lines from PDF, spreadsheet and text files")]
struct Cli {
    /// TOML config file (limits and word-list additions)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract order lines from one or more documents
    Extract {
        /// .pdf, .xls, .xlsx or .txt files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Re-check edited rows (a JSON array of order lines)
    Revalidate {
        /// JSON file with the edited rows
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = Config::load_or_default(cli.config.as_deref())?;

    // JSON goes to stdout, logs to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let policy = Arc::new(Policy::from_config(&cfg));

    match cli.command {
        Commands::Extract { files } => run_extract(files, policy, cli.pretty).await?,
        Commands::Revalidate { input } => run_revalidate(&input, &policy, cli.pretty)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), serde_json::Error> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

/// One blocking task per document; output keeps the argument order.
async fn run_extract(
    files: Vec<PathBuf>,
    policy: Arc<Policy>,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let handles: Vec<_> = files
        .into_iter()
        .map(|path| {
            let policy = Arc::clone(&policy);
            tokio::task::spawn_blocking(move || {
                let bytes = std::fs::read(&path)?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok::<_, std::io::Error>(extract_document_with(&bytes, &name, &policy))
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await??);
    }

    for result in results.iter().filter(|r| !r.is_ok()) {
        warn!(file = %result.meta.file_name, error = ?result.error, "no rows extracted");
    }
    info!(
        documents = results.len(),
        rows = results.iter().map(|r| r.data_rows.len()).sum::<usize>(),
        "extraction finished"
    );

    match results.as_slice() {
        [single] => print_json(single, pretty)?,
        _ => print_json(&results, pretty)?,
    }
    Ok(())
}

fn run_revalidate(input: &Path, policy: &Policy, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(input)?;
    let rows: Vec<OrderLineRecord> = serde_json::from_str(&content)?;
    let outcome = revalidate(rows, policy);
    print_json(&outcome, pretty)?;
    Ok(())
}
