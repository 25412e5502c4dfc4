use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustydigest::{
    config, logging,
    processing::{DigestApi, DigestOutcome, DigestService},
    store::DirectoryDocumentStore,
};

#[derive(Parser)]
#[command(
    name = "rustydigest",
    about = "Grounded outlines and answers from long documents"
)]
struct Cli {
    /// Directory holding uploaded documents (overrides DOCUMENTS_DIR).
    #[arg(long, global = true)]
    documents_dir: Option<PathBuf>,
    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a hierarchical outline of a document.
    Summarize {
        /// File name of the document inside the documents directory.
        document: String,
        /// Wrap the output in an HTML <pre> block.
        #[arg(long)]
        html: bool,
    },
    /// Answer a question using only the document's content.
    Ask {
        /// File name of the document inside the documents directory.
        document: String,
        /// Question to answer.
        question: String,
        /// Wrap the output in an HTML <pre> block.
        #[arg(long)]
        html: bool,
    },
    /// List documents available in the documents directory.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing(&cli.log_level);

    let documents_dir = cli
        .documents_dir
        .unwrap_or_else(|| PathBuf::from(&config.documents_dir));
    let store = Arc::new(DirectoryDocumentStore::new(documents_dir));

    if let Command::List = cli.command {
        let documents = store
            .list_documents()
            .with_context(|| format!("failed to list {}", store.root().display()))?;
        for document in documents {
            println!("{document}");
        }
        return Ok(());
    }

    config
        .require_credentials()
        .context("completion provider is not configured")?;
    let service = DigestService::from_config(config, store.clone())
        .context("failed to initialize digest service")?;

    let (outcome, html) = match cli.command {
        Command::Summarize { document, html } => (
            service
                .summarize(&document)
                .await
                .with_context(|| format!("failed to summarize {document}"))?,
            html,
        ),
        Command::Ask {
            document,
            question,
            html,
        } => (
            service
                .answer(&document, &question)
                .await
                .with_context(|| format!("failed to answer question about {document}"))?,
            html,
        ),
        Command::List => return Ok(()),
    };

    print_outcome(&outcome, html);
    let metrics = service.metrics_snapshot();
    tracing::info!(
        chunks = outcome.chunk_count,
        chunk_size = outcome.chunk_size,
        contributed = outcome.contributed,
        failed = outcome.failed,
        chunks_processed = metrics.chunks_processed,
        "Run complete"
    );
    Ok(())
}

fn print_outcome(outcome: &DigestOutcome, html: bool) {
    if html {
        println!("{}", outcome.preformatted());
    } else {
        println!("{}", outcome.text);
    }
}
