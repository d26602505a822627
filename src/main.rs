//! # Relevance Dataset CLI (`reldata`)
//!
//! Builds LLM-labelled relevance datasets from a search engine index.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reldata generate --config <file>` | Run the full pipeline described by a config file |
//! | `reldata write --datastore <file> --format <fmt> --output <dir>` | Re-export a saved datastore in another format |
//! | `reldata stats --datastore <file>` | Summarise a saved datastore |
//!
//! ## Examples
//!
//! ```bash
//! # Generate a Quepid dataset from a Solr core
//! reldata generate --config ./config/solr.yaml
//!
//! # Same run with debug logs and JSON progress on stderr
//! reldata --verbose generate --config ./config/solr.yaml --progress json
//!
//! # Turn the saved datastore into MTEB files
//! reldata write --datastore resources/tmp/datastore.json --format mteb --output out/mteb
//! ```
//!
//! Logs and progress go to stderr. The exit code is 0 on success and
//! otherwise identifies the failure kind (3 configuration, 4 transport,
//! 5 validation, 6 LLM response, 10 I/O).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use relevance_dataset::config::{load_config, Config};
use relevance_dataset::datastore::{DataStore, StoreOptions, DEFAULT_DATASTORE_PATH};
use relevance_dataset::pipeline::Pipeline;
use relevance_dataset::progress::ProgressMode;
use relevance_dataset::writers::{create_writer, OutputFormat, WriterConfig};
use relevance_dataset::{stats, Error};

#[derive(Parser)]
#[command(
    name = "reldata",
    about = "Generate LLM-labelled search relevance datasets",
    version,
    long_about = "reldata samples documents from Solr, Elasticsearch, OpenSearch or Vespa, \
    asks a language model to write queries and grade (query, document) pairs, and exports \
    the ratings for Quepid, RRE, MTEB or the dataset visualiser."
)]
struct Cli {
    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dataset generation pipeline.
    ///
    /// Fetches seed documents, generates queries, scores pairs, saves the
    /// datastore, and writes the configured output format.
    Generate {
        /// Path to the run configuration (YAML, or TOML by extension).
        #[arg(long)]
        config: PathBuf,

        /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Write a saved datastore in an output format.
    Write {
        #[arg(long, default_value = DEFAULT_DATASTORE_PATH)]
        datastore: PathBuf,

        #[arg(long, value_enum)]
        format: OutputFormat,

        /// Output directory.
        #[arg(long)]
        output: PathBuf,

        /// Index / collection name recorded in RRE output.
        #[arg(long, default_value = "")]
        index: String,

        /// RRE only.
        #[arg(long)]
        id_field: Option<String>,

        /// RRE only: template file name referenced by each query group.
        #[arg(long)]
        query_template: Option<String>,

        /// RRE only.
        #[arg(long)]
        query_placeholder: Option<String>,
    },

    /// Show statistics for a saved datastore.
    Stats {
        #[arg(long, default_value = DEFAULT_DATASTORE_PATH)]
        datastore: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// `preloaded` is the already parsed `generate` config, if any.
async fn run(
    cli: Cli,
    preloaded: Option<relevance_dataset::Result<Config>>,
) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate { config, progress } => {
            let cfg = preloaded.unwrap_or_else(|| load_config(&config))?;
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let mut pipeline = Pipeline::from_config(cfg)
                .await?
                .with_progress(progress.reporter());
            let summary = pipeline.run().await?;
            println!("Dataset generated: {summary}");
        }
        Commands::Write {
            datastore,
            format,
            output,
            index,
            id_field,
            query_template,
            query_placeholder,
        } => {
            let store = DataStore::open(&datastore, StoreOptions::default())?;
            let writer = create_writer(&WriterConfig {
                output_format: format,
                index,
                id_field,
                query_template,
                query_placeholder,
            })?;
            writer.write(&output, &store)?;
            println!(
                "Wrote {} ratings as {} to {}",
                store.rating_count(),
                format,
                output.display()
            );
        }
        Commands::Stats { datastore } => {
            stats::run_stats(&datastore)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    // Parsed before tracing starts: `verbose: true` in it turns on debug logging.
    let preloaded = match &cli.command {
        Commands::Generate { config, .. } => Some(load_config(config)),
        _ => None,
    };
    let verbose = cli.verbose || matches!(&preloaded, Some(Ok(c)) if c.verbose);
    init_tracing(verbose);

    match run(cli, preloaded).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code as u8)
        }
    }
}
