//! Rivulet CLI: run a whole pipeline locally over the in-memory broker,
//! or validate a pipeline description.
//!
//! A local run executes the distributed topology in one process: feeds
//! publish the datasets, then each node drains its queue in document
//! order (upstream terminals are already enqueued, so every stage runs to
//! quiescence), then the collectors write per-query result files.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rivulet_broker::{Broker, InMemoryBroker};
use rivulet_core::config::RuntimeConfig;
use rivulet_node::collect::collect;
use rivulet_node::feed::feed_csv;
use rivulet_node::{NodeError, Worker};
use rivulet_operators::spec::{parse_pipeline, PipelineSpec};

#[derive(Parser)]
#[command(name = "rivulet")]
#[command(about = "Rivulet: a partitioned stream-processing pipeline over a message broker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline from a YAML file over the in-memory broker
    Run {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Default sink batch size in rows (overrides env/config)
        #[arg(long)]
        batch_rows: Option<usize>,

        /// Abort a worker on the first malformed message
        #[arg(long)]
        strict: bool,
    },

    /// Validate a pipeline YAML file (parse + compile every node)
    Validate {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rivulet=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            batch_rows,
            strict,
        } => {
            if let Err(e) = run_pipeline(&pipeline, batch_rows, strict) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Commands::Validate { pipeline } => {
            if let Err(e) = validate_pipeline(&pipeline) {
                eprintln!("Validation failed: {e}");
                std::process::exit(1);
            }
            println!("✓ Pipeline is valid");
        }
    }
}

fn load_spec(path: &PathBuf) -> Result<PipelineSpec, NodeError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_pipeline(&text)?)
}

fn run_pipeline(
    path: &PathBuf,
    batch_rows: Option<usize>,
    strict: bool,
) -> Result<(), NodeError> {
    let spec = load_spec(path)?;

    let mut config = RuntimeConfig::from_env();
    if let Some(rows) = batch_rows {
        config.batch_rows = rows;
    }
    if strict {
        config.strict_messages = true;
    }

    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());

    for feed in &spec.feeds {
        let summary = feed_csv(&broker, feed, config.batch_rows)?;
        println!(
            "fed {} ({} rows) into '{}'",
            summary.table.name(),
            summary.rows,
            feed.queue
        );
    }

    for node in &spec.nodes {
        let mut worker = Worker::new(Arc::clone(&broker), node, &config)?;
        let stats = worker.run()?;
        println!(
            "node '{}': {} batches consumed, {} channels closed",
            node.name, stats.batches, stats.channels_closed
        );
    }

    for result in &spec.results {
        let summary = collect(&broker, result)?;
        for (query, rows) in &summary.written {
            println!("result '{}/{query}.csv': {rows} rows", result.dir);
        }
        for query in &summary.aborted {
            println!("query '{query}' aborted upstream; no result file");
        }
        if summary.incomplete > 0 {
            println!(
                "warning: {} channel(s) on '{}' never completed",
                summary.incomplete, result.queue
            );
        }
    }

    Ok(())
}

fn validate_pipeline(path: &PathBuf) -> Result<(), NodeError> {
    let spec = load_spec(path)?;
    // compile against a throwaway broker so config errors surface now
    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    let config = RuntimeConfig::default();
    for node in &spec.nodes {
        Worker::new(Arc::clone(&broker), node, &config)?;
    }
    Ok(())
}
