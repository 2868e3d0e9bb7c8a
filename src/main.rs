use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rag_engine::config::Config;
use rag_engine::engine::{RagEngine, DEFAULT_TOP_K};
use rag_engine::eval::evaluator::{EvaluationDataset, RagEvaluator};
use rag_engine::eval::DEFAULT_K;
use rag_engine::models::RagOptions;

#[derive(Parser)]
#[command(name = "rag", version, about = "Index local documents and ask questions about them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store files or directories
    Index {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        flags: Flags,
    },
    /// Answer a question from the stored index
    Query {
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Print retrieved chunks instead of generating an answer
        #[arg(long)]
        retrieve_only: bool,
        #[command(flatten)]
        flags: Flags,
    },
    /// Score retrieval and answers against a labelled query set
    Eval {
        /// JSON file with `queries: [{query, relevantChunkIds}]`
        dataset: PathBuf,
        #[arg(short = 'k', long, default_value_t = DEFAULT_K)]
        top_k: usize,
        #[command(flatten)]
        flags: Flags,
    },
}

#[derive(Args)]
struct Flags {
    /// Use the JSON store instead of the binary one
    #[arg(long)]
    json: bool,
    #[arg(long)]
    semantic_chunking: bool,
    #[arg(long)]
    hierarchical_chunking: bool,
    #[arg(long)]
    enrich_metadata: bool,
    #[arg(long)]
    expand_queries: bool,
    #[arg(long)]
    rerank: bool,
    #[arg(long)]
    expand_context: bool,
    #[arg(long)]
    multi_pass: bool,
    #[arg(long)]
    hybrid: bool,
}

impl From<Flags> for RagOptions {
    fn from(f: Flags) -> Self {
        RagOptions {
            json: f.json,
            semantic_chunking: f.semantic_chunking,
            hierarchical_chunking: f.hierarchical_chunking,
            enrich_metadata: f.enrich_metadata,
            expand_queries: f.expand_queries,
            rerank: f.rerank,
            expand_context: f.expand_context,
            multi_pass: f.multi_pass,
            hybrid: f.hybrid,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::info!("Store directory: {}", config.store_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let engine = RagEngine::from_config(config)?;

    match cli.command {
        Command::Index { paths, flags } => {
            let report = engine.index(&paths, &flags.into()).await?;
            if report.skipped {
                println!("Already indexed: {} file(s)", report.files.len());
            } else {
                println!(
                    "Indexed {} chunks from {} file(s) into {}",
                    report.chunks,
                    report.files.len(),
                    report.store_path.display()
                );
            }
        }
        Command::Query {
            text,
            top_k,
            retrieve_only,
            flags,
        } => {
            let text = text.join(" ");
            let options: RagOptions = flags.into();
            if retrieve_only {
                for (i, chunk) in engine.retrieve(&text, top_k, &options).await?.iter().enumerate() {
                    let source = chunk.metadata.source().unwrap_or("-");
                    println!("[{}] {} ({}..{})\n{}\n", i + 1, source, chunk.metadata.start_index, chunk.metadata.end_index, chunk.text);
                }
            } else {
                println!("{}", engine.query(&text, top_k, &options).await?);
            }
        }
        Command::Eval { dataset, top_k, flags } => {
            let dataset = EvaluationDataset::from_file(&dataset)?;
            let report = RagEvaluator::new(&engine, flags.into())
                .evaluate(&dataset, top_k)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
