// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use subconscious::utils::logging::{
    format_error, format_info, format_speaker, format_success, format_warning,
};
use subconscious::{
    BuildOptions, CancelToken, Config, ConversationMemory, IndexHandle, PipelineError,
    ProgressTracker, RagPipeline, RetrievalResult, VectorIndex,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "subconscious")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Chat with your own notes", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Notes directory, overrides data.path from the configuration
    #[arg(short, long, value_name = "DIR", env = "SUBCONSCIOUS_DATA_PATH")]
    data_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index and print statistics
    Index,

    /// Retrieve matching excerpts without generating an answer
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Ask a single question
    Ask { query: String },

    /// Interactive conversation over the notes
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    subconscious::utils::logging::init_logger(cli.color, cli.verbose);
    colored::control::set_override(cli.color);

    info!("Loading configuration from: {}", cli.config.display());

    let mut config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::load(None).context("Failed to load configuration")?
    };

    if let Some(path) = cli.data_path {
        config.data.path = path;
    }

    let pipeline = RagPipeline::new(config).context("Failed to initialize pipeline")?;

    match cli.command {
        Commands::Index => {
            cmd_index(&pipeline, cli.color).await?;
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => {
            cmd_search(&pipeline, cli.color, &query, limit, threshold).await?;
        }
        Commands::Ask { query } => {
            cmd_ask(&pipeline, cli.color, &query).await?;
        }
        Commands::Chat => {
            cmd_chat(&pipeline, cli.color).await?;
        }
    }

    Ok(())
}

/// Builds the index for `path`; Ctrl-C aborts the build.
async fn build(pipeline: &RagPipeline, path: &Path, color: bool) -> Result<VectorIndex> {
    let cancel = CancelToken::new();
    let options = BuildOptions {
        progress: Some(ProgressTracker::new(color)),
        cancel: Some(cancel.clone()),
    };

    let (index, stats) = tokio::select! {
        built = pipeline.build_index_with(path, options) => {
            built.with_context(|| format!("Failed to index {}", path.display()))?
        }
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            return Err(PipelineError::Cancelled).context("Index build interrupted");
        }
    };

    println!("{}", format_success(&format!("Indexed {}", path.display())));
    println!("  {}", stats.summary());
    if index.is_empty() {
        println!(
            "{}",
            format_warning("No notes found; answers will have no context")
        );
    }
    Ok(index)
}

async fn cmd_index(pipeline: &RagPipeline, color: bool) -> Result<()> {
    let path = pipeline.config().data.path.clone();
    let index = build(pipeline, &path, color).await?;
    println!(
        "  {} chunks, {} dimensions, model {}",
        index.len(),
        index.dims(),
        index.embedding_model()
    );
    Ok(())
}

async fn cmd_search(
    pipeline: &RagPipeline,
    color: bool,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f32>,
) -> Result<()> {
    let path = pipeline.config().data.path.clone();
    let index = build(pipeline, &path, color).await?;

    let retrieval = &pipeline.config().retrieval;
    let results = pipeline
        .retrieve_with(
            &index,
            query,
            limit.unwrap_or(retrieval.top_k),
            threshold.unwrap_or(retrieval.similarity_threshold),
        )
        .await
        .context("Search failed")?;

    if results.is_empty() {
        println!("\nNo results found for query: \"{}\"\n", query);
        println!("Try:");
        println!("  - Using different search terms");
        println!("  - Lowering --threshold");
        return Ok(());
    }

    println!("\n{} results for \"{}\":\n", results.len(), query);
    for (rank, entry) in results.iter().enumerate() {
        println!("{}. {}", rank + 1, entry.chunk.filename().bold());
        println!("   {}", entry.format_summary(240).replace('\n', "\n   "));
    }
    Ok(())
}

async fn cmd_ask(pipeline: &RagPipeline, color: bool, query: &str) -> Result<()> {
    let path = pipeline.config().data.path.clone();
    let index = build(pipeline, &path, color).await?;
    let mut memory = pipeline.memory()?;

    answer(pipeline, &index, query, &mut memory).await
}

async fn cmd_chat(pipeline: &RagPipeline, color: bool) -> Result<()> {
    let path = pipeline.config().data.path.clone();
    let handle = IndexHandle::new(build(pipeline, &path, color).await?);
    let mut memory = pipeline.memory()?;

    println!(
        "{}",
        format_info("Ask about your notes. /reset, /reload, /path <dir>, /quit")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", format_speaker("you"));
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/reset" => {
                memory.clear();
                println!("{}", format_success("Conversation cleared"));
            }
            "/reload" => {
                let source = handle.snapshot().source().to_path_buf();
                reload(pipeline, &handle, &source, color).await;
            }
            _ if input.starts_with("/path") => {
                let dir = input.trim_start_matches("/path").trim();
                if dir.is_empty() {
                    println!(
                        "{}",
                        format_info(&format!(
                            "Current notes: {}",
                            handle.snapshot().source().display()
                        ))
                    );
                } else {
                    reload(pipeline, &handle, Path::new(dir), color).await;
                }
            }
            _ => {
                let index = handle.snapshot();
                if let Err(err) = answer(pipeline, &index, input, &mut memory).await {
                    println!("{}", format_error(&format!("{:#}", err)));
                }
            }
        }
    }

    Ok(())
}

/// A failed rebuild keeps the current index in place.
async fn reload(pipeline: &RagPipeline, handle: &IndexHandle, path: &Path, color: bool) {
    let options = BuildOptions {
        progress: Some(ProgressTracker::new(color)),
        cancel: None,
    };
    match pipeline.reload(handle, path, options).await {
        Ok(stats) => {
            println!(
                "{}",
                format_success(&format!("Indexed {}: {}", path.display(), stats.summary()))
            );
        }
        Err(err) => {
            println!(
                "{}",
                format_error(&format!("Keeping previous index: {}", err))
            );
        }
    }
}

/// Streams one answer to stdout. Ctrl-C stops the answer without an error.
async fn answer(
    pipeline: &RagPipeline,
    index: &VectorIndex,
    query: &str,
    memory: &mut ConversationMemory,
) -> Result<()> {
    let mut stream = pipeline.ask(index, query, memory).await?;
    let mut stdout = std::io::stdout();
    let mut printed_header = false;

    loop {
        let item = tokio::select! {
            item = stream.next() => item,
            _ = tokio::signal::ctrl_c() => {
                stream.cancel();
                println!("\n{}", format_warning("Answer cancelled"));
                return Ok(());
            }
        };

        match item {
            Some(Ok(fragment)) => {
                if !printed_header {
                    print!("{} ", format_speaker("notes"));
                    printed_header = true;
                }
                print!("{}", fragment);
                stdout.flush().ok();
            }
            Some(Err(err)) => {
                if !stream.partial_text().is_empty() {
                    println!("\n\n[response interrupted]");
                }
                return Err(err).context("Answer failed");
            }
            None => break,
        }
    }

    println!();
    print_sources(stream.retrieval());
    Ok(())
}

fn print_sources(retrieval: &RetrievalResult) {
    let sources = retrieval.sources();
    if sources.is_empty() {
        println!("{}", "(no matching notes)".dimmed());
    } else {
        println!("{} {}", "sources:".dimmed(), sources.join(", ").dimmed());
    }
}
