mod doctor;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragloop_core::config::{AppConfig, ModelConfig};
use ragloop_core::traits::VectorStore;

use ragloop_agent::{RagAnswer, RagWorkflow, WorkflowError};
use ragloop_store::{HttpEmbeddingProvider, Ingestor, RetryingStore, SqliteVectorStore};

#[derive(Parser)]
#[command(
    name = "ragloop",
    version,
    about = "Self-correcting retrieval-augmented question answering"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ragloop.toml", env = "RAGLOOP_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive question mode
    Repl {
        /// Let the model drive its own retrieval loop
        #[arg(long)]
        react: bool,
    },
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Let the model drive its own retrieval loop
        #[arg(long)]
        react: bool,
    },
    /// Index a text or markdown file (resumable)
    Ingest {
        /// File to ingest; pages are separated by form feeds
        path: PathBuf,
    },
    /// Run a raw similarity search against the index
    Search {
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
        /// Number of results
        #[arg(short, long, default_value = "3")]
        k: usize,
    },
    /// Show current configuration
    Config,
    /// Run environment checks
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ragloop=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Doctor) => {
            doctor::run_doctor(&config).await;
        }
        Some(Commands::Ingest { path }) => {
            let store = open_store(&config)?;
            run_ingest(store, &config, &path).await?;
        }
        Some(Commands::Search { query, k }) => {
            let store = open_store(&config)?;
            run_search(store.as_ref(), &query.join(" "), k).await?;
        }
        Some(Commands::Ask {
            question,
            json,
            react,
        }) => {
            let workflow = build_workflow(&config, react)?;
            let answer = workflow.ask(&question.join(" ")).await.map_err(|e| {
                print_failure(&e);
                anyhow::anyhow!(e.to_string())
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Some(Commands::Repl { react }) => {
            let workflow = build_workflow(&config, react)?;
            run_repl(&workflow, &config, react).await?;
        }
        None => {
            let workflow = build_workflow(&config, false)?;
            run_repl(&workflow, &config, false).await?;
        }
    }

    Ok(())
}

/// Load config from the given path, then `~/.ragloop/config.toml`, then the
/// environment.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home) = dirs_home().map(|h| h.join(".ragloop").join("config.toml")) {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home)?);
        }
    }
    warn!(path = %path.display(), "No config file found, using defaults");
    create_env_config()
}

/// Defaults to a local Ollama unless `OPENAI_API_KEY` is set.
fn create_env_config() -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::default();
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.model = ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            api_key: Some(key.clone()),
            ..ModelConfig::default()
        };
        config.embedding.base_url = "https://api.openai.com/v1".into();
        config.embedding.model = "text-embedding-3-small".into();
        config.embedding.api_key = Some(key);
        config.embedding.dimensions = 1536;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let embedder = Arc::new(HttpEmbeddingProvider::from_config(&config.embedding));
    let sqlite = SqliteVectorStore::open(&config.db_path(), &config.store.collection, embedder)?;
    let retry = config.store.retry.clone().unwrap_or_default();
    Ok(Arc::new(RetryingStore::new(Arc::new(sqlite), retry)))
}

fn build_workflow(config: &AppConfig, react: bool) -> anyhow::Result<RagWorkflow> {
    let store = open_store(config)?;
    let llm = ragloop_llm::create_client(&config.model);
    if react {
        Ok(RagWorkflow::react(llm, store, config))
    } else {
        Ok(RagWorkflow::new(llm, store, config))
    }
}

async fn run_ingest(
    store: Arc<dyn VectorStore>,
    config: &AppConfig,
    path: &Path,
) -> anyhow::Result<()> {
    let ingestor = Ingestor::new(store, &config.ingest, config.checkpoint_path());
    println!("Ingesting {} ...", path.display());

    tokio::select! {
        result = ingestor.ingest_file(path) => {
            let report = result?;
            if report.already_complete {
                println!("Already ingested ({} pages). Nothing to do.", report.total_pages);
            } else {
                if report.resumed_from > 0 {
                    println!("Resumed after page {}.", report.resumed_from);
                }
                println!(
                    "Done: {} pages processed, {} chunks added, {} already present.",
                    report.pages_processed, report.chunks_added, report.chunks_skipped
                );
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Ingestion interrupted");
            println!(
                "\nInterrupted. Progress is saved in {}; rerun to resume.",
                config.checkpoint_path().display()
            );
        }
    }
    Ok(())
}

async fn run_search(store: &dyn VectorStore, query: &str, k: usize) -> anyhow::Result<()> {
    let docs = store.similarity_search(query, k).await?;
    if docs.is_empty() {
        println!("No results. Has anything been ingested?");
        return Ok(());
    }
    for (i, doc) in docs.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, doc.score, doc.source_label());
        println!("   {}", truncate(&doc.content.replace('\n', " "), 200));
    }
    Ok(())
}

async fn run_repl(workflow: &RagWorkflow, config: &AppConfig, react: bool) -> anyhow::Result<()> {
    println!("ragloop v{}", env!("CARGO_PKG_VERSION"));
    if react {
        println!(
            "Model: {} ({}), reasoning agent, max steps: {}",
            config.model.model_id, config.model.provider, config.workflow.react_max_steps
        );
    } else {
        println!(
            "Model: {} ({}), max rewrites: {}",
            config.model.model_id, config.model.provider, config.workflow.max_rewrites
        );
    }
    println!("Ask a question, or type quit to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "quit" | "exit" | "q" | "/quit") {
            println!("Goodbye!");
            break;
        }

        match workflow.ask(input).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => print_failure(&e),
        }
        println!();
    }

    Ok(())
}

fn print_answer(answer: &RagAnswer) {
    for (i, step) in answer.reasoning.iter().enumerate() {
        println!("\nStep {}: {}", i + 1, step.thought);
        println!("  {} {}", step.action, step.input);
        println!("  -> {}", truncate(&step.observation.replace('\n', " "), 300));
    }
    println!("\n{}\n", answer.answer);
    if !answer.sources.is_empty() {
        println!("Sources: {}", answer.sources.join(", "));
    }
    if answer.final_question != answer.question {
        println!("Searched as: {}", answer.final_question);
    }
    println!(
        "Status: {} | rewrites: {} | low confidence: {}",
        answer.status, answer.rewrite_count, answer.low_confidence
    );
    println!("Trace: {}", format_trace(answer));
}

fn format_trace(answer: &RagAnswer) -> String {
    answer
        .trace
        .iter()
        .map(|t| format!("{} ({}ms)", t.node, t.elapsed_ms))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn print_failure(e: &WorkflowError) {
    eprintln!("Error in {}: {}", e.node, e.source);
    let steps: Vec<&str> = e.state.trace_names();
    if !steps.is_empty() {
        eprintln!("Trace: {}", steps.join(" -> "));
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
