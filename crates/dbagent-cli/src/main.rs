//! CLI binary for the natural-language database agent.

mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dbagent_db::{SqliteExecutor, SqlitePool, SqliteSchema, DEFAULT_DATABASE_URL};
use dbagent_llm::{model_name_from_env, CostTrackingMiddleware, LlmClient, LoggingMiddleware};
use dbagent_workflow::{
    DynStateStore, EngineConfig, FileStateStore, InMemoryStateStore, LlmReasoner, WorkflowEngine,
};

use crate::console::{new_thread_id, render_outcome, Console};

/// Snapshot directory for one-shot commands when `--state-dir` is not given.
const DEFAULT_STATE_DIR: &str = ".dbagent/state";

#[derive(Parser)]
#[command(name = "dbagent", version, about = "Ask a SQL database questions in plain language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    database_url: String,

    /// Model as `provider/model` or a bare catalog name (default: MODEL_NAME)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Persist conversation state as JSON files under this directory
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Timeout in seconds for each reasoning and execution call
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console (default)
    Chat,

    /// Run one request and print the outcome
    Ask {
        /// The request, in plain language
        query: String,

        /// Conversation thread (default: a new `thread_HHMMSS`)
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Answer a pending clarification on a thread
    Answer {
        /// The clarification
        answer: String,

        /// Conversation thread that asked for clarification
        #[arg(short, long)]
        thread: String,
    },

    /// Print the database schema as the agent sees it
    Schema,

    /// Create the sample tables and data
    Seed {
        /// Delete all rows before seeding
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let pool = dbagent_db::connect(&cli.database_url).await?;

    match cli.command {
        None | Some(Commands::Chat) => {
            println!("Initializing Database Agent...");
            let (engine, tokens) = build_engine(&cli, &pool, cli.state_dir.clone())?;
            println!("Agent initialized successfully!\n");
            Console::new(engine, Some(tokens)).run().await?;
        }
        Some(Commands::Ask { ref query, ref thread }) => {
            let (engine, _) = build_engine(&cli, &pool, Some(one_shot_state_dir(&cli)))?;
            let thread_id = thread.clone().unwrap_or_else(new_thread_id);
            let state = engine.run(query, &thread_id).await?;
            println!("Thread: {thread_id}\n");
            println!("{}", render_outcome(&state));
            if state.needs_clarification {
                println!("\nReply with: dbagent answer \"...\" --thread {thread_id}");
            }
        }
        Some(Commands::Answer {
            ref answer,
            ref thread,
        }) => {
            let (engine, _) = build_engine(&cli, &pool, Some(one_shot_state_dir(&cli)))?;
            let state = engine.resume(answer, thread).await?;
            println!("{}", render_outcome(&state));
        }
        Some(Commands::Schema) => {
            let text = dbagent_db::describe_database(&pool).await?;
            println!("DATABASE SCHEMA:\n\n{text}");
        }
        Some(Commands::Seed { reset }) => {
            if reset {
                dbagent_db::clear_all_data(&pool).await?;
                println!("All data cleared!");
            }
            let report = dbagent_db::create_sample_data(&pool).await?;
            println!("{report}");
        }
    }

    Ok(())
}

fn one_shot_state_dir(cli: &Cli) -> PathBuf {
    cli.state_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
}

fn build_engine(
    cli: &Cli,
    pool: &SqlitePool,
    state_dir: Option<PathBuf>,
) -> anyhow::Result<(WorkflowEngine, CostTrackingMiddleware)> {
    let tokens = CostTrackingMiddleware::new();
    let client = LlmClient::from_env()?
        .with_middleware(LoggingMiddleware)
        .with_middleware(tokens.clone());
    let model = cli.model.clone().unwrap_or_else(model_name_from_env);
    tracing::info!(model = %model, providers = ?client.provider_names(), "LLM client ready");

    let store: DynStateStore = match state_dir {
        Some(dir) => Arc::new(FileStateStore::new(dir)),
        None => Arc::new(InMemoryStateStore::new()),
    };

    let mut config = EngineConfig::default();
    if let Some(secs) = cli.timeout_secs {
        config = config
            .with_reasoning_timeout(Duration::from_secs(secs))
            .with_execution_timeout(Duration::from_secs(secs));
    }

    let engine = WorkflowEngine::new(
        store,
        Arc::new(LlmReasoner::new(Arc::new(client), model)),
        Arc::new(SqliteSchema::new(pool.clone())),
        Arc::new(SqliteExecutor::new(pool.clone())),
    )
    .with_config(config);
    Ok((engine, tokens))
}
