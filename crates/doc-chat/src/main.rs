//! # doc-chat CLI (`docchat`)
//!
//! The `docchat` binary drives the document-chat backend: database
//! initialization, document ingestion, one-off chat turns, and the HTTP
//! API server.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and run schema migrations |
//! | `docchat ingest <file>` | Extract, chunk, embed, and index a document |
//! | `docchat documents` | List ingested documents |
//! | `docchat chat "<question>"` | Run a single chat turn from the terminal |
//! | `docchat serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! docchat init
//! docchat ingest ./reports/q3.pdf
//! docchat chat "What were the total expenses in Q3?"
//! docchat chat "And compared to Q2?" --conversation <id>
//! docchat serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doc_chat::config::{self, Config};
use doc_chat::db;
use doc_chat::ingest::IngestPipeline;
use doc_chat::migrate;
use doc_chat::openai::OpenAiGateway;
use doc_chat::server;
use doc_chat::sqlite_store::{
    SqliteConversationStore, SqliteDocumentStore, SqliteMessageStore,
};
use doc_chat::vector_index::SqliteVectorIndex;
use doc_chat_core::chat::ChatEngine;
use doc_chat_core::gateway::{AnswerGateway, EmbeddingGateway, QueryExpander};
use doc_chat_core::store::{ConversationStore, DocumentStore, MessageStore};

/// doc-chat — a retrieval-augmented document chat backend.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "doc-chat — upload documents, ask questions, get cited answers",
    version,
    long_about = "doc-chat ingests documents (PDF, CSV, XLSX, plain text), indexes their \
    content as embedded chunks, and answers natural-language questions over them through \
    an OpenAI-compatible model, with conversation history and source citations."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Safe to
    /// run repeatedly.
    Init,

    /// Ingest a document into the index.
    ///
    /// Extracts text (one chunk per row for CSV/XLSX), embeds every
    /// chunk, and stores them for retrieval. Requires `OPENAI_API_KEY`.
    Ingest {
        /// Path to the document (pdf, txt, csv, xlsx, xls).
        file: PathBuf,

        /// Mark the document as temporary.
        #[arg(long)]
        temporary: bool,
    },

    /// List ingested documents.
    Documents,

    /// Run a single chat turn and print the answer with its sources.
    Chat {
        /// The question to ask.
        query: String,

        /// Continue an existing conversation instead of starting a new one.
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => cmd_init(&config).await,
        Commands::Ingest { file, temporary } => cmd_ingest(&config, &file, temporary).await,
        Commands::Documents => cmd_documents(&config).await,
        Commands::Chat {
            query,
            conversation,
        } => cmd_chat(&config, &query, conversation.as_deref()).await,
        Commands::Serve => server::run_server(&config).await,
    }
}

async fn cmd_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

async fn cmd_ingest(config: &Config, file: &PathBuf, temporary: bool) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let filename = file
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("invalid file path: {}", file.display()))?
        .to_string();
    let file_type = file
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let bytes = std::fs::read(file)?;

    let gateway = Arc::new(OpenAiGateway::new(config.llm.clone())?);
    let pipeline = IngestPipeline::new(
        gateway,
        Arc::new(SqliteVectorIndex::new(pool.clone())),
        Arc::new(SqliteDocumentStore::new(pool)),
        config.chunking.clone(),
    );

    let document = pipeline
        .ingest(&filename, &file_type, &bytes, temporary)
        .await?;
    println!(
        "Ingested {} ({} chunks, id {})",
        document.filename,
        document.chunk_count,
        document.id.unwrap_or_default()
    );
    Ok(())
}

async fn cmd_documents(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let store = SqliteDocumentStore::new(pool);
    let documents = store.list_all().await?;
    if documents.is_empty() {
        println!("No documents ingested.");
        return Ok(());
    }
    for doc in documents {
        println!(
            "{}  {:5} chunks  {}  {}{}",
            doc.id.unwrap_or_default(),
            doc.chunk_count,
            doc.upload_date.format("%Y-%m-%d %H:%M"),
            doc.filename,
            if doc.is_temporary { "  (temporary)" } else { "" }
        );
    }
    Ok(())
}

async fn cmd_chat(config: &Config, query: &str, conversation: Option<&str>) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let conversations: Arc<dyn ConversationStore> =
        Arc::new(SqliteConversationStore::new(pool.clone()));
    let messages: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(pool.clone()));
    let gateway = Arc::new(OpenAiGateway::new(config.llm.clone())?);
    let embeddings: Arc<dyn EmbeddingGateway> = gateway.clone();
    let answers: Arc<dyn AnswerGateway> = gateway.clone();

    let mut engine = ChatEngine::new(
        embeddings,
        answers,
        Arc::new(SqliteVectorIndex::new(pool)),
        conversations,
        messages,
        config.chat_config(),
    );
    if config.llm.expand_queries {
        let expander: Arc<dyn QueryExpander> = gateway;
        engine = engine.with_expander(expander);
    }

    let turn = engine.execute(query, conversation).await?;

    println!("{}", turn.message.content);
    if let Some(sources) = &turn.message.sources {
        println!();
        println!("Sources:");
        for source in sources {
            match source.relevance_score {
                Some(score) => println!(
                    "  {} [chunk {}] (score {:.2})",
                    source.filename, source.chunk_index, score
                ),
                None => println!("  {} [chunk {}]", source.filename, source.chunk_index),
            }
        }
    }
    println!();
    println!("conversation: {}", turn.conversation_id);
    Ok(())
}
