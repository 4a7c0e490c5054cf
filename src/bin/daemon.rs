//! memvault daemon
//!
//! Loads a vault, keeps the lifecycle ticker running and archives entities
//! as they age. Run with: memvault-daemon --vault-path ~/notes

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memvault::ai::create_ai_client;
use memvault::extraction::EntityExtractor;
use memvault::graph::InMemoryGraph;
use memvault::lifecycle::LifecycleConfig;
use memvault::storage::FsVault;
use memvault::vector::InMemoryVectorIndex;
use memvault::{AiConfig, Orchestrator, OrchestratorConfig};

#[derive(Parser, Debug)]
#[command(name = "memvault-daemon")]
#[command(about = "Memory lifecycle daemon for markdown vaults")]
#[command(version)]
struct Args {
    /// Vault root directory
    #[arg(long, env = "MEMVAULT_VAULT_PATH", default_value = "~/vault")]
    vault_path: String,

    /// Tenant namespace for vector records
    #[arg(long, env = "MEMVAULT_TENANT", default_value = "default")]
    tenant: String,

    /// Folder archived entities are moved into
    #[arg(long, env = "MEMVAULT_ARCHIVE_DIR", default_value = "08_Archive")]
    archive_dir: String,

    /// Lifecycle sweep interval in seconds (0 = disabled)
    #[arg(long, env = "MEMVAULT_TICK_SECS", default_value = "3600")]
    tick_secs: u64,

    /// Disable automatic lifecycle transitions
    #[arg(long, env = "MEMVAULT_NO_AUTO_TRANSITIONS")]
    no_auto_transitions: bool,

    /// AI backend (tfidf, openai)
    #[arg(long, env = "MEMVAULT_AI_MODEL", default_value = "tfidf")]
    ai_model: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_key: Option<String>,

    /// OpenAI-compatible base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    /// Embedding model name
    #[arg(long, env = "OPENAI_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Chat model used for entity extraction
    #[arg(long, env = "MEMVAULT_CHAT_MODEL")]
    chat_model: Option<String>,

    /// Embedding dimensions
    #[arg(long, env = "MEMVAULT_EMBEDDING_DIMENSIONS", default_value = "384")]
    dimensions: usize,

    /// Run the ingestion pipeline over every file at startup
    #[arg(long)]
    ingest: bool,

    /// Run a single lifecycle sweep and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MEMVAULT_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout stays free for piping events
    tracing_subscriber::registry()
        .with((!args.json_logs).then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
        }))
        .with(args.json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let vault_path = shellexpand::tilde(&args.vault_path).to_string();
    let vault = Arc::new(FsVault::new(&vault_path));

    let ai_config = AiConfig {
        model: args.ai_model.clone(),
        api_key: args.openai_key.clone(),
        base_url: args.openai_base_url.clone(),
        embedding_model: args.embedding_model.clone(),
        chat_model: args.chat_model.clone(),
        dimensions: args.dimensions,
    };
    let ai = create_ai_client(&ai_config).context("creating AI client")?;
    tracing::info!("AI backend: {} (local: {})", ai.model_name(), ai.is_local());

    let config = OrchestratorConfig {
        tenant: args.tenant.clone(),
        archive_dir: args.archive_dir.clone(),
        lifecycle: LifecycleConfig {
            enable_auto_transitions: !args.no_auto_transitions,
            tick_interval_secs: args.tick_secs,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut builder = Orchestrator::builder(vault.clone())
        .vault_root(vault.root_str())
        .config(config)
        .ai_client(ai.clone())
        .vector_index(Arc::new(InMemoryVectorIndex::new()))
        .knowledge_graph(Arc::new(InMemoryGraph::new()));
    if args.ai_model == "openai" {
        builder = builder.extractor(EntityExtractor::new(ai.clone()));
    }
    let mut orchestrator = builder.build();

    let scan = orchestrator
        .scan()
        .await
        .with_context(|| format!("scanning vault {}", vault_path))?;
    tracing::info!(
        "Vault {}: {} entities, {} unreadable",
        vault_path,
        scan.entities.len(),
        scan.errors.len()
    );

    if args.ingest {
        for entity in &scan.entities {
            // failures are logged by the pipeline
            let _ = orchestrator.ingest_file(&entity.vault_path).await;
        }
    }

    if args.once {
        let report = orchestrator.run_automatic_transitions().await?;
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "evaluated": report.evaluated,
            "transitioned": report.transitioned,
            "archived": report.archived.iter().map(|m| &m.to).collect::<Vec<_>>(),
            "failed": report.failed.len(),
        }))?);
        orchestrator.shutdown();
        return Ok(());
    }

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Cannot serialize event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event printer lagged, {} events skipped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    orchestrator.start()?;
    tracing::info!("memvault daemon {} running", memvault::VERSION);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
            result = orchestrator.process_next_event() => match result {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => tracing::error!("Lifecycle event failed: {}", e),
            }
        }
    }

    orchestrator.shutdown();
    Ok(())
}
