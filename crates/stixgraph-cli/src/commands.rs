//! CLI command definitions and handlers

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use stixgraph_engine::{
    embed_graph, search, BundleLoader, LoadOptions, OllamaEmbedder, DEFAULT_EMBED_MODEL,
    DEFAULT_OLLAMA_URL,
};
use stixgraph_store::{GraphStore, StoreConfig, DEFAULT_STORE_URI};
use tracing::error;

/// Main CLI structure
#[derive(Parser)]
#[command(name = "stixgraph")]
#[command(about = "Load MITRE ATT&CK STIX bundles into a property graph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Graph store connection, from flags or the environment
#[derive(Args, Clone)]
pub struct StoreArgs {
    /// Store URI: sqlite://path, or memory:// for a graph that lives only as long as the command
    #[arg(long = "db-uri", env = "DB_URI", default_value = DEFAULT_STORE_URI, global = true)]
    pub uri: String,

    /// Graph name inside the store
    #[arg(long = "db-name", env = "DB_NAME", global = true)]
    pub database: Option<String>,

    #[arg(long = "db-username", env = "DB_USERNAME", global = true)]
    pub username: Option<String>,

    #[arg(long = "db-password", env = "DB_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,
}

impl StoreArgs {
    pub fn config(&self) -> StoreConfig {
        StoreConfig {
            uri: self.uri.clone(),
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load one or more STIX bundles, in order
    Load {
        /// Bundle file(s)
        #[arg(short, long = "file", required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Abort on dangling references and invalid objects
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Embed every node that has a name and description
    Embed {
        #[arg(long, default_value = DEFAULT_EMBED_MODEL)]
        model: String,

        #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
        ollama_url: String,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Find the nodes closest to a query
    Search {
        /// Query text
        #[arg(short, long)]
        query: String,

        /// Number of hits
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        #[arg(long, default_value = DEFAULT_EMBED_MODEL)]
        model: String,

        #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
        ollama_url: String,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show graph statistics
    Stats {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show system information
    Info,
}

/// Output format options
#[derive(Clone, Debug, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    fn render<T: serde::Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<String> {
        Ok(match self {
            OutputFormat::Text => text(),
            OutputFormat::Json => serde_json::to_string(value)?,
            OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
        })
    }
}

/// Command execution result
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Execute CLI commands against one store
pub struct CommandExecutor {
    config: StoreConfig,
    store: Arc<dyn GraphStore>,
}

impl CommandExecutor {
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let store = config.open().await?;
        Ok(Self { config, store })
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: Commands) -> Result<CommandResult> {
        match command {
            Commands::Load { files, strict, format } => self.execute_load(files, strict, format).await,
            Commands::Embed { model, ollama_url, format } => {
                self.execute_embed(model, ollama_url, format).await
            }
            Commands::Search { query, top_k, model, ollama_url, format } => {
                self.execute_search(query, top_k, model, ollama_url, format).await
            }
            Commands::Stats { format } => self.execute_stats(format).await,
            Commands::Info => self.execute_info(),
        }
    }

    async fn execute_load(&self, files: Vec<PathBuf>, strict: bool, format: OutputFormat) -> Result<CommandResult> {
        let options = if strict { LoadOptions::strict() } else { LoadOptions::default() };
        let loader = BundleLoader::new(options);

        let mut results = Vec::new();
        let mut texts = Vec::new();
        let mut failed = 0;

        for file in &files {
            match loader.load_path(self.store(), file).await {
                Ok(report) => {
                    texts.push(report.to_string());
                    results.push(json!({ "file": file.display().to_string(), "report": report }));
                }
                Err(e) => {
                    error!("Load of {} aborted: {}", file.display(), e);
                    failed += 1;
                    texts.push(format!("Load of {} aborted: {}", file.display(), e));
                    results.push(json!({ "file": file.display().to_string(), "error": e.to_string() }));
                }
            }
        }

        let data = json!({ "loads": results });
        println!("{}", format.render(&data, || texts.join("\n"))?);

        Ok(CommandResult {
            success: failed == 0,
            message: format!("Loaded {} of {} bundles", files.len() - failed, files.len()),
            data: Some(data),
        })
    }

    async fn execute_embed(&self, model: String, ollama_url: String, format: OutputFormat) -> Result<CommandResult> {
        let embedder = OllamaEmbedder::new(ollama_url, model)?;
        let report = embed_graph(self.store(), &embedder).await?;

        let output = format.render(&report, || {
            let mut text = format!(
                "Embedded {} nodes with {} ({} failed)",
                report.embedded,
                report.model,
                report.failed.len()
            );
            for (id, reason) in &report.failed {
                text.push_str(&format!("\n  - {}: {}", id, reason));
            }
            text
        })?;
        println!("{}", output);

        Ok(CommandResult {
            success: true,
            message: format!("Embedded {} nodes", report.embedded),
            data: Some(serde_json::to_value(&report)?),
        })
    }

    async fn execute_search(
        &self,
        query: String,
        top_k: usize,
        model: String,
        ollama_url: String,
        format: OutputFormat,
    ) -> Result<CommandResult> {
        let embedder = OllamaEmbedder::new(ollama_url, model)?;
        let hits = search(self.store(), &embedder, &query, top_k).await?;

        let output = format.render(&hits, || {
            let mut text = format!("Found {} nodes for {:?}:", hits.len(), query);
            for (i, hit) in hits.iter().enumerate() {
                text.push_str(&format!(
                    "\n{}. {:.4} {} ({}) [{}]",
                    i + 1,
                    hit.score,
                    hit.name.as_deref().unwrap_or("<unnamed>"),
                    hit.id,
                    hit.labels.join(", ")
                ));
            }
            text
        })?;
        println!("{}", output);

        Ok(CommandResult {
            success: true,
            message: format!("Found {} nodes", hits.len()),
            data: Some(json!({ "hits": hits })),
        })
    }

    async fn execute_stats(&self, format: OutputFormat) -> Result<CommandResult> {
        let stats = self.store.session().await?.statistics().await?;

        let output = format.render(&stats, || {
            let mut text = format!(
                "Graph {} ({})\n  nodes: {}\n  edges: {} ({} derived)\n  embeddings: {}",
                self.config.graph(),
                self.store.backend_name(),
                stats.nodes,
                stats.edges,
                stats.derived_edges,
                stats.embeddings
            );
            for (label, count) in &stats.labels {
                text.push_str(&format!("\n  :{} {}", label, count));
            }
            for (rel_type, count) in &stats.relationship_types {
                text.push_str(&format!("\n  -[{}]-> {}", rel_type, count));
            }
            text
        })?;
        println!("{}", output);

        Ok(CommandResult {
            success: true,
            message: "Graph statistics".to_string(),
            data: Some(serde_json::to_value(&stats)?),
        })
    }

    fn execute_info(&self) -> Result<CommandResult> {
        let info = json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "repository": env!("CARGO_PKG_REPOSITORY"),
            "backend": self.store.backend_name(),
            "graph": self.config.graph(),
            "store_uris": ["memory://", "sqlite://<path>"],
            "embedding_model": DEFAULT_EMBED_MODEL
        });

        let result = serde_json::to_string_pretty(&info)?;
        println!("{}", result);

        Ok(CommandResult {
            success: true,
            message: "System information".to_string(),
            data: Some(info),
        })
    }
}
