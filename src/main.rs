//! # Notebook RAG CLI (`nbrag`)
//!
//! ## Usage
//!
//! ```bash
//! nbrag --config ./config/nbrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nbrag ask "<query>"` | Search with a backend summary and print citations |
//! | `nbrag slides "<query>"` | Generate a Marp slide outline from search results |
//! | `nbrag diagram "<query>"` | Generate a Mermaid diagram from search results |
//! | `nbrag metadata` | Write JSONL import metadata for a bucket |
//! | `nbrag notebook create\|add-sources\|ask` | Manage and query notebooks |
//! | `nbrag serve mcp` | Run the MCP tool server on stdio |
//!
//! Settings come from the config file (optional) and environment
//! variables; see [`notebook_rag::config`].

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use notebook_rag::config::{self, Config};
use notebook_rag::generate::{ContentGenerator, GeminiGenerator, DEFAULT_CHART_TYPE};
use notebook_rag::http::GoogleClient;
use notebook_rag::metadata;
use notebook_rag::models::SearchResult;
use notebook_rag::notebook_client::DiscoveryNotebookRepository;
use notebook_rag::notebook_service::{
    AddSourcesRequest, AskRequest, CreateNotebookRequest, NotebookService,
};
use notebook_rag::search::{DiscoverySearchBackend, SearchGateway};
use notebook_rag::server;

const SUMMARY_PREVIEW_CHARS: usize = 500;
const OUTPUT_PREVIEW_CHARS: usize = 1000;

/// Search internal documents and turn the results into answers, slides and
/// diagrams.
#[derive(Parser)]
#[command(
    name = "nbrag",
    about = "Document search and grounded generation over Discovery Engine and Gemini",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; environment variables
    /// override its values.
    #[arg(long, global = true, default_value = "./config/nbrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search with a backend-generated summary and print its citations.
    Ask {
        query: String,
    },

    /// Generate a Marp slide outline from a summarized search.
    Slides {
        query: String,

        #[arg(short, long, default_value = "output_slides.md")]
        output: PathBuf,

        /// Gemini model (defaults to GEMINI_MODEL / [generation].model).
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate Mermaid diagram code from a summarized search.
    Diagram {
        query: String,

        #[arg(short, long, default_value = "output_diagram.md")]
        output: PathBuf,

        /// Diagram kind: flowchart, sequence, mindmap, classDiagram,
        /// stateDiagram, erDiagram, gantt.
        #[arg(short = 't', long = "type", default_value = DEFAULT_CHART_TYPE)]
        chart_type: String,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Write JSONL import metadata for the documents in a bucket.
    Metadata {
        /// Bucket name (defaults to GCS_BUCKET_NAME / [storage].bucket).
        #[arg(short, long)]
        bucket: Option<String>,

        #[arg(short, long, default_value = "metadata.jsonl")]
        output: PathBuf,

        /// Only scan objects under this prefix.
        #[arg(short, long, default_value = "")]
        prefix: String,
    },

    /// Create notebooks, import sources and ask questions.
    Notebook {
        #[command(subcommand)]
        action: NotebookAction,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum NotebookAction {
    Create {
        notebook_id: String,
        display_name: String,
    },
    /// Import Cloud Storage URIs and wait for the import to finish.
    AddSources {
        notebook_id: String,
        #[arg(required = true)]
        uris: Vec<String>,
    },
    Ask {
        notebook_id: String,
        query: String,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// MCP over stdio.
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ask { query } => {
            let client = GoogleClient::from_config(&cfg)?;
            let result = summarize(&client, &cfg, &query).await?;
            println!("Answer:");
            if result.summary.is_empty() {
                println!("(no answer)");
            } else {
                println!("{}", result.summary);
            }
            println!();
            println!("Citations:");
            if result.citations.is_empty() {
                println!("  (none)");
            }
            for (i, c) in result.citations.iter().enumerate() {
                println!("  {}. {}", i + 1, c.title);
                println!("     URL: {}", c.url);
            }
        }
        Commands::Slides {
            query,
            output,
            model,
        } => {
            let cfg = with_model(cfg, model);
            let client = GoogleClient::from_config(&cfg)?;
            let source = summary_source(&client, &cfg, &query, "slide").await?;

            println!("Generating slides with {}...", cfg.generation.model);
            let generator = ContentGenerator::new(GeminiGenerator::from_config(client, &cfg)?);
            let markdown = generator.generate_slide_markdown(&source).await?;
            write_output(&output, &markdown)?;
        }
        Commands::Diagram {
            query,
            output,
            chart_type,
            model,
        } => {
            let cfg = with_model(cfg, model);
            let client = GoogleClient::from_config(&cfg)?;
            let source = summary_source(&client, &cfg, &query, "diagram").await?;

            println!(
                "Generating {} diagram with {}...",
                chart_type, cfg.generation.model
            );
            let generator = ContentGenerator::new(GeminiGenerator::from_config(client, &cfg)?);
            let code = generator
                .generate_infographic_code(&source, &chart_type)
                .await?;
            write_output(&output, &code)?;
        }
        Commands::Metadata {
            bucket,
            output,
            prefix,
        } => {
            metadata::run_metadata(&cfg, bucket.as_deref(), &output, &prefix).await?;
        }
        Commands::Notebook { action } => {
            let repo = DiscoveryNotebookRepository::from_config(GoogleClient::from_config(&cfg)?, &cfg)?;
            let service = NotebookService::new(repo);
            match action {
                NotebookAction::Create {
                    notebook_id,
                    display_name,
                } => {
                    let resp = service
                        .create_notebook(CreateNotebookRequest {
                            notebook_id,
                            display_name,
                        })
                        .await?;
                    println!("Created notebook {} ({})", resp.notebook_id, resp.display_name);
                }
                NotebookAction::AddSources { notebook_id, uris } => {
                    let count = uris.len();
                    service
                        .add_sources(AddSourcesRequest {
                            notebook_id: notebook_id.clone(),
                            source_uris: uris,
                        })
                        .await?;
                    println!("Imported {} sources into {}", count, notebook_id);
                }
                NotebookAction::Ask { notebook_id, query } => {
                    let resp = service.ask(AskRequest { notebook_id, query }).await?;
                    println!("{}", resp.answer_text);
                    if !resp.citations.is_empty() {
                        println!();
                        println!("Citations:");
                        for (i, c) in resp.citations.iter().enumerate() {
                            println!("  {}. {}", i + 1, c.source_title);
                            if !c.content.is_empty() {
                                println!("     {}", preview(&c.content, 200));
                            }
                        }
                    }
                }
            }
        }
        Commands::Serve { service } => match service {
            ServeService::Mcp => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}

fn with_model(mut cfg: Config, model: Option<String>) -> Config {
    if let Some(model) = model {
        cfg.generation.model = model;
    }
    cfg
}

async fn summarize(client: &GoogleClient, cfg: &Config, query: &str) -> anyhow::Result<SearchResult> {
    let backend = DiscoverySearchBackend::from_config(client.clone(), cfg)?;
    let gateway = SearchGateway::new(backend, cfg.search.language_code.clone());
    Ok(gateway.search_and_answer(query).await?)
}

/// Run a summarized search and render it as generation input. Fails when
/// the backend produced no summary.
async fn summary_source(
    client: &GoogleClient,
    cfg: &Config,
    query: &str,
    what: &str,
) -> anyhow::Result<String> {
    println!("Searching: {}", query);
    let result = summarize(client, cfg, query).await?;
    if result.summary.is_empty() {
        bail!("search returned no summary; skipping {} generation", what);
    }

    println!();
    println!("Summary:");
    println!("{}", preview(&result.summary, SUMMARY_PREVIEW_CHARS));
    println!();

    Ok(source_text(&result))
}

fn source_text(result: &SearchResult) -> String {
    let mut text = format!("【要約】\n{}\n\n【参照ドキュメント】\n", result.summary);
    for (i, c) in result.citations.iter().enumerate() {
        text.push_str(&format!("{}. {}\n   URL: {}\n", i + 1, c.title, c.url));
    }
    text
}

fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    std::fs::write(path, content)?;
    println!("Wrote {}", path.display());
    println!();
    println!("{}", preview(content, OUTPUT_PREVIEW_CHARS));
    Ok(())
}

/// First `max` characters, with a marker when truncated.
fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max).collect();
    format!("{}\n...(truncated)", head)
}
