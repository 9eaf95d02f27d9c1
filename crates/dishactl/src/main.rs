//! Disha Control - CLI client for the Disha retrieval engine
//!
//! Interactive chat against the configured model and vector database,
//! plus config inspection.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use disha_core::aggregate::Aggregator;
use disha_core::config::{DishaConfig, CONFIG_PATH};
use disha_core::fusion::FusionEngine;
use disha_core::model::OpenAiChatModel;
use disha_core::orchestrator::{Fragment, Orchestrator, SYSTEM_INSTRUCTION};
use disha_core::planner::QueryPlanner;
use disha_core::resolver::ContentResolver;
use disha_core::schema::SchemaRegistry;
use disha_core::session::SessionStore;
use disha_core::vector::QdrantStore;

#[derive(Parser)]
#[command(name = "dishactl")]
#[command(about = "Disha - hybrid retrieval and conversational search", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Collections to search, comma-separated
        #[arg(long, default_value = "best_practices,policies,data")]
        collections: String,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DishaConfig::load(&cli.config);

    match cli.command {
        Commands::Chat { collections } => {
            let collections: Vec<String> = collections
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            chat(config, collections).await
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn build_orchestrator(config: &DishaConfig) -> Arc<Orchestrator> {
    let model = Arc::new(OpenAiChatModel::new(&config.model));
    let registry = Arc::new(SchemaRegistry::standard());
    let fusion = Arc::new(FusionEngine::new(
        Arc::new(QdrantStore::new(&config.vector)),
        registry.clone(),
        config.retrieval.rrf_k,
    ));

    Arc::new(Orchestrator::new(
        model.clone(),
        Aggregator::new(
            QueryPlanner::new(model),
            fusion.clone(),
            registry.clone(),
            &config.retrieval,
        ),
        ContentResolver::new(fusion, registry, config.retrieval.content_limit),
        SessionStore::new(config.retrieval.max_sessions, SYSTEM_INSTRUCTION),
    ))
}

async fn chat(config: DishaConfig, collections: Vec<String>) -> Result<()> {
    let orchestrator = build_orchestrator(&config);
    let mut session = orchestrator.create_session();

    println!(
        "{} session started {} (collections: {})",
        "disha".bold().cyan(),
        Local::now().format("%Y-%m-%d %H:%M"),
        collections.join(", ")
    );
    println!("Type a question, {} for a fresh session, {} to leave.", "/new".bold(), "/quit".bold());

    let stdin = std::io::stdin();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                orchestrator.dispose_session(&session);
                session = orchestrator.create_session();
                println!("{}", "Started a new session.".dimmed());
                continue;
            }
            _ => {}
        }

        let mut stream = match orchestrator.process_turn(&session, line, &collections) {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                continue;
            }
        };

        while let Some(fragment) = stream.next().await {
            if let Fragment::Text(text) = fragment {
                print!("{}", text);
                std::io::stdout().flush()?;
            }
        }
        println!();
    }

    Ok(())
}
