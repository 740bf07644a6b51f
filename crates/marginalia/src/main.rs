// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Marginalia - a reading-notes chat assistant.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use marginalia_config::MarginaliaConfig;
use marginalia_tools::{Analyzer, ToolCatalog};

/// Marginalia - a reading-notes chat assistant.
#[derive(Parser, Debug)]
#[command(name = "marginalia", version, about, long_about = None)]
struct Cli {
    /// Load this TOML file instead of the standard search path.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway.
    Serve,
    /// Print the tool catalog as JSON.
    Tools,
    /// Show the keywords and tool calls chosen for a question.
    Analyze {
        /// The question to analyze.
        question: String,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => marginalia_config::load_and_validate_path(path),
        None => marginalia_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            marginalia_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    serve::init_tracing(&config.logging.level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await.map_err(|e| e.to_string()),
        Some(Commands::Tools) => print_json(&ToolCatalog::new().to_json()),
        Some(Commands::Analyze { question }) => analyze(&config, &question),
        Some(Commands::Config) => print_config(config),
        None => {
            println!("marginalia: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn analyze(config: &MarginaliaConfig, question: &str) -> Result<(), String> {
    let analyzer = Analyzer::from_config(&config.tools).map_err(|e| e.to_string())?;
    let keywords = analyzer.extract_keywords(question);
    print_json(&serde_json::json!({
        "keywords": keywords.terms,
        "hasQuotedTitle": keywords.has_quoted_title,
        "toolCalls": analyzer.analyze(question),
    }))
}

/// Effective configuration with the completion API key masked.
fn redacted(mut config: MarginaliaConfig) -> MarginaliaConfig {
    if config.completion.api_key.is_some() {
        config.completion.api_key = Some("[redacted]".to_string());
    }
    config
}

fn print_config(config: MarginaliaConfig) -> Result<(), String> {
    let text = toml::to_string_pretty(&redacted(config)).map_err(|e| e.to_string())?;
    print!("{text}");
    Ok(())
}
