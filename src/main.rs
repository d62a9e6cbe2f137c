//! Abridge CLI - Abstractive summarisation of text and PDF documents
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use abridge::{
    document, init_logging, ui, ChunkSummary, Config, HubLoader, ModelName, PagedDocument,
    PdfDocument, Session, SummaryOutcome,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "abridge")]
#[command(author, version, about = "Summarise text and PDF documents with pretrained BART models", long_about = None)]
struct Cli {
    /// Model to use instead of the configured default
    #[arg(long, short, global = true, value_enum)]
    model: Option<ModelName>,
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a piece of text (stdin or $EDITOR when omitted)
    Text {
        /// Text to summarise
        text: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarise a PDF document chunk by chunk
    Document {
        /// Path to the PDF file
        path: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Show extracted text instead of summaries
        #[arg(long)]
        raw: bool,
    },
    /// List the available models
    Models {
        /// Choose a model interactively
        #[arg(long)]
        pick: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// JSON output of the `document` command
#[derive(Serialize)]
struct DocumentReport {
    source: String,
    model: ModelName,
    pages: usize,
    chunks: Vec<ChunkSummary>,
    generated_at: DateTime<Utc>,
}

/// JSON output of the `text` command
#[derive(Serialize)]
struct TextReport {
    model: ModelName,
    outcome: SummaryOutcome,
    generated_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The TUI owns the terminal, so console logging is only enabled for subcommands
    if cli.command.is_some() {
        init_logging(cli.verbose);
    }

    let config = Config::load()?;
    let model = match cli.model {
        Some(model) => model,
        None => config.default_model()?,
    };

    match cli.command {
        Some(Commands::Text { text, json }) => {
            let text = match text {
                Some(text) => text,
                None => read_input()?,
            };

            let session = open_session(&config, model).await?;
            let outcome = session.summarize_text(&text)?;

            if json {
                let report = TextReport {
                    model,
                    outcome,
                    generated_at: Utc::now(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", "Generated Summary:".bold());
                print_outcome(&outcome);
            }
        }
        Some(Commands::Document { path, json, raw }) => {
            let doc = PdfDocument::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;

            if raw {
                let text = document::extract_text(&doc)?;
                println!("\n=== {} ===\n", doc.name());
                println!("{}", text);
                println!(
                    "\n--- Extracted {} characters from {} pages ---",
                    text.len(),
                    doc.page_count()
                );
                return Ok(());
            }

            let session = open_session(&config, model).await?;

            if json {
                let mut chunks = Vec::new();
                session.summarize_document(&doc, |chunk| chunks.push(chunk))?;
                let report = DocumentReport {
                    source: doc.name().to_string(),
                    model,
                    pages: doc.page_count(),
                    chunks,
                    generated_at: Utc::now(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} {}:\n", "Generated Summary for".bold(), doc.name());
                let count = session.summarize_document(&doc, |chunk| {
                    print!("{} ", format!("[{}]", chunk.index + 1).cyan());
                    print_outcome(&chunk.outcome);
                    println!();
                })?;
                if count == 0 {
                    println!("{}", "No text found in document.".yellow());
                }
            }
        }
        Some(Commands::Models { pick }) => {
            let default = config.default_model()?;

            if pick {
                let names: Vec<&str> = ModelName::ALL.iter().map(|m| m.as_str()).collect();
                let start = ModelName::ALL.iter().position(|m| *m == model).unwrap_or(0);
                let choice = dialoguer::Select::new()
                    .with_prompt("Select Model")
                    .items(&names)
                    .default(start)
                    .interact()?;
                println!("{}", names[choice]);
                eprintln!(
                    "Set it as default with:\n\n[model]\ndefault = \"{}\"\n\nin abridge.toml",
                    names[choice]
                );
            } else {
                for name in ModelName::ALL {
                    if name == default {
                        println!("{} {} {}", "*".green(), name, "(default)".dimmed());
                    } else {
                        println!("  {}", name);
                    }
                }
            }
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "abridge", &mut std::io::stdout());
        }
        None => {
            // Default: Launch the TUI
            ui::run(&config, model).await?;
        }
    }

    Ok(())
}

async fn open_session(config: &Config, model: ModelName) -> anyhow::Result<Session> {
    eprintln!("{}", format!("Using the {} model", model).dimmed());
    let loader = HubLoader::new(config);
    let session = Session::open(Box::new(loader), model, config.chunking.mode)
        .await
        .with_context(|| format!("failed to load {}", model))?;
    Ok(session)
}

/// Read text from a pipe, or let the user compose it in their editor
fn read_input() -> anyhow::Result<String> {
    if atty::is(atty::Stream::Stdin) {
        let text = edit::edit("").context("failed to open editor")?;
        Ok(text)
    } else {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    }
}

fn print_outcome(outcome: &SummaryOutcome) {
    match outcome {
        SummaryOutcome::Summary(text) => println!("{}", text),
        SummaryOutcome::Rejected => println!("{}", outcome.text().yellow()),
    }
}
