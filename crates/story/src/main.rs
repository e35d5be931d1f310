use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use notitap_core::{Editor, PluginRegistry, default_items, extract_toc, fuzzy, serialize_pretty};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Inspect stored notitap documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the table of contents of a stored document
    Toc {
        file: PathBuf,

        /// Print the items as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load a document through the editor and print the normalized result
    Normalize { file: PathBuf },
    /// Rank the slash menu items for a query
    Palette { query: String },
    /// List the editor commands, optionally ranked against a query
    Commands {
        #[arg(default_value = "")]
        query: String,

        /// Also print descriptions and argument examples
        #[arg(long, short)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Toc { file, json } => {
            let editor = load(&file)?;
            let items = extract_toc(editor.doc());
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }
            for item in items {
                let indent = "  ".repeat(usize::from(item.level.saturating_sub(1)));
                println!("{indent}{} (#{})", item.text, item.id);
            }
        }
        Commands::Normalize { file } => {
            let editor = load(&file)?;
            println!("{}", serialize_pretty(editor.doc())?);
        }
        Commands::Palette { query } => {
            let items = default_items();
            for item in fuzzy::filter(&query, &items, |item| item.title.as_str()) {
                match &item.shortcut {
                    Some(shortcut) => println!("{:<16}{shortcut}", item.title),
                    None => println!("{}", item.title),
                }
            }
        }
        Commands::Commands { query, verbose } => {
            let registry = PluginRegistry::notitap();
            for cmd in registry.search_commands(&query) {
                println!("{:<24}{}", cmd.id, cmd.label);
                if !verbose {
                    continue;
                }
                if let Some(description) = &cmd.description {
                    println!("    {description}");
                }
                if !cmd.keywords.is_empty() {
                    println!("    keywords: {}", cmd.keywords.join(", "));
                }
                if let Some(args) = &cmd.args_example {
                    println!("    args: {}", serde_json::to_string(args)?);
                }
            }
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<Editor> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = json.len(), "loading document");
    Ok(Editor::from_json(&json, PluginRegistry::notitap()))
}
