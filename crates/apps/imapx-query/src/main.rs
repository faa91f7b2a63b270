//! imapx-query - inspect folder search expressions offline
//!
//! # Usage
//!
//! ```bash
//! # Show how each leaf of an expression is resolved
//! imapx-query translate '(and (header-contains "Subject" "urgent") (body-contains "invoice"))'
//!
//! # Evaluate an expression against a saved folder summary
//! imapx-query search inbox.json '(header-contains "From" "alice")' --folder INBOX
//!
//! # Print the effective store settings, or those of a given file
//! imapx-query settings
//! imapx-query settings --file ./store-settings.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imapx::search::{Scope, Translation, translate_leaf};
use imapx::{
    EvaluationMode, Evaluator, Expression, FileMessageCache, LocalMatcher, MessageCache,
    StoreSettings, SummaryRecord,
};
use log::{error, info};

#[derive(Parser)]
#[command(name = "imapx-query")]
#[command(about = "Translate and evaluate IMAP folder search expressions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the IMAP SEARCH criteria for every leaf of an expression
    Translate {
        /// Search expression, e.g. '(body-contains "invoice")'
        expression: String,
    },
    /// Evaluate an expression locally against a JSON folder summary
    Search {
        /// Summary file (uidvalidity, messages)
        summary: PathBuf,
        /// Search expression
        expression: String,
        /// Folder path used to find cached message sources
        #[arg(short, long, default_value = "INBOX")]
        folder: String,
        /// Message cache directory; defaults to the imapx data directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Only use summary headers, ignore cached messages
        #[arg(long)]
        summary_only: bool,
    },
    /// Print the effective store settings as JSON
    Settings {
        /// Read settings from this file instead of the config directory
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Translate { expression } => translate(&expression),
        Commands::Search {
            summary,
            expression,
            folder,
            cache_dir,
            summary_only,
        } => search(&summary, &expression, &folder, cache_dir, summary_only),
        Commands::Settings { file } => settings(file.as_deref()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn translate(expression: &str) -> Result<()> {
    let expr = Expression::parse(expression)?;
    let mut leaves = Vec::new();
    collect_leaves(&expr, &mut leaves);

    if leaves.is_empty() {
        println!("{} has no header or body tests", expr);
        return Ok(());
    }

    for leaf in leaves {
        let local = !matches!(
            translate_leaf(leaf, EvaluationMode::Probe, Scope::Folder, false),
            Some(Translation::Infeasible)
        );
        let remote = match translate_leaf(leaf, EvaluationMode::Remote, Scope::Folder, false) {
            Some(Translation::Remote(criteria)) => criteria.render(),
            Some(Translation::MatchAll) => "(matches all, no search)".to_string(),
            Some(Translation::MatchNone) => "(matches none, no search)".to_string(),
            Some(other) => format!("{:?}", other),
            None => continue,
        };
        println!("{}", leaf);
        println!("  local:  {}", if local { "yes" } else { "no" });
        println!("  remote: {}", remote);
    }

    Ok(())
}

fn collect_leaves<'a>(expr: &'a Expression, leaves: &mut Vec<&'a Expression>) {
    if expr.is_leaf() {
        leaves.push(expr);
        return;
    }
    match expr {
        Expression::And(items) | Expression::Or(items) => {
            for item in items {
                collect_leaves(item, leaves);
            }
        }
        Expression::Not(inner) | Expression::MatchAll(Some(inner)) => {
            collect_leaves(inner, leaves)
        }
        _ => {}
    }
}

fn search(
    summary_path: &Path,
    expression: &str,
    folder: &str,
    cache_dir: Option<PathBuf>,
    summary_only: bool,
) -> Result<()> {
    let expr = Expression::parse(expression)?;
    let json = std::fs::read_to_string(summary_path)
        .with_context(|| format!("Failed to read summary from {:?}", summary_path))?;
    let record: SummaryRecord =
        serde_json::from_str(&json).context("Failed to parse summary JSON")?;

    let cache: Option<Box<dyn MessageCache>> = if summary_only {
        None
    } else {
        let dir = match cache_dir {
            Some(dir) => dir,
            None => config::data_dir()
                .context("Could not determine data directory")?
                .join("messages"),
        };
        Some(Box::new(FileMessageCache::new(dir)?))
    };

    let matcher = LocalMatcher::new(cache.as_deref(), folder);
    let evaluator = Evaluator::new(&record.messages, matcher, None);
    let uids = evaluator.search(&expr)?;

    info!(
        "{} of {} messages match in {}",
        uids.len(),
        record.messages.len(),
        folder
    );
    for uid in uids {
        println!("{}", uid);
    }
    Ok(())
}

fn settings(file: Option<&Path>) -> Result<()> {
    let settings = match file {
        Some(path) => StoreSettings::from_file(path)?,
        None => StoreSettings::load()?,
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    if let Some(path) = file.map(Path::to_path_buf).or_else(StoreSettings::default_settings_path) {
        info!("Settings file: {}", path.display());
    }
    Ok(())
}
