//! # Azure Search sync CLI (`azs`)
//!
//! The `azs` binary is the administrative interface for the connector. It
//! provides commands for checking service health, managing the index
//! lifecycle, and running ad-hoc searches against the configured index.
//!
//! ## Usage
//!
//! ```bash
//! azs --config ./config/azs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `azs status` | Check endpoint reachability, index existence, and file indexing |
//! | `azs create-index` | Create the index with the full field schema if missing |
//! | `azs delete-index` | Delete the index and recreate it empty |
//! | `azs delete-area <areaid>` | Delete every indexed record in one search area |
//! | `azs search "<query>"` | Run a search and print the results |

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use azsearch_sync::config::{self, Config};
use azsearch_sync::engine::SearchEngine;
use azsearch_sync::query::{ContextScope, SearchFilters, SortOrder};
use azsearch_sync::results::{AccessChecker, AccessDecision};
use azsearch_sync::transport::HttpTransport;

/// Azure Search sync connector CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with the service endpoint, index name, and API key.
#[derive(Parser)]
#[command(
    name = "azs",
    about = "Azure Search sync connector — index management and search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/azs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Check service health.
    ///
    /// Reports endpoint reachability, whether the configured index exists,
    /// and whether file indexing (Tika) is available.
    Status,

    /// Create the index if it does not exist.
    ///
    /// Uses the full field schema. This command is idempotent; an existing
    /// index is left untouched.
    CreateIndex,

    /// Delete the index and recreate it empty.
    ///
    /// All indexed documents are lost. The schema is recreated immediately
    /// so indexing can resume.
    DeleteIndex,

    /// Delete every indexed record belonging to one search area.
    DeleteArea {
        /// Search area id, e.g. `mod_forum-post`.
        areaid: String,
    },

    /// Search the index and print the results.
    Search {
        /// The search query string. `*` matches everything.
        query: String,

        /// Match only against document titles.
        #[arg(long)]
        title: Option<String>,

        /// Restrict to a search area (repeatable).
        #[arg(long = "area")]
        areas: Vec<String>,

        /// Restrict to a course id (repeatable).
        #[arg(long = "course")]
        courses: Vec<i64>,

        /// Only return documents modified on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only return documents modified before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Sort by modified time: `asc` or `desc` (default: relevance).
        #[arg(long)]
        order: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Access checker for administrative searches: every area resolves and
/// every result is granted.
struct AdminAccess;

impl AccessChecker for AdminAccess {
    fn resolve_area(&self, _areaid: &str) -> bool {
        true
    }
    fn check_access(&self, _areaid: &str, _itemid: i64) -> AccessDecision {
        AccessDecision::Granted
    }
}

/// Parse a `YYYY-MM-DD` date into the Unix timestamp at the start of that
/// day (UTC).
fn parse_day_start(s: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid date '{}': {}", s, e))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
}

fn build_engine(cfg: Config) -> Result<SearchEngine<HttpTransport>> {
    let api_key = if cfg.search.api_key.is_empty() {
        None
    } else {
        Some(cfg.search.api_key.clone())
    };
    let transport = HttpTransport::new(api_key, cfg.proxy.as_ref())?;
    Ok(SearchEngine::new(cfg, transport))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Status => {
            let engine = build_engine(cfg)?;
            println!("{}", engine.server_status().await);
            match engine.check_index().await {
                Ok(true) => println!("Index '{}' exists.", engine.config().search.index),
                Ok(false) => println!("Index '{}' does not exist.", engine.config().search.index),
                Err(e) => println!("Index check failed: {}", e),
            }
            if engine.file_indexing_enabled().await {
                println!("File indexing is enabled.");
            } else {
                println!("File indexing is disabled or Tika is unreachable.");
            }
        }
        Commands::CreateIndex => {
            let engine = build_engine(cfg)?;
            if engine.check_index().await? {
                println!("Index '{}' already exists.", engine.config().search.index);
            } else {
                engine.create_index().await?;
                println!("Index '{}' created.", engine.config().search.index);
            }
        }
        Commands::DeleteIndex => {
            let engine = build_engine(cfg)?;
            if engine.delete_all().await? {
                println!("Index deleted and recreated.");
            } else {
                println!("Index deletion failed.");
            }
        }
        Commands::DeleteArea { areaid } => {
            let engine = build_engine(cfg)?;
            if engine.delete_area(&areaid).await? {
                println!("All records in area '{}' deleted.", areaid);
            } else {
                println!("Some records in area '{}' could not be deleted.", areaid);
            }
        }
        Commands::Search {
            query,
            title,
            areas,
            courses,
            since,
            until,
            order,
            limit,
        } => {
            let mut engine = build_engine(cfg)?;

            let order = match order.as_deref() {
                Some("asc") => Some(SortOrder::Asc),
                Some("desc") => Some(SortOrder::Desc),
                Some(other) => anyhow::bail!("Invalid --order '{}': use asc or desc", other),
                None => None,
            };

            let filters = SearchFilters {
                q: query,
                title,
                areaids: areas,
                courseids: courses,
                timestart: since.as_deref().map(parse_day_start).transpose()?.unwrap_or(0),
                timeend: until.as_deref().map(parse_day_start).transpose()?.unwrap_or(0),
                order,
                ..Default::default()
            };

            let results = engine
                .execute_query(
                    &filters,
                    &ContextScope::Unrestricted,
                    limit.unwrap_or(0),
                    &AdminAccess,
                )
                .await?;

            println!(
                "{} result(s), {} matched in total.\n",
                results.len(),
                engine.query_total_count()
            );
            for doc in results {
                println!("{}  [{}]", doc.id, doc.areaid);
                println!("  {}", doc.title);
                if !doc.content.is_empty() {
                    let snippet: String = doc.content.chars().take(160).collect();
                    println!("  {}", snippet);
                }
                println!();
            }
        }
    }

    Ok(())
}
