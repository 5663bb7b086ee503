//! CLI administration tool for the short URL registry.
//!
//! Inspects and repairs registry state without going through the
//! controller or the redirect listener.
//!
//! # Usage
//!
//! ```bash
//! # Show the short path a URL maps to
//! cargo run --bin admin -- generate https://example.com/docs --length 5
//!
//! # Show the target of a short path
//! cargo run --bin admin -- lookup /Ab3
//!
//! # Show the click counter of a short path
//! cargo run --bin admin -- clicks /Ab3
//!
//! # Remove a mapping entry and its counter
//! cargo run --bin admin -- purge /Ab3
//!
//! # Check registry connection
//! cargo run --bin admin -- ping
//! ```
//!
//! # Environment Variables
//!
//! - `REDIS_URL` or `REDIS_HOST`/`REDIS_PORT`/`REDIS_PASSWORD`/`REDIS_DB`
//!   (required for every command except `generate`)
//! - `CLICK_KEY_PREFIX`, `REGISTRY_TIMEOUT_MS`, `SHORT_PATH_LENGTH`

use shorturl_operator::config::{Config, mask_connection_string};
use shorturl_operator::domain::repositories::{Registry, counter_key};
use shorturl_operator::infrastructure::registry::RedisRegistry;
use shorturl_operator::utils::short_path::{ShortPathGenerator, is_short_path};
use shorturl_operator::utils::target_url::validate_target_url;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;

/// CLI tool for inspecting the short URL registry.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the short path derived from a target URL
    Generate {
        /// Target URL
        url: String,

        /// Path length (defaults to SHORT_PATH_LENGTH)
        #[arg(short, long)]
        length: Option<usize>,
    },

    /// Print the target URL stored for a short path
    Lookup {
        /// Short path, with or without the leading slash
        path: String,
    },

    /// Print the click counter of a short path
    Clicks {
        /// Short path, with or without the leading slash
        path: String,
    },

    /// Delete a mapping entry and its click counter
    Purge {
        /// Short path, with or without the leading slash
        path: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Check registry connection
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Generate { url, length } => {
            generate(&url, length.unwrap_or(config.short_path_length))?
        }
        Commands::Lookup { path } => lookup(&connect(&config).await?, &normalize(&path)?).await?,
        Commands::Clicks { path } => {
            clicks(&connect(&config).await?, &config, &normalize(&path)?).await?
        }
        Commands::Purge { path, yes } => {
            purge(&connect(&config).await?, &config, &normalize(&path)?, yes).await?
        }
        Commands::Ping => ping(&config).await?,
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<RedisRegistry> {
    let redis_url = config
        .redis_url
        .as_deref()
        .context("REDIS_URL or REDIS_HOST must be set")?;

    RedisRegistry::connect(redis_url, config.registry_timeout())
        .await
        .context("Failed to connect to Redis")
}

/// Accepts `Ab3` or `/Ab3`.
fn normalize(path: &str) -> Result<String> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    if !is_short_path(&path) {
        anyhow::bail!("'{}' is not a valid short path", path);
    }
    Ok(path)
}

fn generate(url: &str, length: usize) -> Result<()> {
    validate_target_url(url).map_err(|e| anyhow::anyhow!("Invalid target URL: {}", e))?;

    let generator = ShortPathGenerator::new(length);
    let mut candidates = generator.candidates(url);
    let path = candidates.next().context("No short path candidate")?;

    println!("  URL:  {}", url.cyan());
    println!("  Path: {}", path.bright_yellow().bold());

    let fallbacks: Vec<String> = candidates.take(3).collect();
    if !fallbacks.is_empty() {
        println!(
            "  On collision: {}",
            fallbacks.join(", ").bright_black()
        );
    }
    Ok(())
}

async fn lookup(registry: &RedisRegistry, path: &str) -> Result<()> {
    match registry.get(path).await? {
        Some(target) => {
            println!("  {} → {}", path.bright_yellow(), target.cyan());
        }
        None => {
            println!("{}", format!("  No mapping entry for {}", path).yellow());
        }
    }
    Ok(())
}

async fn clicks(registry: &RedisRegistry, config: &Config, path: &str) -> Result<()> {
    let key = counter_key(&config.click_key_prefix, path);
    let count = registry.get_counter(&key).await?;

    println!(
        "  {} clicks: {}",
        path.bright_yellow(),
        count.to_string().bright_green().bold()
    );
    Ok(())
}

/// Deletes a mapping entry and its counter.
///
/// A resource that still declares this path gets the entry back on its next
/// reconcile; the counter restarts from zero.
async fn purge(registry: &RedisRegistry, config: &Config, path: &str, yes: bool) -> Result<()> {
    println!("{}", "🗑  Purge short path".bright_blue().bold());
    println!();

    let target = registry.get(path).await?;
    println!("  Path:   {}", path.bright_yellow());
    println!(
        "  Target: {}",
        target.as_deref().unwrap_or("(none)").cyan()
    );
    println!();

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt("Delete this entry and its click counter?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "❌ Cancelled".red());
            return Ok(());
        }
    }

    registry.delete(path).await?;
    registry
        .delete(&counter_key(&config.click_key_prefix, path))
        .await?;

    println!("{}", "✅ Purged".green().bold());
    Ok(())
}

async fn ping(config: &Config) -> Result<()> {
    let redis_url = config
        .redis_url
        .as_deref()
        .context("REDIS_URL or REDIS_HOST must be set")?;

    println!(
        "{}",
        format!("🔍 Checking {}...", mask_connection_string(redis_url)).bright_blue()
    );

    let registry = connect(config).await?;
    if registry.ping().await {
        println!("{}", "✅ Registry connection OK".green().bold());
        Ok(())
    } else {
        anyhow::bail!("Registry did not answer PING")
    }
}
