//! Command-line interface definitions for feed_relay.
//!
//! All options can be provided via command-line flags; the config path
//! also falls back to an environment variable.

use clap::Parser;

/// Command-line arguments for the feed_relay pipeline.
///
/// # Examples
///
/// ```sh
/// # Run every registered source into ./feeds
/// feed_relay -o ./feeds
///
/// # Run one source with a route parameter
/// feed_relay -o ./feeds --sources smzdm --param zm5vzpe
///
/// # Override the cache TTL for this run
/// feed_relay -o ./feeds --ttl 60
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for normalized feed JSON
    #[arg(short, long, default_value = "./feeds")]
    pub out_dir: String,

    /// Comma-separated source ids to run (default: all registered)
    #[arg(short, long)]
    pub sources: Option<String>,

    /// Route parameter forwarded to each handler (section, category, or id)
    #[arg(short, long)]
    pub param: Option<String>,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "FEED_RELAY_CONFIG")]
    pub config: Option<String>,

    /// Override the default cache TTL in seconds
    #[arg(long)]
    pub ttl: Option<u64>,
}

impl Cli {
    /// Source ids requested on the command line, or `None` for all.
    pub fn selected_sources(&self) -> Option<Vec<String>> {
        self.sources.as_ref().map(|raw| {
            raw.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
    }
}
