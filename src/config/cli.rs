use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the treecache inspection binary.
#[derive(Debug, Parser)]
#[command(
    name = "treecache",
    version,
    about = "Inspect hierarchical settings and path caches over a store fixture"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TREECACHE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// TOML fixture the in-memory store is seeded from.
    #[arg(long = "store-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub store_file: Option<PathBuf>,

    /// Override the store root path.
    #[arg(long = "root-path", value_name = "PATH")]
    pub root_path: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Force JSON logging output (true/false).
    #[arg(long = "log-json", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the effective settings for a context path.
    Resolve(ResolveArgs),
    /// Print the self-persisting path list for a key.
    Paths(PathsArgs),
    /// Delete the persisted path list for a key.
    #[command(name = "invalidate-paths")]
    InvalidatePaths(InvalidatePathsArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    /// Settings name, e.g. `logging`.
    #[arg(long)]
    pub name: String,

    /// Context path to resolve for; the root consults root settings directly.
    #[arg(long)]
    pub path: String,
}

#[derive(Debug, Args, Clone)]
pub struct PathsArgs {
    /// Cache key; also the name pattern of the aggregated nodes.
    #[arg(long)]
    pub key: String,

    /// Node type to aggregate.
    #[arg(long = "node-type", value_name = "TYPE")]
    pub node_type: String,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidatePathsArgs {
    /// Cache key whose artifact is deleted.
    #[arg(long)]
    pub key: String,
}
