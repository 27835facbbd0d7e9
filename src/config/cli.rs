use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the showcase binary.
#[derive(Debug, Parser)]
#[command(
    name = "showcase",
    version,
    about = "Homepage content sync: read-through cache, snapshots and debounced publishing"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SHOWCASE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP surface together with the sync coordinator.
    Serve(Box<ServeArgs>),
    /// Snapshot sections, campaigns and category statistics from the database.
    Publish(PublishArgs),
    /// Print the snapshot status report as JSON.
    Status(StatusArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SnapshotsOverride {
    /// Override the snapshot base directory.
    #[arg(long = "snapshots-directory", value_name = "PATH")]
    pub snapshots_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub snapshots: SnapshotsOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the read-through cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the sync debounce interval.
    #[arg(long = "sync-debounce-ms", value_name = "MILLIS")]
    pub sync_debounce_ms: Option<u64>,

    /// Override the revalidation endpoint.
    #[arg(long = "revalidate-url", value_name = "URL")]
    pub revalidate_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PublishArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub snapshots: SnapshotsOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub snapshots: SnapshotsOverride,
}
