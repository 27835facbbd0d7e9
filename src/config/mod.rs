//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CliArgs, Command, DatabaseOverride, PublishArgs, ServeArgs, ServeOverrides, SnapshotsOverride,
    StatusArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "showcase";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CACHE_NAMESPACE: &str = "showcase";
const DEFAULT_CACHE_CAPACITY: u64 = 1024;
const DEFAULT_CAMPAIGNS_TTL_SECS: u64 = 60;
const DEFAULT_CATEGORY_STATS_TTL_SECS: u64 = 300;
const DEFAULT_CONTENT_TTL_SECS: u64 = 900;
const DEFAULT_UI_CONFIG_TTL_SECS: u64 = 3600;
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
const DEFAULT_BACKUP_MAX_COUNT: u64 = 20;
const DEFAULT_BACKUP_MAX_AGE_DAYS: u64 = 7;
const DEFAULT_SYNC_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_REVALIDATE_TIMEOUT_SECS: u64 = 5;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Fully validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub snapshots: SnapshotSettings,
    pub sync: SyncSettings,
    pub revalidate: RevalidateSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

/// Read-through cache toggles and the four TTL tiers.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub namespace: String,
    pub capacity: NonZeroUsize,
    pub campaigns_ttl: Duration,
    pub category_stats_ttl: Duration,
    pub content_ttl: Duration,
    pub ui_config_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub directory: PathBuf,
    pub backup_max_count: NonZeroU32,
    pub backup_max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub debounce: Duration,
}

/// When `url` is unset, revalidation requests are only logged.
#[derive(Debug, Clone)]
pub struct RevalidateSettings {
    pub url: Option<Url>,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SHOWCASE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_command_overrides(cli.command.as_ref());

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    snapshots: RawSnapshotSettings,
    sync: RawSyncSettings,
    revalidate: RawRevalidateSettings,
}

impl RawSettings {
    fn apply_command_overrides(&mut self, command: Option<&Command>) {
        match command {
            Some(Command::Serve(args)) => self.apply_serve_overrides(&args.overrides),
            Some(Command::Publish(args)) => {
                self.apply_database_override(&args.database);
                self.apply_snapshots_override(&args.snapshots);
            }
            Some(Command::Status(args)) => self.apply_snapshots_override(&args.snapshots),
            None => self.apply_serve_overrides(&ServeOverrides::default()),
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(debounce) = overrides.sync_debounce_ms {
            self.sync.debounce_ms = Some(debounce);
        }
        if let Some(url) = overrides.revalidate_url.as_ref() {
            self.revalidate.url = Some(url.clone());
        }

        self.apply_database_override(&overrides.database);
        self.apply_snapshots_override(&overrides.snapshots);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_snapshots_override(&mut self, overrides: &SnapshotsOverride) {
        if let Some(directory) = overrides.snapshots_directory.as_ref() {
            self.snapshots.directory = Some(directory.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            snapshots,
            sync,
            revalidate,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            snapshots: build_snapshot_settings(snapshots)?,
            sync: build_sync_settings(sync)?,
            revalidate: build_revalidate_settings(revalidate)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let acquire_timeout = non_zero_secs(
        database
            .acquire_timeout_seconds
            .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS),
        "database.acquire_timeout_seconds",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_string());

    let capacity_value = cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY);
    let capacity = usize::try_from(capacity_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.capacity",
                "must be greater than zero and fit in usize",
            )
        })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        namespace,
        capacity,
        campaigns_ttl: non_zero_secs(
            cache
                .campaigns_ttl_seconds
                .unwrap_or(DEFAULT_CAMPAIGNS_TTL_SECS),
            "cache.campaigns_ttl_seconds",
        )?,
        category_stats_ttl: non_zero_secs(
            cache
                .category_stats_ttl_seconds
                .unwrap_or(DEFAULT_CATEGORY_STATS_TTL_SECS),
            "cache.category_stats_ttl_seconds",
        )?,
        content_ttl: non_zero_secs(
            cache.content_ttl_seconds.unwrap_or(DEFAULT_CONTENT_TTL_SECS),
            "cache.content_ttl_seconds",
        )?,
        ui_config_ttl: non_zero_secs(
            cache
                .ui_config_ttl_seconds
                .unwrap_or(DEFAULT_UI_CONFIG_TTL_SECS),
            "cache.ui_config_ttl_seconds",
        )?,
    })
}

fn build_snapshot_settings(snapshots: RawSnapshotSettings) -> Result<SnapshotSettings, LoadError> {
    let directory = snapshots
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "snapshots.directory",
            "path must not be empty",
        ));
    }

    let backup_max_count = non_zero_u32(
        snapshots
            .backup_max_count
            .unwrap_or(DEFAULT_BACKUP_MAX_COUNT),
        "snapshots.backup_max_count",
    )?;

    let max_age_days = snapshots
        .backup_max_age_days
        .unwrap_or(DEFAULT_BACKUP_MAX_AGE_DAYS);
    if max_age_days == 0 {
        return Err(LoadError::invalid(
            "snapshots.backup_max_age_days",
            "must be greater than zero",
        ));
    }
    let max_age_secs = max_age_days.checked_mul(SECONDS_PER_DAY).ok_or_else(|| {
        LoadError::invalid("snapshots.backup_max_age_days", "value is too large")
    })?;

    Ok(SnapshotSettings {
        directory,
        backup_max_count,
        backup_max_age: Duration::from_secs(max_age_secs),
    })
}

fn build_sync_settings(sync: RawSyncSettings) -> Result<SyncSettings, LoadError> {
    let debounce_ms = sync.debounce_ms.unwrap_or(DEFAULT_SYNC_DEBOUNCE_MS);
    if debounce_ms == 0 {
        return Err(LoadError::invalid(
            "sync.debounce_ms",
            "must be greater than zero",
        ));
    }

    Ok(SyncSettings {
        debounce: Duration::from_millis(debounce_ms),
    })
}

fn build_revalidate_settings(
    revalidate: RawRevalidateSettings,
) -> Result<RevalidateSettings, LoadError> {
    let url = match revalidate.url.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Some(
            Url::parse(value)
                .map_err(|err| LoadError::invalid("revalidate.url", err.to_string()))?,
        ),
        _ => None,
    };

    let token = revalidate.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let timeout = non_zero_secs(
        revalidate
            .timeout_seconds
            .unwrap_or(DEFAULT_REVALIDATE_TIMEOUT_SECS),
        "revalidate.timeout_seconds",
    )?;

    Ok(RevalidateSettings {
        url,
        token,
        timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    namespace: Option<String>,
    capacity: Option<u64>,
    campaigns_ttl_seconds: Option<u64>,
    category_stats_ttl_seconds: Option<u64>,
    content_ttl_seconds: Option<u64>,
    ui_config_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSnapshotSettings {
    directory: Option<PathBuf>,
    backup_max_count: Option<u64>,
    backup_max_age_days: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRevalidateSettings {
    url: Option<String>,
    token: Option<String>,
    timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}
