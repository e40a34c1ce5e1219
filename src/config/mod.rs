//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CliArgs, Command, RenderArgs, RenderOverrides, ServeArgs, ServeOverrides};

use crate::{application::render::IdleTimeoutPolicy, domain::pdf::DeliveryMode};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mundus-pdf";
const ENV_PREFIX: &str = "MUNDUS_PDF";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3002;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
pub(crate) const DEFAULT_SERVICE_NAME: &str = "mundus-pdf-service";
const DEFAULT_STORAGE_BUCKET: &str = "pdfs";
const DEFAULT_STORAGE_PREFIX: &str = "digests";
const DEFAULT_STORAGE_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_NETWORK_IDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 30;

/// Variables understood by earlier deployments of the service.
const LEGACY_PORT_VAR: &str = "PORT";
const LEGACY_STORAGE_URL_VAR: &str = "SUPABASE_URL";
const LEGACY_SERVICE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub service: ServiceSettings,
    pub logging: LoggingSettings,
    pub delivery: DeliverySettings,
    pub storage: StorageSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_body_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub mode: DeliveryMode,
}

#[derive(Clone)]
pub struct StorageSettings {
    pub url: Option<String>,
    pub service_key: Option<String>,
    pub bucket: String,
    pub prefix: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("url", &self.url)
            .field("service_key", &self.service_key.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub chrome_executable: Option<PathBuf>,
    pub network_idle_timeout: Duration,
    pub on_idle_timeout: IdleTimeoutPolicy,
    pub launch_timeout: Duration,
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

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_legacy_env(|name| std::env::var(name).ok())?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.render),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    service: RawServiceSettings,
    logging: RawLoggingSettings,
    delivery: RawDeliverySettings,
    storage: RawStorageSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    /// Fill unset values from the unprefixed variables of earlier deployments.
    fn apply_legacy_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), LoadError> {
        if self.server.port.is_none()
            && let Some(port) = non_blank(lookup(LEGACY_PORT_VAR))
        {
            let port = port.parse::<u16>().map_err(|err| {
                LoadError::invalid("server.port", format!("{LEGACY_PORT_VAR}={port}: {err}"))
            })?;
            self.server.port = Some(port);
        }
        if self.storage.url.is_none() {
            self.storage.url = non_blank(lookup(LEGACY_STORAGE_URL_VAR));
        }
        if self.storage.service_key.is_none() {
            self.storage.service_key = non_blank(lookup(LEGACY_SERVICE_KEY_VAR));
        }
        Ok(())
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
        if let Some(bytes) = overrides.server_max_body_bytes {
            self.server.max_body_bytes = Some(bytes);
        }
        if let Some(name) = overrides.service_name.as_ref() {
            self.service.name = Some(name.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(mode) = overrides.delivery_mode.as_ref() {
            self.delivery.mode = Some(mode.clone());
        }
        if let Some(url) = overrides.storage_url.as_ref() {
            self.storage.url = Some(url.clone());
        }
        if let Some(bucket) = overrides.storage_bucket.as_ref() {
            self.storage.bucket = Some(bucket.clone());
        }
        if let Some(prefix) = overrides.storage_prefix.as_ref() {
            self.storage.prefix = Some(prefix.clone());
        }
        if let Some(seconds) = overrides.storage_request_timeout_seconds {
            self.storage.request_timeout_seconds = Some(seconds);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.chrome_executable.as_ref() {
            self.render.chrome_executable = Some(path.clone());
        }
        if let Some(seconds) = overrides.network_idle_timeout_seconds {
            self.render.network_idle_timeout_seconds = Some(seconds);
        }
        if let Some(policy) = overrides.on_idle_timeout.as_ref() {
            self.render.on_idle_timeout = Some(policy.clone());
        }
        if let Some(seconds) = overrides.launch_timeout_seconds {
            self.render.launch_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            service,
            logging,
            delivery,
            storage,
            render,
        } = raw;

        let server = build_server_settings(server)?;
        let service = build_service_settings(service)?;
        let logging = build_logging_settings(logging)?;
        let delivery = build_delivery_settings(delivery)?;
        let storage = build_storage_settings(storage, delivery.mode)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            server,
            service,
            logging,
            delivery,
            storage,
            render,
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
    let graceful_shutdown = non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?;

    let max_body_value = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_value)
        .ok_or_else(|| LoadError::invalid("server.max_body_bytes", "must be greater than zero"))?;
    usize::try_from(max_body_value).map_err(|_| {
        LoadError::invalid(
            "server.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
        max_body_bytes,
    })
}

fn build_service_settings(service: RawServiceSettings) -> Result<ServiceSettings, LoadError> {
    let name = service
        .name
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
    if name.is_empty() {
        return Err(LoadError::invalid("service.name", "must not be empty"));
    }
    Ok(ServiceSettings { name })
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

fn build_delivery_settings(delivery: RawDeliverySettings) -> Result<DeliverySettings, LoadError> {
    let mode = match delivery.mode {
        Some(mode) => DeliveryMode::from_str(&mode)
            .map_err(|reason| LoadError::invalid("delivery.mode", reason))?,
        None => DeliveryMode::Inline,
    };
    Ok(DeliverySettings { mode })
}

fn build_storage_settings(
    storage: RawStorageSettings,
    mode: DeliveryMode,
) -> Result<StorageSettings, LoadError> {
    let url = non_blank(storage.url);
    let service_key = non_blank(storage.service_key);

    if let Some(value) = url.as_deref() {
        let parsed =
            Url::parse(value).map_err(|err| LoadError::invalid("storage.url", err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LoadError::invalid(
                "storage.url",
                format!("unsupported scheme `{}`", parsed.scheme()),
            ));
        }
    }

    if mode == DeliveryMode::Uploaded {
        if url.is_none() {
            return Err(LoadError::invalid(
                "storage.url",
                "required when delivery.mode is upload",
            ));
        }
        if service_key.is_none() {
            return Err(LoadError::invalid(
                "storage.service_key",
                "required when delivery.mode is upload",
            ));
        }
    }

    let bucket = storage
        .bucket
        .map(|bucket| bucket.trim().to_string())
        .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string());
    if bucket.is_empty() || bucket.contains('/') {
        return Err(LoadError::invalid(
            "storage.bucket",
            "must be a non-empty name without `/`",
        ));
    }

    let prefix = storage
        .prefix
        .unwrap_or_else(|| DEFAULT_STORAGE_PREFIX.to_string())
        .trim()
        .trim_matches('/')
        .to_string();

    let timeout_secs = storage
        .request_timeout_seconds
        .unwrap_or(DEFAULT_STORAGE_REQUEST_TIMEOUT_SECS);
    let request_timeout = non_zero_secs(timeout_secs, "storage.request_timeout_seconds")?;

    Ok(StorageSettings {
        url,
        service_key,
        bucket,
        prefix,
        request_timeout,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let chrome_executable = render
        .chrome_executable
        .filter(|path| !path.as_os_str().is_empty());

    let network_idle_timeout = non_zero_secs(
        render
            .network_idle_timeout_seconds
            .unwrap_or(DEFAULT_NETWORK_IDLE_TIMEOUT_SECS),
        "render.network_idle_timeout_seconds",
    )?;
    let launch_timeout = non_zero_secs(
        render
            .launch_timeout_seconds
            .unwrap_or(DEFAULT_LAUNCH_TIMEOUT_SECS),
        "render.launch_timeout_seconds",
    )?;

    let on_idle_timeout = match render.on_idle_timeout {
        Some(policy) => IdleTimeoutPolicy::from_str(&policy)
            .map_err(|reason| LoadError::invalid("render.on_idle_timeout", reason))?,
        None => IdleTimeoutPolicy::default(),
    };

    Ok(RenderSettings {
        chrome_executable,
        network_idle_timeout,
        on_idle_timeout,
        launch_timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServiceSettings {
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeliverySettings {
    mode: Option<String>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    url: Option<String>,
    service_key: Option<String>,
    bucket: Option<String>,
    prefix: Option<String>,
    request_timeout_seconds: Option<u64>,
}

impl std::fmt::Debug for RawStorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawStorageSettings")
            .field("url", &self.url)
            .field("service_key", &self.service_key.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    chrome_executable: Option<PathBuf>,
    network_idle_timeout_seconds: Option<u64>,
    on_idle_timeout: Option<String>,
    launch_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
