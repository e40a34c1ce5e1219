use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the PDF service binary.
#[derive(Debug, Parser)]
#[command(
    name = "mundus-pdf-service",
    version,
    about = "Render HTML to PDF with headless Chromium"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "MUNDUS_PDF_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Render a local HTML file to PDF without starting the server.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// HTML file to render.
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Where to write the PDF; defaults to INPUT with a `.pdf` extension.
    #[arg(long, short, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the Chromium executable used for rendering.
    #[arg(long = "render-chrome-executable", value_name = "PATH")]
    pub chrome_executable: Option<PathBuf>,

    /// Override the maximum wait for network idle.
    #[arg(long = "render-network-idle-timeout-seconds", value_name = "SECONDS")]
    pub network_idle_timeout_seconds: Option<u64>,

    /// What to do when network idle is not reached (fail|render).
    #[arg(long = "render-on-idle-timeout", value_name = "POLICY")]
    pub on_idle_timeout: Option<String>,

    /// Override the maximum wait for browser start-up.
    #[arg(long = "render-launch-timeout-seconds", value_name = "SECONDS")]
    pub launch_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-max-body-bytes", value_name = "BYTES")]
    pub server_max_body_bytes: Option<u64>,

    /// Override the service name reported by the health endpoint.
    #[arg(long = "service-name", value_name = "NAME")]
    pub service_name: Option<String>,

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

    /// Override the delivery mode (inline|upload).
    #[arg(long = "delivery-mode", value_name = "MODE")]
    pub delivery_mode: Option<String>,

    /// Override the storage endpoint URL.
    #[arg(long = "storage-url", value_name = "URL")]
    pub storage_url: Option<String>,

    /// Override the storage bucket.
    #[arg(long = "storage-bucket", value_name = "BUCKET")]
    pub storage_bucket: Option<String>,

    /// Override the object path prefix inside the bucket.
    #[arg(long = "storage-prefix", value_name = "PREFIX")]
    pub storage_prefix: Option<String>,

    /// Override the storage request timeout.
    #[arg(long = "storage-request-timeout-seconds", value_name = "SECONDS")]
    pub storage_request_timeout_seconds: Option<u64>,
}
