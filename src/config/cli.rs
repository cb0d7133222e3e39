use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

pub const DEFAULT_CONVERT_THEME: &str = "atom";
pub const DEFAULT_CONVERT_FILE: &str = "markdown/markdown.md";

/// Command-line arguments for the md2pdf binary.
#[derive(Debug, Parser)]
#[command(
    name = "md2pdf",
    version,
    about = "Render Markdown to PDF through headless Chromium"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MD2PDF_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service (default).
    Serve(Box<ServeArgs>),
    /// Convert a local Markdown file.
    Convert(ConvertArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Directory containing the `style/` and `libs/` assets.
    #[arg(long = "assets-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub assets_dir: Option<PathBuf>,

    /// Chromium or Chrome executable to launch.
    #[arg(long = "chrome-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub chrome_path: Option<PathBuf>,

    /// Base directory for job work directories and debug copies.
    #[arg(long = "temp-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub temp_dir: Option<PathBuf>,

    /// Keep a copy of every produced PDF under the debug directory.
    #[arg(
        long = "debug-output",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub debug: Option<bool>,

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
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
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

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-body-limit-bytes", value_name = "BYTES")]
    pub body_limit_bytes: Option<u64>,

    /// Override the session budget for a single render, in seconds.
    #[arg(long = "session-budget-seconds", value_name = "SECONDS")]
    pub session_budget_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Theme name, or `all` to render every theme.
    #[arg(value_name = "THEME", default_value = DEFAULT_CONVERT_THEME)]
    pub theme: String,

    /// Markdown file to convert.
    #[arg(
        value_name = "FILE",
        default_value = DEFAULT_CONVERT_FILE,
        value_hint = ValueHint::FilePath
    )]
    pub file: PathBuf,

    /// Directory receiving the generated PDFs.
    #[arg(long = "output-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Viewport preset (1K, 2K, 4K) or WIDTHxHEIGHT.
    #[arg(long = "resolution", value_name = "RESOLUTION")]
    pub resolution: Option<String>,

    /// Width of the single tall page, in millimetres.
    #[arg(long = "page-width", value_name = "MM", conflicts_with = "format")]
    pub page_width: Option<f64>,

    /// Paginate onto a named paper size instead of one tall page.
    #[arg(long = "format", value_name = "FORMAT")]
    pub format: Option<String>,
}
