//! Configuration layer: typed settings with layered precedence
//! (file → `MD2PDF__` env → compatibility env → CLI).

mod cli;

use std::{
    env,
    net::SocketAddr,
    num::NonZeroU64,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::render::{DriverConfig, WaitBudget},
    domain::layout::Resolution,
};

pub use cli::{
    CliArgs, Command, ConvertArgs, DEFAULT_CONVERT_FILE, DEFAULT_CONVERT_THEME, RenderOverrides,
    ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "md2pdf";
const ENV_PREFIX: &str = "MD2PDF";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 80;
const DEFAULT_BODY_LIMIT_BYTES: u64 = 200 * 1024 * 1024;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_ASSETS_DIR: &str = ".";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_SERVER_RESOLUTION: &str = "2K";
const DEFAULT_CLI_RESOLUTION: &str = "4K";
const DEFAULT_SERVER_SESSION_BUDGET_SECS: u64 = 600;
const DEFAULT_CLI_SESSION_BUDGET_SECS: u64 = 200;
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 30;
pub const WORK_DIR_NAME: &str = "md2pdf_tmp";
pub const DEBUG_DIR_NAME: &str = "md2pdf_debug";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub cli: ConvertSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub body_limit_bytes: NonZeroU64,
    pub graceful_shutdown: Duration,
    pub session_budget: Duration,
    pub default_resolution: Resolution,
    /// Static front-end served at `/` when set.
    pub public_dir: Option<PathBuf>,
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
pub struct RenderSettings {
    pub assets_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub debug: bool,
    pub launch_timeout: Duration,
    pub waits: WaitBudget,
}

impl RenderSettings {
    pub fn work_root(&self) -> PathBuf {
        self.temp_dir.join(WORK_DIR_NAME)
    }

    pub fn debug_dir(&self) -> Option<PathBuf> {
        self.debug.then(|| self.temp_dir.join(DEBUG_DIR_NAME))
    }

    /// Driver configuration for a surface with the given session budget.
    pub fn driver_config(&self, session_budget: Duration) -> DriverConfig {
        DriverConfig {
            assets_dir: self.assets_dir.clone(),
            work_root: self.work_root(),
            debug_dir: self.debug_dir(),
            session_budget,
            launch_timeout: self.launch_timeout,
            waits: self.waits,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvertSettings {
    pub output_dir: PathBuf,
    pub resolution: Resolution,
    pub session_budget: Duration,
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

/// Environment variables understood for compatibility with existing
/// deployments, outside the `MD2PDF__` namespace.
#[derive(Debug, Clone, Default)]
pub struct LegacyEnv {
    pub port: Option<String>,
    pub temp_dir: Option<String>,
    pub chrome_path: Option<String>,
    pub debug: Option<String>,
}

impl LegacyEnv {
    pub fn from_process() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// First non-empty value wins within each group.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .find(|value| !value.trim().is_empty())
        };
        Self {
            port: first(&["PORT"]),
            temp_dir: first(&["PDF_TMP_DIR", "MD2PDF_TMP"]),
            chrome_path: first(&["MD2PDF_CHROME", "CHROME_PATH"]),
            debug: first(&["MD2PDF_DEBUG"]),
        }
    }
}

/// Load settings using the configured precedence.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    load_with_env(cli, &LegacyEnv::from_process())
}

pub fn load_with_env(cli: &CliArgs, legacy: &LegacyEnv) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_legacy_env(legacy)?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Convert(args)) => raw.apply_convert_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for
/// downstream use.
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
    render: RawRenderSettings,
    cli: RawConvertSettings,
}

impl RawSettings {
    fn apply_legacy_env(&mut self, legacy: &LegacyEnv) -> Result<(), LoadError> {
        if let Some(port) = legacy.port.as_deref() {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|err| LoadError::invalid("PORT", format!("failed to parse: {err}")))?;
            self.server.port = Some(port);
        }
        if let Some(dir) = legacy.temp_dir.as_deref() {
            self.render.temp_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(path) = legacy.chrome_path.as_deref() {
            self.render.chrome_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(flag) = legacy.debug.as_deref() {
            self.render.debug = Some(flag.trim() == "1");
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
        if let Some(limit) = overrides.body_limit_bytes {
            self.server.body_limit_bytes = Some(limit);
        }
        if let Some(seconds) = overrides.session_budget_seconds {
            self.render.session_budget_seconds = Some(seconds);
        }
        self.apply_render_overrides(&overrides.render);
    }

    fn apply_convert_overrides(&mut self, args: &ConvertArgs) {
        if let Some(dir) = args.output_dir.as_ref() {
            self.cli.output_dir = Some(dir.clone());
        }
        if let Some(resolution) = args.resolution.as_ref() {
            self.cli.resolution = Some(resolution.clone());
        }
        self.apply_render_overrides(&args.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(dir) = overrides.assets_dir.as_ref() {
            self.render.assets_dir = Some(dir.clone());
        }
        if let Some(path) = overrides.chrome_path.as_ref() {
            self.render.chrome_path = Some(path.clone());
        }
        if let Some(dir) = overrides.temp_dir.as_ref() {
            self.render.temp_dir = Some(dir.clone());
        }
        if let Some(debug) = overrides.debug {
            self.render.debug = Some(debug);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            cli,
        } = raw;

        let session_budget = seconds(
            render.session_budget_seconds,
            DEFAULT_SERVER_SESSION_BUDGET_SECS,
            "render.session_budget_seconds",
        )?;
        let default_resolution = parse_resolution(
            render.default_resolution.as_deref(),
            DEFAULT_SERVER_RESOLUTION,
            "render.default_resolution",
        )?;

        Ok(Self {
            server: build_server_settings(server, session_budget, default_resolution)?,
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            cli: build_convert_settings(cli)?,
        })
    }
}

fn build_server_settings(
    server: RawServerSettings,
    session_budget: Duration,
    default_resolution: Resolution,
) -> Result<ServerSettings, LoadError> {
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

    let body_limit_value = server.body_limit_bytes.unwrap_or(DEFAULT_BODY_LIMIT_BYTES);
    let body_limit_bytes = NonZeroU64::new(body_limit_value).ok_or_else(|| {
        LoadError::invalid("server.body_limit_bytes", "must be greater than zero")
    })?;
    usize::try_from(body_limit_value).map_err(|_| {
        LoadError::invalid(
            "server.body_limit_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let graceful_shutdown = seconds(
        server.graceful_shutdown_seconds,
        DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        "server.graceful_shutdown_seconds",
    )?;

    let public_dir = match server.public_dir {
        Some(dir) if !dir.as_os_str().is_empty() => Some(absolute(dir, "server.public_dir")?),
        _ => None,
    };

    Ok(ServerSettings {
        addr,
        body_limit_bytes,
        graceful_shutdown,
        session_budget,
        default_resolution,
        public_dir,
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

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let assets_dir = render
        .assets_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
    if assets_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.assets_dir",
            "path must not be empty",
        ));
    }
    let assets_dir = absolute(assets_dir, "render.assets_dir")?;

    let chrome_path = render
        .chrome_path
        .filter(|path| !path.as_os_str().is_empty());

    let temp_dir = match render.temp_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => env::temp_dir(),
    };
    let temp_dir = absolute(temp_dir, "render.temp_dir")?;

    let timeouts = render.timeouts;
    let defaults = WaitBudget::default();
    let waits = WaitBudget {
        readiness: seconds_or(timeouts.readiness_seconds, defaults.readiness, "render.timeouts.readiness_seconds")?,
        images: seconds_or(timeouts.images_seconds, defaults.images, "render.timeouts.images_seconds")?,
        diagrams: seconds_or(timeouts.diagrams_seconds, defaults.diagrams, "render.timeouts.diagrams_seconds")?,
        math: seconds_or(timeouts.math_seconds, defaults.math, "render.timeouts.math_seconds")?,
        poll: millis_or(timeouts.poll_ms, defaults.poll, "render.timeouts.poll_ms")?,
        settle: timeouts.settle_ms.map(Duration::from_millis).unwrap_or(defaults.settle),
    };

    Ok(RenderSettings {
        assets_dir,
        chrome_path,
        temp_dir,
        debug: render.debug.unwrap_or(false),
        launch_timeout: seconds(
            timeouts.launch_seconds,
            DEFAULT_LAUNCH_TIMEOUT_SECS,
            "render.timeouts.launch_seconds",
        )?,
        waits,
    })
}

fn build_convert_settings(cli: RawConvertSettings) -> Result<ConvertSettings, LoadError> {
    let output_dir = cli
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    if output_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("cli.output_dir", "path must not be empty"));
    }

    Ok(ConvertSettings {
        output_dir,
        resolution: parse_resolution(
            cli.resolution.as_deref(),
            DEFAULT_CLI_RESOLUTION,
            "cli.resolution",
        )?,
        session_budget: seconds(
            cli.session_budget_seconds,
            DEFAULT_CLI_SESSION_BUDGET_SECS,
            "cli.session_budget_seconds",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    body_limit_bytes: Option<u64>,
    graceful_shutdown_seconds: Option<u64>,
    public_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    assets_dir: Option<PathBuf>,
    chrome_path: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    debug: Option<bool>,
    default_resolution: Option<String>,
    session_budget_seconds: Option<u64>,
    timeouts: RawTimeoutSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTimeoutSettings {
    launch_seconds: Option<u64>,
    readiness_seconds: Option<u64>,
    images_seconds: Option<u64>,
    diagrams_seconds: Option<u64>,
    math_seconds: Option<u64>,
    poll_ms: Option<u64>,
    settle_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawConvertSettings {
    output_dir: Option<PathBuf>,
    resolution: Option<String>,
    session_budget_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_resolution(
    value: Option<&str>,
    default: &str,
    key: &'static str,
) -> Result<Resolution, LoadError> {
    value
        .unwrap_or(default)
        .parse::<Resolution>()
        .map_err(|err| LoadError::invalid(key, err.to_string()))
}

fn seconds(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    seconds_or(value, Duration::from_secs(default), key)
}

fn seconds_or(
    value: Option<u64>,
    default: Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value {
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn millis_or(
    value: Option<u64>,
    default: Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value {
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(default),
    }
}

fn absolute(path: PathBuf, key: &'static str) -> Result<PathBuf, LoadError> {
    if path.is_absolute() {
        return Ok(path);
    }
    std::path::absolute(Path::new(&path))
        .map_err(|err| LoadError::invalid(key, format!("cannot resolve `{}`: {err}", path.display())))
}

#[cfg(test)]
mod tests;
