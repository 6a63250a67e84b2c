//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{application::backend::BrowserConfig, domain::types::DEFAULT_FILTER_THRESHOLD};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pagefit";
const ENV_PREFIX: &str = "PAGEFIT";
const PORT_ENV: &str = "PORT";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;

/// Command-line arguments for the pagefit binary.
#[derive(Debug, Parser)]
#[command(
    name = "pagefit",
    version,
    about = "Fetch web pages and reduce them to their main content"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PAGEFIT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Crawl a single URL and print the record as JSON.
    Crawl(CrawlArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct BrowserOverrides {
    /// Override the navigation timeout.
    #[arg(long = "browser-navigation-timeout-seconds", value_name = "SECONDS")]
    pub navigation_timeout_seconds: Option<u64>,

    /// Override the user agent sent with every fetch.
    #[arg(long = "browser-user-agent", value_name = "AGENT")]
    pub user_agent: Option<String>,

    /// Override how many batch URLs are fetched at once.
    #[arg(long = "browser-batch-concurrency", value_name = "COUNT")]
    pub batch_concurrency: Option<usize>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub browser: BrowserOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,

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
}

#[derive(Debug, Args, Clone)]
pub struct CrawlArgs {
    #[command(flatten)]
    pub browser: BrowserOverrides,

    /// Page to crawl.
    #[arg(value_name = "URL")]
    pub url: String,

    /// Relevance threshold in [0, 1] used when pruning content.
    #[arg(long, default_value_t = DEFAULT_FILTER_THRESHOLD)]
    pub threshold: f64,

    /// Include the unfiltered page text in the output.
    #[arg(long = "include-raw", action = clap::ArgAction::SetTrue)]
    pub include_raw: bool,

    /// Wait for this selector before capturing the page.
    #[arg(long = "wait-for", value_name = "SELECTOR")]
    pub wait_for: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
///
/// The bare `PORT` variable wins over `PAGEFIT__SERVER__PORT`; `--port` wins over both.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .set_override_option("server.port", std::env::var(PORT_ENV).ok())?;

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Crawl(args)) => raw.apply_browser_overrides(&args.browser),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    browser: RawBrowserSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
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
        self.apply_browser_overrides(&overrides.browser);
    }

    fn apply_browser_overrides(&mut self, overrides: &BrowserOverrides) {
        if let Some(seconds) = overrides.navigation_timeout_seconds {
            self.browser.navigation_timeout_seconds = Some(seconds);
        }
        if let Some(agent) = overrides.user_agent.as_ref() {
            self.browser.user_agent = Some(agent.clone());
        }
        if let Some(count) = overrides.batch_concurrency {
            self.browser.batch_concurrency = Some(count);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            browser,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            browser: build_browser_settings(browser)?,
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

fn build_browser_settings(browser: RawBrowserSettings) -> Result<BrowserConfig, LoadError> {
    let defaults = BrowserConfig::default();

    // The session always runs headless with JavaScript on; the keys exist only to be checked.
    if browser.headless == Some(false) {
        return Err(LoadError::invalid(
            "browser.headless",
            "the fetch session always runs headless",
        ));
    }
    if browser.javascript == Some(false) {
        return Err(LoadError::invalid(
            "browser.javascript",
            "the fetch session always runs with JavaScript enabled",
        ));
    }

    let timeout_secs = browser
        .navigation_timeout_seconds
        .unwrap_or(defaults.navigation_timeout.as_secs());
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "browser.navigation_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let user_agent = match browser.user_agent {
        Some(agent) if agent.trim().is_empty() => {
            return Err(LoadError::invalid(
                "browser.user_agent",
                "must not be empty",
            ));
        }
        Some(agent) => agent.trim().to_string(),
        None => defaults.user_agent,
    };

    let batch_concurrency = browser
        .batch_concurrency
        .unwrap_or(defaults.batch_concurrency);
    if batch_concurrency == 0 {
        return Err(LoadError::invalid(
            "browser.batch_concurrency",
            "must be greater than zero",
        ));
    }

    Ok(BrowserConfig {
        headless: defaults.headless,
        javascript_enabled: defaults.javascript_enabled,
        navigation_timeout: Duration::from_secs(timeout_secs),
        user_agent,
        batch_concurrency,
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
struct RawBrowserSettings {
    headless: Option<bool>,
    javascript: Option<bool>,
    navigation_timeout_seconds: Option<u64>,
    user_agent: Option<String>,
    batch_concurrency: Option<usize>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
