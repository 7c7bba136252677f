use clap::builder::PossibleValue;
use clap::Parser;

const HELP_TEXT: &str = "Suggestions and bug reports are greatly appreciated:
https://github.com/proxy-pool-manager/proxy-pool-manager/issues";

/// Scoring proxy pool manager: loads a static config, runs periodic
/// health checks, and serves a small REST API.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, after_help = HELP_TEXT)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    pub config: std::path::PathBuf,

    /// Address the REST API listens on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Seconds between background health-check cycles
    #[arg(long = "health-interval-secs", default_value = "10")]
    pub health_interval_secs: u64,

    /// Require a bearer token on `/proxies`, `/proxies/stats`, `/allocate`
    #[arg(long)]
    pub enable_auth: bool,

    /// Logging level
    #[arg(long = "log-level", default_value = "info",
        value_parser([
            PossibleValue::new("debug"),
            PossibleValue::new("info"),
            PossibleValue::new("warn"),
            PossibleValue::new("error")
        ])
    )]
    pub log_level: String,
}
