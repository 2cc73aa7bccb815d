use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::calc::{SummaryOptions, DEFAULT_CRITICAL_THRESHOLD};

/// EduTrack attendance daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "edutrackd", version, about = "EduTrack attendance daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the REST API (default).
    Serve,
    /// Speak newline-delimited JSON requests on stdin/stdout.
    Stdio,
}

#[derive(clap::Args, Debug, Clone)]
pub struct Config {
    /// Directory holding the SQLite database.
    #[arg(long, env = "EDUTRACK_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Address the REST API binds to.
    #[arg(long, env = "EDUTRACK_LISTEN", default_value = "127.0.0.1:5000")]
    pub listen: String,

    /// Upper bound on a single HTTP request.
    #[arg(long, env = "EDUTRACK_REQUEST_TIMEOUT_SECS", default_value_t = 15)]
    pub request_timeout_secs: u64,

    /// Require a bearer session and enforce teacher/student roles.
    #[arg(long, env = "EDUTRACK_REQUIRE_AUTH", default_value_t = false)]
    pub require_auth: bool,

    /// Lifetime of an issued session token.
    #[arg(long, env = "EDUTRACK_SESSION_TTL_HOURS", default_value_t = 12)]
    pub session_ttl_hours: i64,

    /// Percentage below which a student is flagged critical.
    #[arg(long, env = "EDUTRACK_CRITICAL_THRESHOLD", default_value_t = DEFAULT_CRITICAL_THRESHOLD)]
    pub critical_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            listen: "127.0.0.1:5000".to_string(),
            request_timeout_secs: 15,
            require_auth: false,
            session_ttl_hours: 12,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours.max(1))
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            critical_threshold: self.critical_threshold,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=100.0).contains(&self.critical_threshold) {
            anyhow::bail!(
                "critical threshold must be within 0..=100, got {}",
                self.critical_threshold
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_flags() {
        let cli = Cli::try_parse_from(["edutrackd"]).expect("parse");
        let d = Config::default();
        assert_eq!(cli.command, None);
        assert_eq!(cli.config.listen, d.listen);
        assert_eq!(cli.config.data_dir, d.data_dir);
        assert_eq!(cli.config.request_timeout_secs, d.request_timeout_secs);
        assert_eq!(cli.config.critical_threshold, d.critical_threshold);
        assert!(!cli.config.require_auth);
    }

    #[test]
    fn subcommand_and_overrides() {
        let cli = Cli::try_parse_from([
            "edutrackd",
            "--require-auth",
            "--critical-threshold",
            "60",
            "stdio",
        ])
        .expect("parse");
        assert_eq!(cli.command, Some(Command::Stdio));
        assert!(cli.config.require_auth);
        assert_eq!(cli.config.summary_options().critical_threshold, 60.0);
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let cfg = Config {
            critical_threshold: 120.0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
