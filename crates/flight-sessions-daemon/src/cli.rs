//! Command-line arguments and config resolution.

use clap::Parser;
use flight_sessions_core::error::ConfigError;
use flight_sessions_core::SessionsConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flight-sessions-daemon")]
#[command(about = "Bearer-token session front-end for the SQL execution service")]
pub struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of concurrently open sessions
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Maximum number of outstanding bearer tokens (defaults to --max-sessions)
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Lifetime of issued bearer tokens, in seconds
    #[arg(long)]
    pub token_ttl_secs: Option<u64>,

    /// Interval between expired-token sweeps, in seconds
    #[arg(long)]
    pub reap_interval_secs: Option<u64>,
}

impl Args {
    /// Load the config file (or defaults) and apply flag overrides.
    pub fn resolve_config(&self) -> Result<SessionsConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SessionsConfig::load(path)?,
            None => SessionsConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_sessions) = self.max_sessions {
            config.max_sessions = max_sessions;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = Some(max_tokens);
        }
        if let Some(ttl) = self.token_ttl_secs {
            config.token_ttl_secs = ttl;
        }
        if let Some(interval) = self.reap_interval_secs {
            config.reap_interval_secs = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn no_flags_gives_defaults() {
        let args = Args::try_parse_from(["flight-sessions-daemon"]).unwrap();
        assert_eq!(args.resolve_config().unwrap(), SessionsConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "flight-sessions-daemon",
            "--host",
            "0.0.0.0",
            "-p",
            "9999",
            "--max-sessions",
            "4",
        ])
        .unwrap();
        let config = args.resolve_config().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9999);
        assert_eq!(config.max_sessions, 4);
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxSessions": 10, "tokenTtlSecs": 60}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::try_parse_from([
            "flight-sessions-daemon",
            "--config",
            path.as_str(),
            "--max-sessions",
            "3",
        ])
        .unwrap();
        let config = args.resolve_config().unwrap();
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.token_ttl_secs, 60);
    }

    #[test]
    fn zero_capacity_flag_is_rejected() {
        let args =
            Args::try_parse_from(["flight-sessions-daemon", "--max-sessions", "0"]).unwrap();
        assert!(matches!(
            args.resolve_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn max_tokens_flag_sets_token_table_size() {
        let args = Args::try_parse_from([
            "flight-sessions-daemon",
            "--max-sessions",
            "4",
            "--max-tokens",
            "16",
        ])
        .unwrap();
        let config = args.resolve_config().unwrap();
        assert_eq!(config.token_capacity(), 16);

        let args = Args::try_parse_from([
            "flight-sessions-daemon",
            "--max-sessions",
            "4",
            "--max-tokens",
            "2",
        ])
        .unwrap();
        assert!(matches!(
            args.resolve_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn non_numeric_port_fails_to_parse() {
        assert!(Args::try_parse_from(["flight-sessions-daemon", "--port", "http"]).is_err());
    }
}
