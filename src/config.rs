//! Configuration Module
//!
//! Options come from command-line flags, environment variables (prefix
//! `FRAMECACHE_`, dashes become underscores) and an optional TOML file, in
//! that order of precedence, with built-in defaults last. Flag and env
//! handling is clap's; the file only fills options left unset.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "framecache.toml";

// == Command Line ==
#[derive(Debug, Parser, Default)]
#[command(name = "framecache", about = "In-memory cache server for tabular datasets")]
pub struct Options {
    /// Port to bind to
    #[arg(long, short = 'p', env = "FRAMECACHE_PORT")]
    pub port: Option<u16>,

    /// If set, an additional plain-HTTP listener serving only /status is
    /// started on this port, for health checks behind TLS
    #[arg(long, env = "FRAMECACHE_HTTP_STATUS_PORT")]
    pub http_status_port: Option<u16>,

    /// Max cache size in bytes
    #[arg(long, short = 's', env = "FRAMECACHE_SIZE")]
    pub size: Option<usize>,

    /// Max age of cached item in seconds, 0 = never expire
    #[arg(long, short = 'a', env = "FRAMECACHE_AGE")]
    pub age: Option<u64>,

    /// Number of items to store in the statistics ring buffers
    #[arg(long, short = 'b', env = "FRAMECACHE_STATISTICS_BUFFER_SIZE")]
    pub statistics_buffer_size: Option<usize>,

    /// Timeout in seconds for reading HTTP request headers
    #[arg(long, env = "FRAMECACHE_READ_HEADER_TIMEOUT")]
    pub read_header_timeout: Option<u64>,

    /// Timeout in seconds for reading the request body
    #[arg(long, env = "FRAMECACHE_READ_TIMEOUT")]
    pub read_timeout: Option<u64>,

    /// Timeout in seconds for handling a request and writing the response
    #[arg(long, env = "FRAMECACHE_WRITE_TIMEOUT")]
    pub write_timeout: Option<u64>,

    /// Enable HTTP profiling endpoints
    #[arg(long, env = "FRAMECACHE_HTTP_PPROF")]
    pub http_pprof: bool,

    /// Log every request on completion
    #[arg(long, env = "FRAMECACHE_REQUEST_LOG")]
    pub request_log: bool,

    /// Destination for logs: stderr, stdout or syslog
    #[arg(long, env = "FRAMECACHE_LOG_DESTINATION")]
    pub log_destination: Option<String>,

    /// Path to a CA file; if given, client certificates are verified
    /// against it
    #[arg(long, env = "FRAMECACHE_CA_FILE")]
    pub ca_file: Option<String>,

    /// Path to a PEM file with the server certificate, enables TLS
    #[arg(long, env = "FRAMECACHE_CERT_FILE")]
    pub cert_file: Option<String>,

    /// Path to the private key; defaults to cert-file
    #[arg(long, env = "FRAMECACHE_KEY_FILE")]
    pub key_file: Option<String>,

    /// Enable HTTP basic auth, format <user>:<password>
    #[arg(long, env = "FRAMECACHE_BASIC_AUTH")]
    pub basic_auth: Option<String>,

    /// Path to a TOML config file
    #[arg(long, short = 'c', env = "FRAMECACHE_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

// == Config File ==
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileConfig {
    port: Option<u16>,
    http_status_port: Option<u16>,
    size: Option<usize>,
    age: Option<u64>,
    statistics_buffer_size: Option<usize>,
    read_header_timeout: Option<u64>,
    read_timeout: Option<u64>,
    write_timeout: Option<u64>,
    http_pprof: Option<bool>,
    request_log: Option<bool>,
    log_destination: Option<String>,
    ca_file: Option<String>,
    cert_file: Option<String>,
    key_file: Option<String>,
    basic_auth: Option<String>,
}

// == Resolved Configuration ==
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub http_status_port: u16,
    pub size: usize,
    pub age: u64,
    pub statistics_buffer_size: usize,
    pub read_header_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub http_pprof: bool,
    pub request_log: bool,
    pub log_destination: String,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub basic_auth: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8888,
            http_status_port: 0,
            size: 1_000_000_000,
            age: 0,
            statistics_buffer_size: 1000,
            read_header_timeout: 20,
            read_timeout: 60,
            write_timeout: 120,
            http_pprof: false,
            request_log: false,
            log_destination: "stderr".to_string(),
            ca_file: None,
            cert_file: None,
            key_file: None,
            basic_auth: None,
        }
    }
}

impl Config {
    /// Parses flags and environment, merges the config file and applies
    /// defaults.
    pub fn load() -> Result<Config> {
        Config::resolve(Options::parse())
    }

    pub fn resolve(options: Options) -> Result<Config> {
        let file = match &options.config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("could not read config file {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("could not parse config file {}", path.display()))?
            }
            None => match std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
                Ok(content) => toml::from_str(&content)
                    .with_context(|| format!("could not parse config file {DEFAULT_CONFIG_FILE}"))?,
                // A missing default config file is fine
                Err(_) => FileConfig::default(),
            },
        };

        let defaults = Config::default();
        Ok(Config {
            port: options.port.or(file.port).unwrap_or(defaults.port),
            http_status_port: options
                .http_status_port
                .or(file.http_status_port)
                .unwrap_or(defaults.http_status_port),
            size: options.size.or(file.size).unwrap_or(defaults.size),
            age: options.age.or(file.age).unwrap_or(defaults.age),
            statistics_buffer_size: options
                .statistics_buffer_size
                .or(file.statistics_buffer_size)
                .unwrap_or(defaults.statistics_buffer_size),
            read_header_timeout: options
                .read_header_timeout
                .or(file.read_header_timeout)
                .unwrap_or(defaults.read_header_timeout),
            read_timeout: options
                .read_timeout
                .or(file.read_timeout)
                .unwrap_or(defaults.read_timeout),
            write_timeout: options
                .write_timeout
                .or(file.write_timeout)
                .unwrap_or(defaults.write_timeout),
            http_pprof: options.http_pprof || file.http_pprof.unwrap_or(false),
            request_log: options.request_log || file.request_log.unwrap_or(false),
            log_destination: options
                .log_destination
                .or(file.log_destination)
                .unwrap_or(defaults.log_destination),
            ca_file: options.ca_file.or(file.ca_file),
            cert_file: options.cert_file.or(file.cert_file),
            key_file: options.key_file.or(file.key_file),
            basic_auth: options.basic_auth.or(file.basic_auth),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8888);
        assert_eq!(config.size, 1_000_000_000);
        assert_eq!(config.age, 0);
        assert_eq!(config.statistics_buffer_size, 1000);
        assert_eq!(config.log_destination, "stderr");
        assert!(!config.request_log);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = std::env::temp_dir().join("framecache-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("conf.toml");
        std::fs::write(&path, "port = 1234\nsize = 5000000\nrequest-log = true\n").unwrap();

        let options = Options {
            port: Some(9999),
            config_file: Some(path),
            ..Options::default()
        };
        let config = Config::resolve(options).unwrap();

        assert_eq!(config.port, 9999);
        assert_eq!(config.size, 5_000_000);
        assert!(config.request_log);
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = std::env::temp_dir().join("framecache-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "not-an-option = 1\n").unwrap();

        let options = Options {
            config_file: Some(path),
            ..Options::default()
        };
        assert!(Config::resolve(options).is_err());
    }

    #[test]
    fn test_missing_explicit_file_errors() {
        let options = Options {
            config_file: Some(PathBuf::from("/no/such/file.toml")),
            ..Options::default()
        };
        assert!(Config::resolve(options).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let options = Options::parse_from([
            "framecache",
            "--port",
            "8080",
            "--size",
            "2000000",
            "--request-log",
            "--basic-auth",
            "u:p",
        ]);
        assert_eq!(options.port, Some(8080));
        assert_eq!(options.size, Some(2_000_000));
        assert!(options.request_log);
        assert_eq!(options.basic_auth.as_deref(), Some("u:p"));
    }
}
