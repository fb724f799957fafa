//! Server configuration.
//!
//! [`ServerConfig`] is the validated, immutable record a server is built
//! from. [`ServerSpecs`] reads the same values from `SERVER_HTTP_*`
//! environment variables (or flags) with `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::Error;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 7784;
pub const DEFAULT_GRACEFUL_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Pause between the shutdown signal and closing the listener.
    pub graceful_delay: Duration,
    /// Upper bound on draining in-flight connections.
    pub graceful_timeout: Duration,
    /// Bounds reading the request body.
    pub read_timeout: Duration,
    /// Bounds handler execution.
    pub write_timeout: Duration,
    /// Bounds reading HTTP/1 request headers.
    pub header_timeout: Duration,
    /// Served as `/openapi.json` when set.
    pub openapi: Option<PathBuf>,
    /// Exposes `/debug/pprof/` endpoints.
    pub profiling: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            graceful_delay: DEFAULT_GRACEFUL_DELAY,
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
            read_timeout: DEFAULT_HTTP_TIMEOUT,
            write_timeout: DEFAULT_HTTP_TIMEOUT,
            header_timeout: DEFAULT_HTTP_TIMEOUT,
            openapi: None,
            profiling: false,
        }
    }
}

impl ServerConfig {
    /// Reads `SERVER_HTTP_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, Error> {
        let specs = ServerSpecs::try_parse_from(["httpkit"])
            .map_err(|e| Error::Config(e.to_string()))?;
        let config = specs.into_config();
        config.validate()?;
        Ok(config)
    }

    /// `host:port`, as handed to the listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Splits `host:port` into the host and port fields.
    pub fn set_addr(&mut self, addr: &str) -> Result<(), Error> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("address `{addr}` has no port")))?;
        let port = port
            .parse()
            .map_err(|_| Error::Config(format!("address `{addr}` has an invalid port")))?;
        self.host = host.to_owned();
        self.port = port;
        Ok(())
    }

    /// Sets read, write and header timeouts at once.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
        self.write_timeout = timeout;
        self.header_timeout = timeout;
    }

    pub fn validate(&self) -> Result<(), Error> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if host.contains(char::is_whitespace) || host.contains('/') {
            return Err(Error::Config(format!("address `{}` is not a valid host", self.addr())));
        }
        for (name, value) in [
            ("read timeout", self.read_timeout),
            ("write timeout", self.write_timeout),
            ("header timeout", self.header_timeout),
            ("graceful timeout", self.graceful_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

/// Environment / command-line form of [`ServerConfig`].
#[derive(Debug, Clone, Parser)]
#[command(name = "httpkit", about = "HTTP server settings")]
pub struct ServerSpecs {
    /// Listen host
    #[arg(long = "http-host", env = "SERVER_HTTP_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Listen port
    #[arg(long = "http-port", env = "SERVER_HTTP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Delay before the listener closes on shutdown (e.g. `3s`, `500ms`)
    #[arg(long, env = "SERVER_HTTP_GRACEFUL_DELAY", default_value = "3s", value_parser = parse_duration)]
    pub graceful_delay: Duration,

    /// Bound on draining in-flight requests
    #[arg(long, env = "SERVER_HTTP_GRACEFUL_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub graceful_timeout: Duration,

    /// Read, write and header timeout
    #[arg(long = "http-timeout", env = "SERVER_HTTP_TIMEOUT", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// OpenAPI document served at /openapi.json
    #[arg(long, env = "SERVER_HTTP_OPENAPI")]
    pub openapi: Option<PathBuf>,

    /// Expose /debug/pprof/ endpoints
    #[arg(long, env = "SERVER_HTTP_PROFILING", default_value = "false")]
    pub profiling: bool,
}

impl ServerSpecs {
    pub fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig {
            host: self.host,
            port: self.port,
            graceful_delay: self.graceful_delay,
            graceful_timeout: self.graceful_timeout,
            openapi: self.openapi,
            profiling: self.profiling,
            ..ServerConfig::default()
        };
        if let Some(timeout) = self.timeout {
            config.set_timeout(timeout);
        }
        config
    }
}

/// Parses `250ms`, `3s`, `2m`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, "s"),
    };
    let value: u64 = digits.parse().map_err(|_| format!("invalid duration `{s}`"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration `{s}` out of range")),
        _ => Err(format!("invalid duration unit in `{s}` (use ms, s or m)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.addr(), "localhost:7784");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Ok(Duration::from_secs(7)));
        assert!(parse_duration("3h").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("400000000000000000m").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = ServerConfig::default();
        config.set_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn empty_host_rejected() {
        let config = ServerConfig { host: " ".into(), ..ServerConfig::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn set_addr_splits_host_and_port() {
        let mut config = ServerConfig::default();
        config.set_addr("127.0.0.1:0").unwrap();
        assert_eq!((config.host.as_str(), config.port), ("127.0.0.1", 0));
        config.set_addr("[::1]:8080").unwrap();
        assert_eq!(config.addr(), "[::1]:8080");
        assert!(config.set_addr("nohost").is_err());
        assert!(config.set_addr("host:99999").is_err());
    }

    #[test]
    fn specs_apply_flags() {
        let specs = ServerSpecs::try_parse_from([
            "httpkit",
            "--http-host",
            "0.0.0.0",
            "--http-port",
            "9000",
            "--graceful-delay",
            "100ms",
            "--http-timeout",
            "2s",
            "--profiling",
        ])
        .unwrap();
        let config = specs.into_config();
        assert_eq!(config.addr(), "0.0.0.0:9000");
        assert_eq!(config.graceful_delay, Duration::from_millis(100));
        assert_eq!(config.graceful_timeout, DEFAULT_GRACEFUL_TIMEOUT);
        assert_eq!(config.write_timeout, Duration::from_secs(2));
        assert!(config.profiling);
    }
}
