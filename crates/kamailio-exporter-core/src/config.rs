//! Exporter configuration.
//!
//! Read once at startup and never mutated afterwards: where to reach Kamailio
//! (`Transport`), the constant labels stamped on every emitted metric, and the
//! optional deadline applied to each RPC round trip.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the `ctl` module's BINRPC unix socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/kamailio/kamailio_ctl";

/// Default BINRPC TCP port of the `ctl` module.
pub const DEFAULT_BINRPC_PORT: u16 = 3012;

/// Constant labels, ordered by name.
pub type ConstLabels = BTreeMap<String, String>;

/// How to reach the monitored Kamailio instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Local domain socket at the given path.
    Unix(PathBuf),
    /// TCP connection to `host:port`.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// Selects the transport kind.
    ///
    /// A non-empty `socket_path` takes precedence over `host`/`port`.
    pub fn select(socket_path: &str, host: &str, port: u16) -> Self {
        if socket_path.is_empty() {
            Transport::Tcp {
                host: host.to_string(),
                port,
            }
        } else {
            Transport::Unix(PathBuf::from(socket_path))
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Unix(path) => write!(f, "unix:{}", path.display()),
            Transport::Tcp { host, port } => write!(f, "tcp:{}:{}", host, port),
        }
    }
}

/// Process-wide exporter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub transport: Transport,
    pub const_labels: ConstLabels,
    /// Deadline for connect, write and read of a single RPC call. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Config {
    /// Creates a configuration without constant labels and without a deadline.
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            const_labels: ConstLabels::new(),
            timeout: None,
        }
    }

    /// Sets the constant labels attached to every metric.
    pub fn with_const_labels(mut self, labels: ConstLabels) -> Self {
        self.const_labels = labels;
        self
    }

    /// Sets the RPC deadline. `Duration::ZERO` disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            None
        } else {
            Some(timeout)
        };
        self
    }
}

/// Parses a `name=value` constant label.
///
/// The name is trimmed and must not be empty; the value is kept verbatim
/// apart from surrounding whitespace and may be empty.
pub fn parse_label(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid label '{}': expected name=value", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid label '{}': empty name", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_prefers_socket_path_when_set() {
        let t = Transport::select("/run/kamailio/ctl", "10.0.0.1", 3012);
        assert_eq!(t, Transport::Unix(PathBuf::from("/run/kamailio/ctl")));
    }

    #[test]
    fn select_falls_back_to_tcp_on_empty_socket_path() {
        let t = Transport::select("", "10.0.0.1", 2049);
        assert_eq!(
            t,
            Transport::Tcp {
                host: "10.0.0.1".to_string(),
                port: 2049
            }
        );
        assert_eq!(t.to_string(), "tcp:10.0.0.1:2049");
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let cfg = Config::new(Transport::select("/tmp/ctl", "", 0))
            .with_timeout(Duration::ZERO);
        assert!(cfg.timeout.is_none());

        let cfg = cfg.with_timeout(Duration::from_secs(3));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn parse_label_splits_on_first_equals() {
        assert_eq!(
            parse_label("env=prod").unwrap(),
            ("env".to_string(), "prod".to_string())
        );
        assert_eq!(
            parse_label(" dsn = a=b ").unwrap(),
            ("dsn".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_label("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
    }

    #[test]
    fn parse_label_rejects_missing_name_or_separator() {
        assert!(parse_label("novalue").is_err());
        assert!(parse_label("=value").is_err());
    }
}
