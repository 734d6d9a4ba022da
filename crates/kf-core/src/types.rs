//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ParseError;

/// Login user when a host specification names none
pub const DEFAULT_USER: &str = "root";

/// SSH port when a host specification names none
pub const DEFAULT_PORT: u16 = 22;

/// Defaults applied to host specifications that omit user or port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDefaults {
    /// Login user
    pub user: String,
    /// SSH port
    pub port: u16,
}

impl Default for HostDefaults {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// A parsed `[user@]host[:port]` specification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostSpec {
    raw: String,
    user: String,
    host: String,
    port: u16,
}

impl HostSpec {
    /// Parse with the built-in defaults (`root`, port 22)
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        Self::parse_with(raw, &HostDefaults::default())
    }

    /// Parse, filling in missing user and port from `defaults`
    pub fn parse_with(raw: &str, defaults: &HostDefaults) -> Result<Self, ParseError> {
        let raw = raw.trim();
        let invalid = |reason: &str| ParseError::HostSpec {
            spec: raw.to_string(),
            reason: reason.to_string(),
        };

        let (user, rest) = match raw.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, raw),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (rest, None),
        };

        if let Some(user) = user {
            if user.is_empty() {
                return Err(invalid("empty user name"));
            }
            if !user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            {
                return Err(invalid("user name contains invalid characters"));
            }
        }

        if host.is_empty() {
            return Err(invalid("empty host name"));
        }
        let labels_ok = host.split('.').all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
        if !labels_ok {
            return Err(invalid("host name contains invalid characters"));
        }

        let port = match port {
            Some(port) => match port.parse::<u16>() {
                Ok(p) if p > 0 => p,
                _ => return Err(invalid("port must be a number between 1 and 65535")),
            },
            None => defaults.port,
        };

        Ok(Self {
            raw: raw.to_string(),
            user: user.map(str::to_string).unwrap_or_else(|| defaults.user.clone()),
            host: host.to_string(),
            port,
        })
    }

    /// The specification as written
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Login user
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// SSH port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` for socket connects and log lines
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let spec = HostSpec::parse("web1.example.com").unwrap();
        assert_eq!(spec.user(), "root");
        assert_eq!(spec.host(), "web1.example.com");
        assert_eq!(spec.port(), 22);
        assert_eq!(spec.to_string(), "web1.example.com");
    }

    #[test]
    fn test_parse_full() {
        let spec = HostSpec::parse("deploy@10.0.0.7:2222").unwrap();
        assert_eq!(spec.user(), "deploy");
        assert_eq!(spec.host(), "10.0.0.7");
        assert_eq!(spec.port(), 2222);
        assert_eq!(spec.address(), "10.0.0.7:2222");
    }

    #[test]
    fn test_parse_with_custom_defaults() {
        let defaults = HostDefaults {
            user: "admin".to_string(),
            port: 2200,
        };
        let spec = HostSpec::parse_with("db", &defaults).unwrap();
        assert_eq!(spec.user(), "admin");
        assert_eq!(spec.port(), 2200);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "@host", "user@", "host:", "host:0", "host:99999", "ho st", "a..b", "us$r@host"] {
            assert!(HostSpec::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }
}
