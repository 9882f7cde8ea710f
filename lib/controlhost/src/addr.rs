use std::{fmt, num::ParseIntError, str::FromStr};

use snafu::{ResultExt as _, Snafu};

/// Default ControlHost port.
pub const DEFAULT_PORT: u16 = 5553;

/// An address error.
#[derive(Debug, Snafu, Eq, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum AddressError {
    /// The host part of the address was empty.
    #[snafu(display("invalid address '{}': host cannot be empty", address))]
    EmptyHost {
        /// Offending address.
        address: String,
    },

    /// The port could not be parsed.
    #[snafu(display("invalid address '{}': invalid port: {}", address, source))]
    InvalidPort {
        /// Offending address.
        address: String,

        /// Source of the error.
        source: ParseIntError,
    },

    /// A bracketed IPv6 literal was not terminated, or was followed by something other than a port.
    #[snafu(display("invalid address '{}': malformed bracketed host", address))]
    MalformedBracket {
        /// Offending address.
        address: String,
    },
}

/// A ControlHost server address.
///
/// In textual form, addresses are written as `host[:port]`. When the port is omitted, [`DEFAULT_PORT`] is used. IPv6
/// literals must be enclosed in brackets when a port is given (`[::1]:5553`); a bare IPv6 literal is taken to have no
/// port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostAddress {
    host: String,
    port: u16,
}

impl HostAddress {
    /// Creates a new `HostAddress`.
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for HostAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_port = |port: &str| port.parse::<u16>().context(InvalidPort { address: s });

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or(AddressError::MalformedBracket { address: s.into() })?;
            let port = match after {
                "" => DEFAULT_PORT,
                _ => match after.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => return Err(AddressError::MalformedBracket { address: s.into() }),
                },
            };
            (host, port)
        } else {
            match s.split_once(':') {
                // More than one colon without brackets: a bare IPv6 literal.
                Some((_, rest)) if rest.contains(':') => (s, DEFAULT_PORT),
                Some((host, port)) => (host, parse_port(port)?),
                None => (s, DEFAULT_PORT),
            }
        };

        if host.is_empty() {
            return Err(AddressError::EmptyHost { address: s.into() });
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> HostAddress {
        s.parse().expect("should be valid address")
    }

    #[test]
    fn host_only() {
        assert_eq!(parse("localhost"), HostAddress::new("localhost", DEFAULT_PORT));
        assert_eq!(parse("192.168.0.1"), HostAddress::new("192.168.0.1", DEFAULT_PORT));
    }

    #[test]
    fn host_and_port() {
        assert_eq!(parse("ligier.example.org:5554"), HostAddress::new("ligier.example.org", 5554));
    }

    #[test]
    fn ipv6() {
        assert_eq!(parse("[::1]:6000"), HostAddress::new("::1", 6000));
        assert_eq!(parse("[::1]"), HostAddress::new("::1", DEFAULT_PORT));
        assert_eq!(parse("fe80::1"), HostAddress::new("fe80::1", DEFAULT_PORT));
        assert_eq!(parse("[::1]:6000").to_string(), "[::1]:6000");
    }

    #[test]
    fn invalid() {
        assert!(matches!("".parse::<HostAddress>(), Err(AddressError::EmptyHost { .. })));
        assert!(matches!(":5553".parse::<HostAddress>(), Err(AddressError::EmptyHost { .. })));
        assert!(matches!("host:port".parse::<HostAddress>(), Err(AddressError::InvalidPort { .. })));
        assert!(matches!("host:70000".parse::<HostAddress>(), Err(AddressError::InvalidPort { .. })));
        assert!(matches!("[::1".parse::<HostAddress>(), Err(AddressError::MalformedBracket { .. })));
        assert!(matches!("[::1]x".parse::<HostAddress>(), Err(AddressError::MalformedBracket { .. })));
    }

    #[test]
    fn display() {
        assert_eq!(parse("localhost").to_string(), "localhost:5553");
    }
}
