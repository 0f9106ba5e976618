//! Target lines, protocol modes, and CIDR expansion.
//!
//! Each input line has the shape `<mode>,<address-spec>,<port>`:
//! - `tls,192.168.1.10,443`        Single host
//! - `smtp,mail.example.com,25`    Hostname
//! - `imap,10.0.0.0/24,143`        CIDR range, expanded to its hosts

use crate::types::{Port, PortError};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Protocol spoken before the TLS handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// TLS straight after the TCP connect.
    Tls,
    /// FTP upgraded with `AUTH TLS`.
    Ftp,
    /// IMAP upgraded with `STARTTLS`.
    Imap,
    /// POP3 upgraded with `STLS`.
    Pop3,
    /// SMTP upgraded with `STARTTLS`.
    Smtp,
}

impl Mode {
    /// Canonical identifier, as written in output records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tls => "tls",
            Self::Ftp => "ftp",
            Self::Imap => "imap",
            Self::Pop3 => "pop3",
            Self::Smtp => "smtp",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tls" | "https" => Ok(Self::Tls),
            "ftp" => Ok(Self::Ftp),
            "imap" => Ok(Self::Imap),
            "pop3" => Ok(Self::Pop3),
            "smtp" => Ok(Self::Smtp),
            _ => Err(TargetError::InvalidMode(s.to_string())),
        }
    }
}

/// A single endpoint to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub mode: Mode,
    /// Resolvable name or literal address.
    pub host: String,
    pub port: Port,
}

impl Target {
    /// Create a new target.
    pub fn new(mode: Mode, host: impl Into<String>, port: Port) -> Self {
        Self {
            mode,
            host: host.into(),
            port,
        }
    }

    /// The `host:port` string handed to the resolver, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.authority())
    }
}

/// Why an input line was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("does not parse correctly")]
    DoesNotParse,
    #[error("invalid mode '{0}'")]
    InvalidMode(String),
    #[error("invalid port: {0}")]
    InvalidPort(#[from] PortError),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
}

/// The address part of a target line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpec {
    /// A hostname or literal address, probed as written.
    Host(String),
    /// A network block, probed host by host.
    Cidr(IpNetwork),
}

impl AddressSpec {
    /// Parse the address field; anything containing `/` must be a CIDR block.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        if s.contains('/') {
            let network: IpNetwork = s
                .parse()
                .map_err(|e: ipnetwork::IpNetworkError| TargetError::InvalidCidr(e.to_string()))?;
            Ok(Self::Cidr(network))
        } else if s.is_empty() {
            Err(TargetError::DoesNotParse)
        } else {
            Ok(Self::Host(s.to_string()))
        }
    }

    /// Number of hosts this address expands to.
    pub fn host_count(&self) -> u128 {
        match self {
            Self::Host(_) => 1,
            Self::Cidr(IpNetwork::V4(net)) => {
                let size = 1u128 << (32 - u32::from(net.prefix()));
                if net.prefix() < 31 {
                    size - 2
                } else {
                    size
                }
            }
            Self::Cidr(IpNetwork::V6(net)) => {
                let bits = 128 - u32::from(net.prefix());
                1u128.checked_shl(bits).unwrap_or(u128::MAX)
            }
        }
    }

    /// Lazily iterate over every host this address names.
    ///
    /// IPv4 blocks wider than /31 skip their network and broadcast addresses.
    pub fn hosts(&self) -> Box<dyn Iterator<Item = String> + Send + '_> {
        match self {
            Self::Host(host) => Box::new(std::iter::once(host.clone())),
            Self::Cidr(network) => {
                let network = *network;
                Box::new(
                    network
                        .iter()
                        .filter(move |ip| is_usable_host(&network, ip))
                        .map(|ip| ip.to_string()),
                )
            }
        }
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(host) => write!(f, "{}", host),
            Self::Cidr(network) => write!(f, "{}", network),
        }
    }
}

fn is_usable_host(network: &IpNetwork, ip: &IpAddr) -> bool {
    if let (IpNetwork::V4(net), IpAddr::V4(addr)) = (network, ip) {
        if net.prefix() < 31 {
            return *addr != net.network() && *addr != net.broadcast();
        }
    }
    true
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLine {
    pub mode: Mode,
    pub address: AddressSpec,
    pub port: Port,
}

impl TargetLine {
    /// Parse `<mode>,<address-spec>,<port>`.
    pub fn parse(line: &str) -> Result<Self, TargetError> {
        if line.matches(',').count() != 2 {
            return Err(TargetError::DoesNotParse);
        }
        let mut fields = line.split(',').map(str::trim);
        let (Some(mode), Some(address), Some(port)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(TargetError::DoesNotParse);
        };

        let mode: Mode = mode.parse()?;
        let address = AddressSpec::parse(address)?;
        let port: Port = port.parse()?;

        Ok(Self {
            mode,
            address,
            port,
        })
    }

    /// Whether the address field is a CIDR block.
    pub fn is_range(&self) -> bool {
        matches!(self.address, AddressSpec::Cidr(_))
    }

    /// Lazily expand into one target per host.
    pub fn targets(&self) -> impl Iterator<Item = Target> + Send + '_ {
        self.address
            .hosts()
            .map(move |host| Target::new(self.mode, host, self.port))
    }
}

impl FromStr for TargetLine {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
