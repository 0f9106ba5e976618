//! The port field of a target line.
//!
//! Zero is not dialable, so it is refused at parse time together with
//! anything that is not a `u16`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A non-zero TCP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Port(u16);

impl Port {
    /// `None` for port 0.
    #[inline]
    pub const fn new(port: u16) -> Option<Self> {
        match port {
            0 => None,
            n => Some(Self(n)),
        }
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Port {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(PortError::Empty),
            field => {
                let n: u16 = field
                    .parse()
                    .map_err(|_| PortError::InvalidFormat(field.to_string()))?;
                Self::new(n).ok_or(PortError::Zero)
            }
        }
    }
}

/// Why a port field was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("port 0 cannot be dialled")]
    Zero,
    #[error("'{0}' is not a port number")]
    InvalidFormat(String),
    #[error("empty port field")]
    Empty,
}
