//! Enumerated configuration options.

use std::fmt;
use std::ops::BitOr;

/// Which side of the connection an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Connects to one server.
    Client,
    /// Accepts many peers on one socket.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Peer certificate verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// Do not request or check the peer certificate.
    #[default]
    None,
    /// Check the peer certificate if one is presented.
    Optional,
    /// Fail the handshake unless the peer presents a valid certificate.
    Required,
}

/// DTLS protocol version selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// DTLS 1.0 only.
    Dtls1_0,
    /// DTLS 1.2 only.
    Dtls1_2,
    /// Highest version both sides support.
    Any,
}

impl ProtocolVersion {
    /// Default selector for a role: clients pin DTLS 1.2, servers accept any.
    pub fn default_for(role: Role) -> Self {
        match role {
            Role::Client => ProtocolVersion::Dtls1_2,
            Role::Server => ProtocolVersion::Any,
        }
    }
}

/// Flags for building the local certificate chain.
///
/// Bit values follow the OpenSSL `SSL_BUILD_CHAIN_FLAG_*` constants so an
/// engine can pass [`bits`](Self::bits) through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CertChainOptions(u32);

impl CertChainOptions {
    /// Build with the engine's defaults.
    pub const NONE: Self = Self(0);
    /// Use the chain certificates as untrusted intermediates.
    pub const UNTRUSTED: Self = Self(0x1);
    /// Leave the root out of the built chain.
    pub const NO_ROOT: Self = Self(0x2);
    /// Only check the existing chain, do not rebuild it.
    pub const CHECK: Self = Self(0x4);
    /// Keep a chain that fails verification.
    pub const IGNORE_ERROR: Self = Self(0x8);
    /// Clear verification errors from the engine's error queue.
    pub const CLEAR_ERROR: Self = Self(0x10);

    /// Raw flag bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CertChainOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
