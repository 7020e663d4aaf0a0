//! Default values shared by the client and server endpoints.

use std::time::Duration;

// =============================================================================
// HANDSHAKE TIMING
// =============================================================================

/// Handshake retransmission interval used when none is configured.
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// BUFFERS
// =============================================================================

/// Receive buffer size used by callers that do not pick their own.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 4096;

/// Largest payload a single datagram can carry over UDP/IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65507;
