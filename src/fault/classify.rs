//! Turning transport faults into multiplexer decisions.

use std::io;

use crate::core::{FaultKind, FaultPhase, TransportFault};

/// How the multiplexer treats a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Expected "not yet" condition. Never surfaced.
    Transient,
    /// The peer is gone or confused. The session is removed without
    /// consulting recovery hooks.
    ProtocolNoise,
    /// The session is dropped and the fault is offered to the recovery hook
    /// for its phase.
    Fatal,
}

/// Phase-aware fault classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassifier {
    suppress_ragged_eofs: bool,
}

impl ErrorClassifier {
    /// Create a classifier.
    ///
    /// With `suppress_ragged_eofs`, a peer that disappears mid-read without a
    /// close notification is treated as noise instead of a fatal fault.
    pub fn new(suppress_ragged_eofs: bool) -> Self {
        Self {
            suppress_ragged_eofs,
        }
    }

    /// Classify `fault` as seen during `phase`.
    pub fn classify(&self, phase: FaultPhase, fault: &TransportFault) -> FaultClass {
        match fault.kind() {
            FaultKind::WouldBlock | FaultKind::RetransmitPending | FaultKind::ReadTimeout => {
                FaultClass::Transient
            }
            FaultKind::Io(kind) if is_transient_io(kind) => FaultClass::Transient,
            FaultKind::UnexpectedMessage if phase == FaultPhase::Read => FaultClass::ProtocolNoise,
            FaultKind::RaggedEof if phase == FaultPhase::Read && self.suppress_ragged_eofs => {
                FaultClass::ProtocolNoise
            }
            FaultKind::UnexpectedMessage
            | FaultKind::RaggedEof
            | FaultKind::Protocol
            | FaultKind::Closed
            | FaultKind::Io(_) => FaultClass::Fatal,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(true)
    }
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}
