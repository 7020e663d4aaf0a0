//! Recovery hooks for fatal session faults.

use std::fmt;
use std::sync::Arc;

use crate::core::{FaultPhase, SessionFault};

/// A recovery hook's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Swallow the fault; the call continues as if nothing arrived.
    Ignore,
    /// Surface the fault to the caller.
    Propagate,
}

/// Caller-supplied decision points for fatal session faults.
///
/// Each method is a pure predicate over the fault. Unimplemented methods
/// propagate. Faults on the listening transport never reach a policy.
pub trait FaultPolicy: Send + Sync {
    /// A handshake (or handshake retransmission) failed.
    fn on_handshake_fault(&self, fault: &SessionFault) -> Verdict {
        let _ = fault;
        Verdict::Propagate
    }

    /// Decrypting application data failed.
    fn on_read_fault(&self, fault: &SessionFault) -> Verdict {
        let _ = fault;
        Verdict::Propagate
    }

    /// Sending application data failed.
    fn on_write_fault(&self, fault: &SessionFault) -> Verdict {
        let _ = fault;
        Verdict::Propagate
    }

    /// Dispatch on the fault's phase.
    fn verdict(&self, fault: &SessionFault) -> Verdict {
        match fault.phase() {
            FaultPhase::Handshake => self.on_handshake_fault(fault),
            FaultPhase::Read => self.on_read_fault(fault),
            FaultPhase::Write => self.on_write_fault(fault),
        }
    }
}

type Predicate = Arc<dyn Fn(&SessionFault) -> bool + Send + Sync>;

/// Closure-backed [`FaultPolicy`].
///
/// Each hook returns `true` to ignore the fault.
///
/// ```
/// use dtls_mux::core::FaultKind;
/// use dtls_mux::fault::FaultHooks;
///
/// let hooks = FaultHooks::new()
///     .on_handshake(|_| true)
///     .on_read(|fault| fault.kind() == FaultKind::Protocol);
/// ```
#[derive(Clone, Default)]
pub struct FaultHooks {
    handshake: Option<Predicate>,
    read: Option<Predicate>,
    write: Option<Predicate>,
}

impl FaultHooks {
    /// Hooks that propagate everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide handshake faults.
    pub fn on_handshake(
        mut self,
        hook: impl Fn(&SessionFault) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.handshake = Some(Arc::new(hook));
        self
    }

    /// Decide read faults.
    pub fn on_read(mut self, hook: impl Fn(&SessionFault) -> bool + Send + Sync + 'static) -> Self {
        self.read = Some(Arc::new(hook));
        self
    }

    /// Decide write faults.
    pub fn on_write(
        mut self,
        hook: impl Fn(&SessionFault) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.write = Some(Arc::new(hook));
        self
    }

    fn decide(hook: &Option<Predicate>, fault: &SessionFault) -> Verdict {
        match hook {
            Some(ignore) if ignore(fault) => Verdict::Ignore,
            _ => Verdict::Propagate,
        }
    }
}

impl FaultPolicy for FaultHooks {
    fn on_handshake_fault(&self, fault: &SessionFault) -> Verdict {
        Self::decide(&self.handshake, fault)
    }

    fn on_read_fault(&self, fault: &SessionFault) -> Verdict {
        Self::decide(&self.read, fault)
    }

    fn on_write_fault(&self, fault: &SessionFault) -> Verdict {
        Self::decide(&self.write, fault)
    }
}

impl fmt::Debug for FaultHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultHooks")
            .field("handshake", &self.handshake.is_some())
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// Ignores every fatal session fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreAll;

impl FaultPolicy for IgnoreAll {
    fn verdict(&self, _fault: &SessionFault) -> Verdict {
        Verdict::Ignore
    }
}
