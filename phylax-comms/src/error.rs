//! Stack error taxonomy
//!
//! One error type is shared by every layer so the propagation policy is
//! visible in one place: physical transients are retried inside the
//! data-link layer, data-link failures surface to the presentation layer
//! which may force a re-handshake, and presentation/transport failures
//! reach the application verbatim. A MAC mismatch is never retried with
//! the same key.

/// Errors reported by the transport stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// The stack (or the slave) is busy; retry the call later.
    /// Non-fatal: no state was touched.
    Busy,
    /// Recoverable protocol error; the caller may retry or re-handshake
    Protocol,
    /// A buffer was too small for the data in flight; fatal to this
    /// operation only
    Memory,
    /// Unrecoverable link failure; the session requires a reset
    Fatal,
    /// Secure channel establishment failed
    Handshake,
    /// The established secure session is no longer valid; a new session
    /// must be negotiated
    Session,
}

impl core::fmt::Display for StackError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            StackError::Busy => "stack busy",
            StackError::Protocol => "protocol error",
            StackError::Memory => "buffer too small",
            StackError::Fatal => "fatal link error",
            StackError::Handshake => "handshake failed",
            StackError::Session => "session invalid",
        };
        f.write_str(msg)
    }
}
