//! Secure element host transport stack
//!
//! Layered I2C protocol carrying commands between a host and an
//! OPTIGA-style hardened security chip:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ SecureChannel (context, busy gate, resets)   │
//! ├──────────────────────────────────────────────┤
//! │ presentation  shielded connection (AES-CCM)  │
//! ├──────────────────────────────────────────────┤
//! │ transport     command chaining (PCTR)        │
//! ├──────────────────────────────────────────────┤
//! │ datalink      framing, seq/ack, retransmit   │
//! ├──────────────────────────────────────────────┤
//! │ phys          register protocol, busy polls  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The stack is generic over the [`phylax_pal`] traits; nothing here
//! touches hardware or a crypto library directly, so the whole protocol
//! runs against software doubles on a host.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod datalink;
pub mod error;
pub mod frame;
pub mod hash;
pub mod phys;
pub mod presentation;
pub mod transport;

// Re-export the application-facing surface at the crate root
pub use config::{Config, ResetKind, ResetPolicy, SessionContext};
pub use context::{Parts, SecureChannel};
pub use error::StackError;
pub use presentation::{Protection, ProtectionLevel};
pub use transport::InitState;
