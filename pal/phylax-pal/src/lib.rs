//! Phylax Platform Abstraction Layer
//!
//! This crate defines the platform traits the transport stack is generic
//! over. A concrete PAL (MCU HAL bindings, or the software PAL in
//! `phylax-pal-host`) implements these traits; the stack itself never
//! touches hardware or a crypto library directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application                            │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  phylax-comms / phylax-update           │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  phylax-pal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ target MCU    │       │ phylax-pal-   │
//! │ bindings      │       │ host (std)    │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`i2c::I2cBus`] - raw bus transactions with the slave
//! - [`gpio::ControlPin`] - reset / VDD lines
//! - [`time::Delay`], [`time::Clock`] - bounded waits and deadlines
//! - [`crypt::CryptOps`] - AEAD + key derivation for the shielded channel
//! - [`crypt::SignOps`] - manifest signing for protected updates
//! - [`datastore::Datastore`] - persisted secrets and session blobs

#![no_std]
#![deny(unsafe_code)]

pub mod crypt;
pub mod datastore;
pub mod gpio;
pub mod i2c;
pub mod time;

// Re-export key traits at crate root for convenience
pub use crypt::{CryptError, CryptOps, SignAlgorithm, SignError, SignOps};
pub use datastore::{Datastore, DatastoreError, RecordId};
pub use gpio::ControlPin;
pub use i2c::I2cBus;
pub use time::{Clock, Delay};
