//! Protected-update data set builder
//!
//! Assembles the provisioning payload a hardened slave accepts for
//! firmware, key and data object updates: a signed CBOR manifest
//! describing the payload and its cryptographic parameters, plus
//! numbered, digest-trailed payload fragments the chip can verify one
//! at a time without holding the whole payload in memory.
//!
//! The builder is independent of the live transport: it consumes the
//! PAL crypto traits only, so it runs anywhere a signer is available,
//! typically a provisioning host, not the device.

#![deny(unsafe_code)]

pub mod cbor;
pub mod error;
pub mod fragment;
pub mod manifest;

pub use error::DataSetError;
pub use fragment::{
    create_fragments, reassemble, FRAGMENT_DIGEST_LENGTH, FRAGMENT_NUMBER_LENGTH,
    MAX_PAYLOAD_FRAGMENT_SIZE, MAX_PAYLOAD_SIZE,
};
pub use manifest::{
    Confidentiality, ManifestParams, PayloadType, ProtectedUpdateDataSet, WriteType,
};
