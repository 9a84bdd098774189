//! Host-side PAL for the Phylax stack
//!
//! Software implementations of the `phylax-pal` traits for tests and
//! tooling: RustCrypto-backed primitives, std clocks, an in-memory
//! datastore, and a register-accurate simulated slave ([`sim::SimBus`])
//! that lets the whole transport stack run loopback on a development
//! machine.

pub mod crypt;
pub mod datastore;
pub mod sim;
pub mod time;

pub use crypt::{SoftCrypt, SoftSigner};
pub use datastore::{MemoryStore, SharedStore};
pub use sim::{PinProbe, SimBus, SimHandle, SimPin};
pub use time::{NullDelay, StdClock, StdDelay};
