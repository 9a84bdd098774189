//! Chip-resumable hash context
//!
//! The slave can suspend a running hash and hand its internal state
//! back to the host, freeing the single on-chip hash engine between
//! `start`/`update`/`finalize` commands. The host treats that state as
//! an opaque blob: it stores and returns it, never inspects or edits
//! it. [`HashContext`] enforces the ownership hand-off: while the
//! computation is with the chip the host holds nothing mutable.

use heapless::Vec;

use crate::error::StackError;

/// Exported SHA-256 engine state upper bound, in bytes
pub const HASH_CONTEXT_LENGTH_SHA_256: usize = 209;

/// Hash algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    /// Exported state size for this algorithm
    pub fn context_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => HASH_CONTEXT_LENGTH_SHA_256,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Ownership {
    /// No computation started yet
    Idle,
    /// The chip owns the running state
    Chip,
    /// The host holds the suspended, opaque state
    Host,
}

/// Opaque, chip-side-resumable hash state
#[derive(Debug)]
pub struct HashContext {
    algorithm: HashAlgorithm,
    state: Vec<u8, HASH_CONTEXT_LENGTH_SHA_256>,
    ownership: Ownership,
}

impl HashContext {
    /// Fresh SHA-256 context; the first `start` command moves it to the
    /// chip
    pub fn sha256() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            state: Vec::new(),
            ownership: Ownership::Idle,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// True while the chip owns the running computation
    pub fn is_with_chip(&self) -> bool {
        self.ownership == Ownership::Chip
    }

    /// Hand the context to the chip (hash start, or resume of a
    /// suspended state). Returns the opaque blob to send, empty for a
    /// fresh context.
    pub fn hand_to_chip(&mut self) -> Result<&[u8], StackError> {
        if self.ownership == Ownership::Chip {
            return Err(StackError::Busy);
        }
        self.ownership = Ownership::Chip;
        Ok(&self.state)
    }

    /// Store the state the chip exported when suspending
    ///
    /// Only legal while the chip owns the computation; the blob is
    /// taken as-is and never modified afterwards.
    pub fn suspend(&mut self, exported: &[u8]) -> Result<(), StackError> {
        if self.ownership != Ownership::Chip {
            return Err(StackError::Protocol);
        }
        if exported.len() > self.algorithm.context_len() {
            return Err(StackError::Memory);
        }
        self.state.clear();
        self.state
            .extend_from_slice(exported)
            .map_err(|_| StackError::Memory)?;
        self.ownership = Ownership::Host;
        Ok(())
    }

    /// Finish the computation: the chip consumed the state, the context
    /// returns to idle and the stale blob is dropped
    pub fn finalize(&mut self) -> Result<(), StackError> {
        if self.ownership != Ownership::Chip {
            return Err(StackError::Protocol);
        }
        self.state.clear();
        self.ownership = Ownership::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_round_trip() {
        let mut ctx = HashContext::sha256();
        assert!(!ctx.is_with_chip());

        // Fresh hand-off carries no state
        assert_eq!(ctx.hand_to_chip().unwrap().len(), 0);
        assert!(ctx.is_with_chip());

        // Chip suspends, host stores the opaque blob
        ctx.suspend(&[0xAB; 32]).unwrap();
        assert!(!ctx.is_with_chip());

        // Resume sends the same bytes back
        assert_eq!(ctx.hand_to_chip().unwrap(), &[0xAB; 32]);
        ctx.finalize().unwrap();
        assert!(!ctx.is_with_chip());
    }

    #[test]
    fn no_double_hand_off() {
        let mut ctx = HashContext::sha256();
        ctx.hand_to_chip().unwrap();
        assert!(matches!(ctx.hand_to_chip(), Err(StackError::Busy)));
    }

    #[test]
    fn suspend_requires_chip_ownership() {
        let mut ctx = HashContext::sha256();
        assert_eq!(ctx.suspend(&[1, 2, 3]), Err(StackError::Protocol));
    }

    #[test]
    fn oversized_state_rejected() {
        let mut ctx = HashContext::sha256();
        ctx.hand_to_chip().unwrap();
        let blob = [0u8; HASH_CONTEXT_LENGTH_SHA_256 + 1];
        assert_eq!(ctx.suspend(&blob), Err(StackError::Memory));
    }
}
