//! Shielded-session key material and persistence
//!
//! A handshake derives a 40-byte key block from the platform binding
//! secret; the block splits into directional AES-128 keys and 4-byte
//! nonce prefixes. Key material is zeroized when the session ends, and
//! can round-trip through the datastore for power-cycle persistence.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use phylax_pal::crypt::AES128_KEY_LEN;

/// PRF output length for a full key block
pub const KEY_BLOCK_LEN: usize = 40;

/// Nonce prefix length inside the key block
pub const NONCE_PREFIX_LEN: usize = 4;

/// Renegotiate before a sequence counter passes this value
pub const SEQUENCE_THRESHOLD: u32 = 0xFFFF_FFF0;

/// Directional keys and nonce prefixes of one shielded session
///
/// Key-block layout (PRF output order): encrypt key, decrypt key,
/// encrypt nonce prefix, decrypt nonce prefix.
#[derive(Clone)]
pub struct KeyBlock {
    pub enc_key: [u8; AES128_KEY_LEN],
    pub dec_key: [u8; AES128_KEY_LEN],
    pub enc_nonce_prefix: [u8; NONCE_PREFIX_LEN],
    pub dec_nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

impl KeyBlock {
    /// Split a raw 40-byte PRF output into the directional parts
    pub fn from_prf_output(block: &[u8; KEY_BLOCK_LEN]) -> Self {
        let mut enc_key = [0u8; AES128_KEY_LEN];
        let mut dec_key = [0u8; AES128_KEY_LEN];
        let mut enc_nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        let mut dec_nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        enc_key.copy_from_slice(&block[0..16]);
        dec_key.copy_from_slice(&block[16..32]);
        enc_nonce_prefix.copy_from_slice(&block[32..36]);
        dec_nonce_prefix.copy_from_slice(&block[36..40]);
        Self {
            enc_key,
            dec_key,
            enc_nonce_prefix,
            dec_nonce_prefix,
        }
    }

    /// Form the 8-byte CCM nonce for an outbound record
    pub fn enc_nonce(&self, sequence: u32) -> [u8; 8] {
        nonce(&self.enc_nonce_prefix, sequence)
    }

    /// Form the 8-byte CCM nonce for an inbound record
    pub fn dec_nonce(&self, sequence: u32) -> [u8; 8] {
        nonce(&self.dec_nonce_prefix, sequence)
    }
}

fn nonce(prefix: &[u8; NONCE_PREFIX_LEN], sequence: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(prefix);
    out[4..].copy_from_slice(&sequence.to_be_bytes());
    out
}

impl Zeroize for KeyBlock {
    fn zeroize(&mut self) {
        self.enc_key.zeroize();
        self.dec_key.zeroize();
        self.enc_nonce_prefix.zeroize();
        self.dec_nonce_prefix.zeroize();
    }
}

impl Drop for KeyBlock {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Live negotiated session state
pub struct Session {
    pub keys: KeyBlock,
    /// Sequence number of the last record we sent
    pub master_seq: u32,
    /// Sequence number of the last record accepted from the slave
    pub slave_seq: u32,
}

impl Session {
    /// True when a counter is close enough to wrapping that the session
    /// must be renegotiated before the next record
    pub fn sequence_exhausted(&self) -> bool {
        self.master_seq >= SEQUENCE_THRESHOLD || self.slave_seq >= SEQUENCE_THRESHOLD
    }
}

/// Datastore image of a saved session (postcard-encoded)
#[derive(Serialize, Deserialize)]
pub struct SavedSession {
    pub enc_key: [u8; AES128_KEY_LEN],
    pub dec_key: [u8; AES128_KEY_LEN],
    pub enc_nonce_prefix: [u8; NONCE_PREFIX_LEN],
    pub dec_nonce_prefix: [u8; NONCE_PREFIX_LEN],
    pub master_seq: u32,
    pub slave_seq: u32,
}

/// Serialized size upper bound for the datastore record
pub const SAVED_SESSION_MAX_LEN: usize = 64;

impl SavedSession {
    pub fn from_session(session: &Session) -> Self {
        Self {
            enc_key: session.keys.enc_key,
            dec_key: session.keys.dec_key,
            enc_nonce_prefix: session.keys.enc_nonce_prefix,
            dec_nonce_prefix: session.keys.dec_nonce_prefix,
            master_seq: session.master_seq,
            slave_seq: session.slave_seq,
        }
    }

    pub fn into_session(self) -> Session {
        Session {
            keys: KeyBlock {
                enc_key: self.enc_key,
                dec_key: self.dec_key,
                enc_nonce_prefix: self.enc_nonce_prefix,
                dec_nonce_prefix: self.dec_nonce_prefix,
            },
            master_seq: self.master_seq,
            slave_seq: self.slave_seq,
        }
    }
}

impl Zeroize for SavedSession {
    fn zeroize(&mut self) {
        self.enc_key.zeroize();
        self.dec_key.zeroize();
        self.enc_nonce_prefix.zeroize();
        self.dec_nonce_prefix.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> [u8; KEY_BLOCK_LEN] {
        core::array::from_fn(|i| i as u8)
    }

    #[test]
    fn key_block_split_matches_layout() {
        let keys = KeyBlock::from_prf_output(&block());
        assert_eq!(keys.enc_key[0], 0);
        assert_eq!(keys.dec_key[0], 16);
        assert_eq!(keys.enc_nonce_prefix, [32, 33, 34, 35]);
        assert_eq!(keys.dec_nonce_prefix, [36, 37, 38, 39]);
    }

    #[test]
    fn nonce_is_prefix_then_big_endian_sequence() {
        let keys = KeyBlock::from_prf_output(&block());
        let nonce = keys.enc_nonce(0x0102_0304);
        assert_eq!(nonce, [32, 33, 34, 35, 1, 2, 3, 4]);
    }

    #[test]
    fn saved_session_roundtrip() {
        let session = Session {
            keys: KeyBlock::from_prf_output(&block()),
            master_seq: 7,
            slave_seq: 9,
        };
        let mut buf = [0u8; SAVED_SESSION_MAX_LEN];
        let used = postcard::to_slice(&SavedSession::from_session(&session), &mut buf)
            .unwrap()
            .len();
        let restored: SavedSession = postcard::from_bytes(&buf[..used]).unwrap();
        let restored = restored.into_session();
        assert_eq!(restored.master_seq, 7);
        assert_eq!(restored.slave_seq, 9);
        assert_eq!(restored.keys.enc_key, session.keys.enc_key);
    }

    #[test]
    fn sequence_threshold_detects_exhaustion() {
        let mut session = Session {
            keys: KeyBlock::from_prf_output(&block()),
            master_seq: 0,
            slave_seq: 0,
        };
        assert!(!session.sequence_exhausted());
        session.master_seq = SEQUENCE_THRESHOLD;
        assert!(session.sequence_exhausted());
    }
}
