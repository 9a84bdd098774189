//! Presentation layer: the shielded connection
//!
//! Confidentiality and integrity for the command/response exchange.
//! Records are AES-128-CCM sealed with an 8-byte MAC; the nonce is the
//! session's 4-byte nonce prefix followed by the record sequence number,
//! so no nonce ever repeats within a session. The session key block is
//! derived by a hello/finished handshake from the platform binding
//! secret. A MAC failure is answered with an integrity alert and a
//! bounded number of retransmissions; the session never survives an
//! exhausted alert budget.

pub mod session;

mod handshake;

use phylax_pal::{Clock, ControlPin, CryptOps, Datastore, Delay, I2cBus};

use crate::config::Config;
use crate::error::StackError;
use crate::transport::Transport;
use session::Session;

/// Record header: SCTR byte plus big-endian sequence number
pub const PRL_HEADER_SIZE: usize = 5;

/// MAC length appended to every protected record
pub const PRL_MAC_SIZE: usize = 8;

/// Header plus MAC
pub const PRL_OVERHEAD_SIZE: usize = PRL_HEADER_SIZE + PRL_MAC_SIZE;

/// CCM nonce length (prefix + sequence)
pub const NONCE_LENGTH: usize = 8;

/// Largest command or response payload of one exchange
pub const MAX_APDU_SIZE: usize = 1536;

/// Protocol version negotiated with a pre-shared platform binding secret
pub const PROTOCOL_VERSION_PRE_SHARED_SECRET: u8 = 0x01;

pub(crate) const RECORD_BUF_SIZE: usize = MAX_APDU_SIZE + PRL_OVERHEAD_SIZE;

// SCTR protocol families
pub const SCTR_HANDSHAKE: u8 = 0x00;
pub const SCTR_RECORD: u8 = 0x20;
pub const SCTR_ALERT: u8 = 0x40;
pub const SCTR_MANAGE: u8 = 0x60;

// Handshake messages
pub const MSG_HELLO: u8 = 0x00;
pub const MSG_FINISHED: u8 = 0x08;

// Complete alert SCTR bytes
pub const ALERT_FATAL: u8 = SCTR_ALERT;
pub const ALERT_INTEGRITY: u8 = SCTR_ALERT | 0x04;

// Complete manage-context SCTR bytes
pub const MANAGE_SAVE: u8 = SCTR_MANAGE;
pub const MANAGE_SAVED: u8 = SCTR_MANAGE | 0x04;
pub const MANAGE_RESTORE: u8 = SCTR_MANAGE | 0x08;
pub const MANAGE_RESTORED: u8 = SCTR_MANAGE | 0x0C;

/// Length of the slave hello message
pub const SLAVE_HELLO_LEN: usize = 2 + RANDOM_LEN + SEQ_LEN;

/// Random contributed by the slave hello
pub const RANDOM_LEN: usize = 32;

/// Sequence number field length
pub const SEQ_LEN: usize = 4;

/// Plaintext carried by a finished message
pub const FINISHED_PLAIN_LEN: usize = RANDOM_LEN + SEQ_LEN;

/// Complete finished record length
pub const FINISHED_RECORD_LEN: usize = PRL_HEADER_SIZE + FINISHED_PLAIN_LEN + PRL_MAC_SIZE;

/// PRF label for session-key derivation
pub const PRF_LABEL: &[u8] = b"Platform Binding";

/// Platform binding secret length
pub const SHARED_SECRET_LEN: usize = 64;

/// Per-transaction protection level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtectionLevel {
    /// Neither direction protected
    None,
    /// Command (master → slave) sealed
    Command,
    /// Response (slave → master) sealed
    Response,
    /// Both directions sealed
    Full,
}

impl ProtectionLevel {
    /// SCTR protection bits
    pub fn bits(self) -> u8 {
        match self {
            ProtectionLevel::None => 0,
            ProtectionLevel::Command => 1,
            ProtectionLevel::Response => 2,
            ProtectionLevel::Full => 3,
        }
    }

    pub fn protects_command(self) -> bool {
        matches!(self, ProtectionLevel::Command | ProtectionLevel::Full)
    }

    pub fn protects_response(self) -> bool {
        matches!(self, ProtectionLevel::Response | ProtectionLevel::Full)
    }
}

/// Protection request for one transceive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Protection {
    /// Which directions to seal
    pub level: ProtectionLevel,
    /// Force a fresh handshake before this exchange
    pub renegotiate: bool,
}

impl Protection {
    pub const fn new(level: ProtectionLevel) -> Self {
        Self {
            level,
            renegotiate: false,
        }
    }

    /// Re-establish the secure channel before the exchange
    pub const fn renegotiating(level: ProtectionLevel) -> Self {
        Self {
            level,
            renegotiate: true,
        }
    }
}

impl From<ProtectionLevel> for Protection {
    fn from(level: ProtectionLevel) -> Self {
        Protection::new(level)
    }
}

/// Associated data bound into every sealed record
pub fn associated_data(sctr: u8, sequence: u32, version: u8, payload_len: u16) -> [u8; 8] {
    let mut ad = [0u8; 8];
    ad[0] = sctr;
    ad[1..5].copy_from_slice(&sequence.to_be_bytes());
    ad[5] = version;
    ad[6..8].copy_from_slice(&payload_len.to_be_bytes());
    ad
}

/// Presentation layer state
pub struct Presentation<B, D, K, C, S, R, V> {
    tl: Transport<B, D, K, R, V>,
    crypt: C,
    store: S,
    session: Option<Session>,
    protocol_version: u8,
    retransmit_budget: u8,
    record: [u8; RECORD_BUF_SIZE],
    rx_record: [u8; RECORD_BUF_SIZE],
}

enum RecordOutcome {
    Done(usize),
    MacFailure,
    IntegrityAlert,
    FatalAlert,
    Invalid,
}

impl<B, D, K, C, S, R, V> Presentation<B, D, K, C, S, R, V>
where
    B: I2cBus,
    D: Delay,
    K: Clock,
    C: CryptOps,
    S: Datastore,
    R: ControlPin,
    V: ControlPin,
{
    pub fn new(tl: Transport<B, D, K, R, V>, crypt: C, store: S, config: &Config) -> Self {
        Self {
            tl,
            crypt,
            store,
            session: None,
            protocol_version: PROTOCOL_VERSION_PRE_SHARED_SECRET,
            retransmit_budget: config.prl_retransmit_attempts,
            record: [0u8; RECORD_BUF_SIZE],
            rx_record: [0u8; RECORD_BUF_SIZE],
        }
    }

    /// Access the transport layer (init, reset paths)
    pub fn transport(&mut self) -> &mut Transport<B, D, K, R, V> {
        &mut self.tl
    }

    /// Initialization state of the transport layer
    pub fn init_state(&self) -> crate::transport::InitState {
        self.tl.init_state()
    }

    /// True when a negotiated session exists
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Sequence number of the last sealed record sent, if any.
    /// Diagnostic view; sequence numbers never repeat within a session.
    pub fn master_sequence(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.master_seq)
    }

    /// Drop the live session, zeroizing its key material
    pub fn clear_session(&mut self) {
        self.session = None;
    }

    /// Exchange a command and response with the selected protection
    ///
    /// Returns the response payload length written into `rx`. The
    /// handshake happens lazily when the protection level needs a
    /// session and none is negotiated (or `renegotiate` is set).
    pub fn transceive(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        protection: Protection,
    ) -> Result<usize, StackError> {
        if tx.is_empty() || tx.len() > MAX_APDU_SIZE {
            return Err(StackError::Protocol);
        }

        let level = protection.level;
        if level != ProtectionLevel::None {
            let stale = self
                .session
                .as_ref()
                .map(|s| s.sequence_exhausted())
                .unwrap_or(true);
            if protection.renegotiate || stale {
                self.handshake()?;
            }
        }

        let sctr = SCTR_RECORD | level.bits();
        let mut mac_failures = 0u8;
        let mut retransmits = 0u8;

        let len = self.build_record(tx, level)?;
        let mut rlen = self.exchange(len)?;

        loop {
            match self.open_record(rlen, level, sctr, rx)? {
                RecordOutcome::Done(n) => return Ok(n),
                RecordOutcome::MacFailure => {
                    // Never accept or retry with this data; alert the
                    // slave and let it retransmit, a bounded number of
                    // times
                    mac_failures += 1;
                    if mac_failures > self.retransmit_budget {
                        self.clear_session();
                        return Err(StackError::Session);
                    }
                    #[cfg(feature = "defmt")]
                    defmt::warn!("prl: record MAC failure, sending integrity alert");
                    self.record[0] = ALERT_INTEGRITY;
                    rlen = self.exchange(1)?;
                }
                RecordOutcome::IntegrityAlert => {
                    // The slave could not verify our record; retransmit
                    // under a fresh sequence number
                    if !level.protects_command() {
                        return Err(self.fail_session());
                    }
                    retransmits += 1;
                    if retransmits > self.retransmit_budget {
                        self.clear_session();
                        return Err(StackError::Session);
                    }
                    let len = self.build_record(tx, level)?;
                    rlen = self.exchange(len)?;
                }
                RecordOutcome::FatalAlert | RecordOutcome::Invalid => {
                    return Err(self.fail_session());
                }
            }
        }
    }

    /// Seal (or frame) the outbound payload into the record buffer
    fn build_record(&mut self, tx: &[u8], level: ProtectionLevel) -> Result<usize, StackError> {
        let sctr = SCTR_RECORD | level.bits();
        if level.protects_command() {
            let session = self.session.as_mut().ok_or(StackError::Session)?;
            // Monotonic sequence; uniqueness of the nonce within the
            // session depends on this increment
            session.master_seq += 1;
            let seq = session.master_seq;

            let ad = associated_data(sctr, seq, self.protocol_version, tx.len() as u16);
            let nonce = session.keys.enc_nonce(seq);
            self.record[0] = sctr;
            self.record[1..PRL_HEADER_SIZE].copy_from_slice(&seq.to_be_bytes());
            let sealed = self
                .crypt
                .encrypt_aes128_ccm(
                    &session.keys.enc_key,
                    &nonce,
                    &ad,
                    tx,
                    &mut self.record[PRL_HEADER_SIZE..PRL_HEADER_SIZE + tx.len() + PRL_MAC_SIZE],
                )
                .map_err(|_| StackError::Protocol)?;
            Ok(PRL_HEADER_SIZE + sealed)
        } else {
            self.record[0] = sctr;
            self.record[1..1 + tx.len()].copy_from_slice(tx);
            Ok(1 + tx.len())
        }
    }

    /// Validate and unseal a received record
    fn open_record(
        &mut self,
        rlen: usize,
        level: ProtectionLevel,
        sent_sctr: u8,
        out: &mut [u8],
    ) -> Result<RecordOutcome, StackError> {
        if rlen == 0 {
            return Ok(RecordOutcome::Invalid);
        }
        let sctr = self.rx_record[0];

        if rlen == 1 && sctr == ALERT_FATAL {
            return Ok(RecordOutcome::FatalAlert);
        }
        if rlen == 1 && sctr == ALERT_INTEGRITY {
            return Ok(RecordOutcome::IntegrityAlert);
        }
        if sctr != sent_sctr {
            return Ok(RecordOutcome::Invalid);
        }

        if level.protects_response() {
            if rlen <= PRL_OVERHEAD_SIZE {
                return Ok(RecordOutcome::Invalid);
            }
            let seq = u32::from_be_bytes([
                self.rx_record[1],
                self.rx_record[2],
                self.rx_record[3],
                self.rx_record[4],
            ]);
            let budget = u32::from(self.retransmit_budget);
            let session = match self.session.as_mut() {
                Some(session) => session,
                None => return Ok(RecordOutcome::Invalid),
            };
            // Replays and far-future numbers are both fatal; alerts may
            // advance the slave a few records, hence the window
            if seq <= session.slave_seq || seq > session.slave_seq.saturating_add(budget) {
                return Ok(RecordOutcome::Invalid);
            }

            let plain_len = rlen - PRL_OVERHEAD_SIZE;
            if plain_len > out.len() {
                return Err(StackError::Memory);
            }
            let ad = associated_data(sctr, seq, self.protocol_version, plain_len as u16);
            let nonce = session.keys.dec_nonce(seq);
            match self.crypt.decrypt_aes128_ccm(
                &session.keys.dec_key,
                &nonce,
                &ad,
                &self.rx_record[PRL_HEADER_SIZE..rlen],
                out,
            ) {
                Ok(n) => {
                    session.slave_seq = seq;
                    Ok(RecordOutcome::Done(n))
                }
                Err(phylax_pal::CryptError::MacMismatch) => Ok(RecordOutcome::MacFailure),
                Err(_) => Ok(RecordOutcome::Invalid),
            }
        } else {
            if rlen <= 1 {
                return Ok(RecordOutcome::Invalid);
            }
            let plain_len = rlen - 1;
            if plain_len > out.len() {
                return Err(StackError::Memory);
            }
            out[..plain_len].copy_from_slice(&self.rx_record[1..rlen]);
            Ok(RecordOutcome::Done(plain_len))
        }
    }

    /// Run one transport exchange of the staged record
    fn exchange(&mut self, len: usize) -> Result<usize, StackError> {
        match self.tl.transceive(&self.record[..len], &mut self.rx_record) {
            Ok(n) => Ok(n),
            Err(StackError::Protocol) => Err(self.fail_session()),
            Err(e) => Err(e),
        }
    }

    /// A broken exchange invalidates the session; without one it is a
    /// plain protocol error
    fn fail_session(&mut self) -> StackError {
        if self.session.is_some() {
            self.clear_session();
            StackError::Session
        } else {
            StackError::Protocol
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protection_bits_match_wire_values() {
        assert_eq!(ProtectionLevel::None.bits(), 0);
        assert_eq!(ProtectionLevel::Command.bits(), 1);
        assert_eq!(ProtectionLevel::Response.bits(), 2);
        assert_eq!(ProtectionLevel::Full.bits(), 3);
    }

    #[test]
    fn protection_direction_predicates() {
        assert!(ProtectionLevel::Command.protects_command());
        assert!(!ProtectionLevel::Command.protects_response());
        assert!(ProtectionLevel::Response.protects_response());
        assert!(ProtectionLevel::Full.protects_command());
        assert!(ProtectionLevel::Full.protects_response());
        assert!(!ProtectionLevel::None.protects_command());
    }

    #[test]
    fn associated_data_layout() {
        let ad = associated_data(0x23, 0x0A0B0C0D, 1, 0x0120);
        assert_eq!(ad, [0x23, 0x0A, 0x0B, 0x0C, 0x0D, 0x01, 0x01, 0x20]);
    }

    #[test]
    fn overhead_is_header_plus_mac() {
        assert_eq!(PRL_OVERHEAD_SIZE, 13);
        assert_eq!(FINISHED_RECORD_LEN, 49);
        assert_eq!(SLAVE_HELLO_LEN, 38);
    }
}
