//! Handshake and session persistence
//!
//! Hello/finished exchange deriving the session key block, and the
//! manage-context messages that let a negotiated session survive a power
//! cycle through the platform datastore.

use phylax_pal::{Clock, ControlPin, CryptOps, Datastore, DatastoreError, Delay, I2cBus, RecordId};
use zeroize::Zeroize;

use crate::error::StackError;
use crate::presentation::session::{KeyBlock, SavedSession, Session, KEY_BLOCK_LEN, SAVED_SESSION_MAX_LEN};
use crate::presentation::{
    associated_data, Presentation, FINISHED_PLAIN_LEN, FINISHED_RECORD_LEN, MANAGE_RESTORE,
    MANAGE_RESTORED, MANAGE_SAVE, MANAGE_SAVED, MSG_FINISHED, MSG_HELLO, PRF_LABEL,
    PRL_HEADER_SIZE, PROTOCOL_VERSION_PRE_SHARED_SECRET, RANDOM_LEN, SCTR_HANDSHAKE, SEQ_LEN,
    SHARED_SECRET_LEN, SLAVE_HELLO_LEN,
};

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
    /// Negotiate a fresh session key block with the slave
    ///
    /// Any failure leaves the layer without a session and surfaces
    /// [`StackError::Handshake`]; fatal link errors pass through.
    pub fn handshake(&mut self) -> Result<(), StackError> {
        #[cfg(feature = "defmt")]
        defmt::debug!("prl: handshake start");
        self.clear_session();
        // A fresh negotiation invalidates any persisted context
        let _ = self.store.erase(RecordId::SavedSession);

        // Hello
        self.record[0] = SCTR_HANDSHAKE | MSG_HELLO;
        self.record[1] = self.protocol_version;
        let rlen = self.exchange_handshake(2)?;
        if rlen != SLAVE_HELLO_LEN
            || self.rx_record[0] != (SCTR_HANDSHAKE | MSG_HELLO)
            || self.rx_record[1] != PROTOCOL_VERSION_PRE_SHARED_SECRET
        {
            return Err(StackError::Handshake);
        }
        let mut random = [0u8; RANDOM_LEN];
        random.copy_from_slice(&self.rx_record[2..2 + RANDOM_LEN]);
        let slave_seq = u32::from_be_bytes([
            self.rx_record[2 + RANDOM_LEN],
            self.rx_record[3 + RANDOM_LEN],
            self.rx_record[4 + RANDOM_LEN],
            self.rx_record[5 + RANDOM_LEN],
        ]);

        let keys = self.derive_key_block(&random)?;

        // Finished: prove possession by echoing the random and the
        // slave's sequence under the fresh encrypt key
        let sctr = SCTR_HANDSHAKE | MSG_FINISHED;
        let mut plain = [0u8; FINISHED_PLAIN_LEN];
        plain[..RANDOM_LEN].copy_from_slice(&random);
        plain[RANDOM_LEN..].copy_from_slice(&slave_seq.to_be_bytes());

        let ad = associated_data(sctr, slave_seq, self.protocol_version, FINISHED_PLAIN_LEN as u16);
        let nonce = keys.enc_nonce(slave_seq);
        self.record[0] = sctr;
        self.record[1..PRL_HEADER_SIZE].copy_from_slice(&slave_seq.to_be_bytes());
        self.crypt
            .encrypt_aes128_ccm(
                &keys.enc_key,
                &nonce,
                &ad,
                &plain,
                &mut self.record[PRL_HEADER_SIZE..FINISHED_RECORD_LEN],
            )
            .map_err(|_| StackError::Handshake)?;
        plain.zeroize();

        let rlen = self.exchange_handshake(FINISHED_RECORD_LEN)?;
        if rlen != FINISHED_RECORD_LEN || self.rx_record[0] != sctr {
            return Err(StackError::Handshake);
        }
        let master_seq = u32::from_be_bytes([
            self.rx_record[1],
            self.rx_record[2],
            self.rx_record[3],
            self.rx_record[4],
        ]);

        let ad = associated_data(sctr, master_seq, self.protocol_version, FINISHED_PLAIN_LEN as u16);
        let nonce = keys.dec_nonce(master_seq);
        let mut echoed = [0u8; FINISHED_PLAIN_LEN];
        self.crypt
            .decrypt_aes128_ccm(
                &keys.dec_key,
                &nonce,
                &ad,
                &self.rx_record[PRL_HEADER_SIZE..FINISHED_RECORD_LEN],
                &mut echoed,
            )
            .map_err(|_| StackError::Handshake)?;

        // The slave must echo our random and its own header sequence
        if echoed[..RANDOM_LEN] != random
            || echoed[RANDOM_LEN..] != master_seq.to_be_bytes()
        {
            echoed.zeroize();
            return Err(StackError::Handshake);
        }
        echoed.zeroize();

        self.session = Some(Session {
            keys,
            master_seq,
            slave_seq,
        });
        #[cfg(feature = "defmt")]
        defmt::debug!("prl: handshake complete");
        Ok(())
    }

    fn derive_key_block(&mut self, random: &[u8; RANDOM_LEN]) -> Result<KeyBlock, StackError> {
        let mut secret = [0u8; SHARED_SECRET_LEN];
        let read = self
            .store
            .read(RecordId::PlatformBindingSecret, &mut secret)
            .map_err(|_| StackError::Handshake)?;
        if read != SHARED_SECRET_LEN {
            secret.zeroize();
            return Err(StackError::Handshake);
        }

        let mut block = [0u8; KEY_BLOCK_LEN];
        let derived = self
            .crypt
            .tls_prf_sha256(&secret, PRF_LABEL, random, &mut block);
        secret.zeroize();
        derived.map_err(|_| StackError::Handshake)?;

        let keys = KeyBlock::from_prf_output(&block);
        block.zeroize();
        Ok(keys)
    }

    /// Persist the negotiated session and release it on the slave side
    ///
    /// No-op without a session. On success the live key material is
    /// zeroized; the datastore blob alone can revive the session.
    pub fn save_session(&mut self) -> Result<(), StackError> {
        if self.session.is_none() {
            return Ok(());
        }

        self.record[0] = MANAGE_SAVE;
        let rlen = self.exchange(1)?;
        if rlen != 1 || self.rx_record[0] != MANAGE_SAVED {
            return Err(self.fail_session());
        }

        let session = self.session.as_ref().ok_or(StackError::Session)?;
        let mut saved = SavedSession::from_session(session);
        let mut buf = [0u8; SAVED_SESSION_MAX_LEN];
        let written = postcard::to_slice(&saved, &mut buf)
            .map(|data| data.len())
            .map_err(|_| StackError::Protocol)?;
        saved.zeroize();

        let stored = self.store.write(RecordId::SavedSession, &buf[..written]);
        buf.zeroize();
        stored.map_err(|_| StackError::Protocol)?;

        self.clear_session();
        Ok(())
    }

    /// Revive a saved session if the slave still holds its half
    ///
    /// Returns `Ok(false)` when no usable blob exists or the slave
    /// refuses; the caller falls back to a fresh handshake. The blob is
    /// single-use either way.
    pub fn restore_session(&mut self) -> Result<bool, StackError> {
        let mut buf = [0u8; SAVED_SESSION_MAX_LEN];
        let len = match self.store.read(RecordId::SavedSession, &mut buf) {
            Ok(len) => len,
            Err(DatastoreError::NotFound) => return Ok(false),
            Err(_) => return Ok(false),
        };
        let saved: SavedSession = match postcard::from_bytes(&buf[..len]) {
            Ok(saved) => saved,
            Err(_) => {
                buf.zeroize();
                let _ = self.store.erase(RecordId::SavedSession);
                return Ok(false);
            }
        };
        buf.zeroize();

        self.record[0] = MANAGE_RESTORE;
        self.record[1..1 + SEQ_LEN].copy_from_slice(&saved.slave_seq.to_be_bytes());
        let rlen = self.exchange(1 + SEQ_LEN)?;

        // Single use: a stale blob must never be offered twice
        let _ = self.store.erase(RecordId::SavedSession);

        if rlen == 1 + SEQ_LEN && self.rx_record[0] == MANAGE_RESTORED {
            self.session = Some(saved.into_session());
            #[cfg(feature = "defmt")]
            defmt::debug!("prl: session restored");
            Ok(true)
        } else {
            // Slave's half is gone; force a fresh negotiation later
            #[cfg(feature = "defmt")]
            defmt::warn!("prl: session restore refused");
            Ok(false)
        }
    }

    /// Transport exchange during the handshake: every failure is a
    /// handshake failure except a fatal link error
    fn exchange_handshake(&mut self, len: usize) -> Result<usize, StackError> {
        match self.exchange(len) {
            Ok(n) => Ok(n),
            Err(StackError::Fatal) => Err(StackError::Fatal),
            Err(StackError::Busy) => Err(StackError::Busy),
            Err(_) => Err(StackError::Handshake),
        }
    }
}
