//! Simulated slave
//!
//! [`SimBus`] implements the PAL bus trait and models an OPTIGA-style
//! slave end to end: the register file, data-link framing with sequence
//! tracking, transport chaining, and a shielded-connection responder
//! sharing the platform binding secret. Fault-injection hooks corrupt
//! MACs or CRCs, report busy states, or kill the soft-reset register so
//! the stack's recovery paths can be exercised without hardware.
//!
//! The bus half is handed to the stack; the [`SimHandle`] half stays
//! with the test to flip faults and read counters.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use phylax_comms::frame::{Frame, SeqCtr};
use phylax_comms::presentation::session::{KeyBlock, KEY_BLOCK_LEN};
use phylax_comms::presentation::{
    associated_data, ALERT_FATAL, ALERT_INTEGRITY, FINISHED_PLAIN_LEN, FINISHED_RECORD_LEN,
    MANAGE_RESTORE, MANAGE_RESTORED, MANAGE_SAVE, MANAGE_SAVED, MSG_FINISHED, MSG_HELLO,
    PRL_HEADER_SIZE, PRL_MAC_SIZE, PROTOCOL_VERSION_PRE_SHARED_SECRET, RANDOM_LEN, SCTR_HANDSHAKE,
    SCTR_RECORD, SEQ_LEN,
};
use phylax_pal::{ControlPin, CryptOps, I2cBus};
use sha2::{Digest, Sha256};

use crate::crypt::SoftCrypt;

const REG_DATA: u8 = 0x80;
const REG_DATA_REG_LEN: u8 = 0x81;
const REG_I2C_STATE: u8 = 0x82;
const REG_BASE_ADDR: u8 = 0x84;
const REG_SOFT_RESET: u8 = 0x88;

const STATE_BUSY: u8 = 0x80;
const STATE_RESP_READY: u8 = 0x40;

const PCTR_PRESENCE: u8 = 0x08;
const CHAIN_NONE: u8 = 0x00;
const CHAIN_FIRST: u8 = 0x01;
const CHAIN_INTERMEDIATE: u8 = 0x02;
const CHAIN_LAST: u8 = 0x04;
const CHAIN_ERROR: u8 = 0x07;

/// The slave's record sequence numbers start in the upper half so they
/// never collide with the master's range within one session
const SLAVE_SEQ_BASE: u32 = 0x8000_0000;

#[derive(Clone)]
struct SlaveSession {
    keys: KeyBlock,
    last_master_seq: u32,
    slave_seq: u32,
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

struct SimState {
    // Register interface
    address: u8,
    selected_reg: u8,
    frame_size: u16,
    // Outbound frame queue: (wire bytes, clean copy for retransmits)
    out_frames: VecDeque<(Vec<u8>, Vec<u8>)>,
    last_popped: Option<Vec<u8>>,
    // Data-link counters
    tx_seq: u8,
    rx_seq: u8,
    // Transport reassembly
    rx_packet: Vec<u8>,
    // Shielded connection
    crypt: SoftCrypt,
    secret: [u8; 64],
    pending_hello: Option<([u8; RANDOM_LEN], u32)>,
    session: Option<SlaveSession>,
    saved: Option<SlaveSession>,
    last_record_sctr: u8,
    last_plain_response: Option<Vec<u8>>,
    random_counter: u64,
    responder: Responder,
    // Fault injection
    corrupt_mac_budget: u32,
    corrupt_crc_budget: u32,
    busy_polls: u32,
    fail_soft_reset: bool,
    fail_io: bool,
    refuse_restore: bool,
    // Counters
    soft_resets: u32,
    integrity_alerts_seen: u32,
    nacks_seen: u32,
    resyncs_seen: u32,
}

/// Bus half of the simulated slave; plugs into the stack as its I2C bus
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

/// Test-side handle: fault switches and counters
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimBus {
    /// Create a slave provisioned with the platform binding secret
    pub fn new(secret: [u8; 64]) -> (SimBus, SimHandle) {
        let state = Arc::new(Mutex::new(SimState {
            address: 0x30,
            selected_reg: REG_I2C_STATE,
            frame_size: 300,
            out_frames: VecDeque::new(),
            last_popped: None,
            tx_seq: 3,
            rx_seq: 3,
            rx_packet: Vec::new(),
            crypt: SoftCrypt::new(),
            secret,
            pending_hello: None,
            session: None,
            saved: None,
            last_record_sctr: 0,
            last_plain_response: None,
            random_counter: 0,
            responder: Box::new(|payload: &[u8]| payload.to_vec()),
            corrupt_mac_budget: 0,
            corrupt_crc_budget: 0,
            busy_polls: 0,
            fail_soft_reset: false,
            fail_io: false,
            refuse_restore: false,
            soft_resets: 0,
            integrity_alerts_seen: 0,
            nacks_seen: 0,
            resyncs_seen: 0,
        }));
        (
            SimBus {
                state: Arc::clone(&state),
            },
            SimHandle { state },
        )
    }
}

impl I2cBus for SimBus {
    type Error = ();

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), ()> {
        let mut state = self.state.lock().expect("sim state lock");
        if state.fail_io || address != state.address || data.is_empty() {
            return Err(());
        }
        state.handle_write(data)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), ()> {
        let mut state = self.state.lock().expect("sim state lock");
        if state.fail_io || address != state.address {
            return Err(());
        }
        state.handle_read(buf)
    }
}

impl SimState {
    fn handle_write(&mut self, data: &[u8]) -> Result<(), ()> {
        match data[0] {
            REG_DATA if data.len() > 1 => {
                let frame = data[1..].to_vec();
                self.process_frame(&frame);
                Ok(())
            }
            REG_DATA | REG_I2C_STATE => {
                self.selected_reg = data[0];
                Ok(())
            }
            REG_DATA_REG_LEN if data.len() == 3 => {
                let requested = u16::from_be_bytes([data[1], data[2]]);
                self.frame_size = requested.clamp(16, 300);
                Ok(())
            }
            REG_DATA_REG_LEN => {
                self.selected_reg = REG_DATA_REG_LEN;
                Ok(())
            }
            REG_BASE_ADDR if data.len() == 3 => {
                self.address = data[1] & 0x7F;
                Ok(())
            }
            REG_SOFT_RESET => {
                if self.fail_soft_reset {
                    return Err(());
                }
                self.soft_resets += 1;
                self.reset_link();
                self.session = None;
                self.pending_hello = None;
                Ok(())
            }
            _ => Err(()),
        }
    }

    fn handle_read(&mut self, buf: &mut [u8]) -> Result<(), ()> {
        match self.selected_reg {
            REG_I2C_STATE => {
                buf.fill(0);
                if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    buf[0] = STATE_BUSY;
                } else if let Some((frame, _)) = self.out_frames.front() {
                    buf[0] = STATE_RESP_READY;
                    let len = frame.len() as u16;
                    buf[2] = (len >> 8) as u8;
                    buf[3] = len as u8;
                }
                Ok(())
            }
            REG_DATA => {
                let (frame, clean) = self.out_frames.pop_front().ok_or(())?;
                let take = buf.len().min(frame.len());
                buf[..take].copy_from_slice(&frame[..take]);
                self.last_popped = Some(clean);
                Ok(())
            }
            REG_DATA_REG_LEN => {
                let bytes = self.frame_size.to_be_bytes();
                let take = buf.len().min(2);
                buf[..take].copy_from_slice(&bytes[..take]);
                Ok(())
            }
            _ => Err(()),
        }
    }

    fn reset_link(&mut self) {
        self.tx_seq = 3;
        self.rx_seq = 3;
        self.out_frames.clear();
        self.rx_packet.clear();
        self.last_popped = None;
    }

    fn process_frame(&mut self, bytes: &[u8]) {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(_) => {
                let next = (self.rx_seq + 1) & 3;
                self.enqueue_control(SeqCtr::Nack, next);
                return;
            }
        };

        if frame.is_control {
            match frame.seqctr {
                SeqCtr::Ack => {}
                SeqCtr::Nack => {
                    self.nacks_seen += 1;
                    if let Some(clean) = self.last_popped.clone() {
                        self.out_frames.push_front((clean.clone(), clean));
                    }
                }
                SeqCtr::Resync => {
                    self.resyncs_seen += 1;
                    self.reset_link();
                }
            }
            return;
        }

        // Data frame: duplicate numbers are re-acknowledged, new ones
        // accepted and delivered upward
        if frame.frame_nr != (self.rx_seq + 1) & 3 {
            let ack = self.rx_seq;
            self.enqueue_control(SeqCtr::Ack, ack);
            return;
        }
        self.rx_seq = frame.frame_nr;
        let ack = self.rx_seq;
        self.enqueue_control(SeqCtr::Ack, ack);
        let payload = frame.payload.to_vec();
        self.deliver_fragment(&payload);
    }

    fn deliver_fragment(&mut self, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        let chain = payload[0] & 0x07;
        match chain {
            CHAIN_NONE => {
                self.rx_packet = payload[1..].to_vec();
                self.finish_packet();
            }
            CHAIN_FIRST => self.rx_packet = payload[1..].to_vec(),
            CHAIN_INTERMEDIATE => self.rx_packet.extend_from_slice(&payload[1..]),
            CHAIN_LAST => {
                self.rx_packet.extend_from_slice(&payload[1..]);
                self.finish_packet();
            }
            CHAIN_ERROR => self.rx_packet.clear(),
            _ => self.rx_packet.clear(),
        }
    }

    fn finish_packet(&mut self) {
        let apdu = core::mem::take(&mut self.rx_packet);
        if let Some(response) = self.prl_handle(&apdu) {
            self.respond(&response);
        }
    }

    fn prl_handle(&mut self, apdu: &[u8]) -> Option<Vec<u8>> {
        let sctr = *apdu.first()?;
        match sctr {
            s if s == (SCTR_HANDSHAKE | MSG_HELLO) && apdu.len() == 2 => self.handle_hello(apdu),
            s if s == (SCTR_HANDSHAKE | MSG_FINISHED) => self.handle_finished(apdu),
            s if s & 0xE0 == SCTR_RECORD => self.handle_record(apdu),
            s if s == ALERT_INTEGRITY => {
                self.integrity_alerts_seen += 1;
                self.retransmit_last()
            }
            s if s == ALERT_FATAL => {
                self.session = None;
                None
            }
            s if s == MANAGE_SAVE && apdu.len() == 1 => self.handle_save(),
            s if s == MANAGE_RESTORE && apdu.len() == 1 + SEQ_LEN => self.handle_restore(apdu),
            _ => Some(vec![ALERT_FATAL]),
        }
    }

    fn handle_hello(&mut self, apdu: &[u8]) -> Option<Vec<u8>> {
        if apdu[1] != PROTOCOL_VERSION_PRE_SHARED_SECRET {
            return Some(vec![ALERT_FATAL]);
        }
        let random = self.next_random();
        let slave_seq = SLAVE_SEQ_BASE;
        self.pending_hello = Some((random, slave_seq));
        self.session = None;

        let mut reply = Vec::with_capacity(2 + RANDOM_LEN + SEQ_LEN);
        reply.push(SCTR_HANDSHAKE | MSG_HELLO);
        reply.push(PROTOCOL_VERSION_PRE_SHARED_SECRET);
        reply.extend_from_slice(&random);
        reply.extend_from_slice(&slave_seq.to_be_bytes());
        Some(reply)
    }

    fn handle_finished(&mut self, apdu: &[u8]) -> Option<Vec<u8>> {
        let sctr = SCTR_HANDSHAKE | MSG_FINISHED;
        let (random, slave_seq) = match self.pending_hello.take() {
            Some(pending) => pending,
            None => return Some(vec![ALERT_FATAL]),
        };
        if apdu.len() != FINISHED_RECORD_LEN {
            return Some(vec![ALERT_FATAL]);
        }
        let seq = u32::from_be_bytes([apdu[1], apdu[2], apdu[3], apdu[4]]);
        if seq != slave_seq {
            return Some(vec![ALERT_FATAL]);
        }

        let mut block = [0u8; KEY_BLOCK_LEN];
        if self
            .crypt
            .tls_prf_sha256(&self.secret, b"Platform Binding", &random, &mut block)
            .is_err()
        {
            return Some(vec![ALERT_FATAL]);
        }
        let keys = KeyBlock::from_prf_output(&block);

        let ad = associated_data(
            sctr,
            slave_seq,
            PROTOCOL_VERSION_PRE_SHARED_SECRET,
            FINISHED_PLAIN_LEN as u16,
        );
        let nonce = keys.enc_nonce(slave_seq);
        let mut plain = [0u8; FINISHED_PLAIN_LEN];
        if self
            .crypt
            .decrypt_aes128_ccm(
                &keys.enc_key,
                &nonce,
                &ad,
                &apdu[PRL_HEADER_SIZE..],
                &mut plain,
            )
            .is_err()
        {
            return Some(vec![ALERT_FATAL]);
        }
        if plain[..RANDOM_LEN] != random || plain[RANDOM_LEN..] != slave_seq.to_be_bytes() {
            return Some(vec![ALERT_FATAL]);
        }

        // Our finished message fixes the master's sequence baseline
        let master_seq_base = 0u32;
        let mut echoed = [0u8; FINISHED_PLAIN_LEN];
        echoed[..RANDOM_LEN].copy_from_slice(&random);
        echoed[RANDOM_LEN..].copy_from_slice(&master_seq_base.to_be_bytes());

        let ad = associated_data(
            sctr,
            master_seq_base,
            PROTOCOL_VERSION_PRE_SHARED_SECRET,
            FINISHED_PLAIN_LEN as u16,
        );
        let nonce = keys.dec_nonce(master_seq_base);
        let mut reply = vec![0u8; FINISHED_RECORD_LEN];
        reply[0] = sctr;
        reply[1..PRL_HEADER_SIZE].copy_from_slice(&master_seq_base.to_be_bytes());
        self.crypt
            .encrypt_aes128_ccm(
                &keys.dec_key,
                &nonce,
                &ad,
                &echoed,
                &mut reply[PRL_HEADER_SIZE..],
            )
            .ok()?;

        self.session = Some(SlaveSession {
            keys,
            last_master_seq: master_seq_base,
            slave_seq,
        });
        Some(reply)
    }

    fn handle_record(&mut self, apdu: &[u8]) -> Option<Vec<u8>> {
        let sctr = apdu[0];
        let level = sctr & 0x03;

        let payload = if level & 0x01 != 0 {
            if apdu.len() <= PRL_HEADER_SIZE + PRL_MAC_SIZE {
                return Some(vec![ALERT_FATAL]);
            }
            let seq = u32::from_be_bytes([apdu[1], apdu[2], apdu[3], apdu[4]]);
            let session = match self.session.as_mut() {
                Some(session) => session,
                None => return Some(vec![ALERT_FATAL]),
            };
            if seq <= session.last_master_seq {
                return Some(vec![ALERT_FATAL]);
            }
            let ciphertext = &apdu[PRL_HEADER_SIZE..];
            let plain_len = ciphertext.len() - PRL_MAC_SIZE;
            let ad = associated_data(
                sctr,
                seq,
                PROTOCOL_VERSION_PRE_SHARED_SECRET,
                plain_len as u16,
            );
            let nonce = session.keys.enc_nonce(seq);
            let mut plain = vec![0u8; plain_len];
            match self.crypt.decrypt_aes128_ccm(
                &session.keys.enc_key,
                &nonce,
                &ad,
                ciphertext,
                &mut plain,
            ) {
                Ok(_) => {
                    session.last_master_seq = seq;
                    plain
                }
                Err(_) => return Some(vec![ALERT_INTEGRITY]),
            }
        } else {
            apdu[1..].to_vec()
        };

        let response = (self.responder)(&payload);
        self.last_record_sctr = sctr;
        self.last_plain_response = Some(response.clone());
        Some(self.seal_response(sctr, &response))
    }

    fn seal_response(&mut self, sctr: u8, payload: &[u8]) -> Vec<u8> {
        if sctr & 0x02 != 0 {
            let session = match self.session.as_mut() {
                Some(session) => session,
                None => return vec![ALERT_FATAL],
            };
            session.slave_seq += 1;
            let seq = session.slave_seq;
            let ad = associated_data(
                sctr,
                seq,
                PROTOCOL_VERSION_PRE_SHARED_SECRET,
                payload.len() as u16,
            );
            let nonce = session.keys.dec_nonce(seq);
            let mut out = vec![0u8; PRL_HEADER_SIZE + payload.len() + PRL_MAC_SIZE];
            out[0] = sctr;
            out[1..PRL_HEADER_SIZE].copy_from_slice(&seq.to_be_bytes());
            if self
                .crypt
                .encrypt_aes128_ccm(
                    &session.keys.dec_key,
                    &nonce,
                    &ad,
                    payload,
                    &mut out[PRL_HEADER_SIZE..],
                )
                .is_err()
            {
                return vec![ALERT_FATAL];
            }
            if self.corrupt_mac_budget > 0 {
                self.corrupt_mac_budget -= 1;
                out[PRL_HEADER_SIZE] ^= 0x01;
            }
            out
        } else {
            let mut out = Vec::with_capacity(1 + payload.len());
            out.push(sctr);
            out.extend_from_slice(payload);
            out
        }
    }

    fn retransmit_last(&mut self) -> Option<Vec<u8>> {
        let sctr = self.last_record_sctr;
        match self.last_plain_response.clone() {
            Some(payload) => Some(self.seal_response(sctr, &payload)),
            None => Some(vec![ALERT_FATAL]),
        }
    }

    fn handle_save(&mut self) -> Option<Vec<u8>> {
        match self.session.take() {
            Some(session) => {
                self.saved = Some(session);
                Some(vec![MANAGE_SAVED])
            }
            None => Some(vec![ALERT_FATAL]),
        }
    }

    fn handle_restore(&mut self, apdu: &[u8]) -> Option<Vec<u8>> {
        let seq = u32::from_be_bytes([apdu[1], apdu[2], apdu[3], apdu[4]]);
        let matches = self
            .saved
            .as_ref()
            .map(|saved| saved.slave_seq == seq)
            .unwrap_or(false);
        if self.refuse_restore || !matches {
            self.saved = None;
            return Some(vec![ALERT_FATAL]);
        }
        self.session = self.saved.take();
        let mut reply = Vec::with_capacity(1 + SEQ_LEN);
        reply.push(MANAGE_RESTORED);
        reply.extend_from_slice(&seq.to_be_bytes());
        Some(reply)
    }

    fn respond(&mut self, apdu: &[u8]) {
        let capacity = self.frame_size as usize - 6;
        let total = apdu.len();
        let mut offset = 0usize;
        loop {
            let chunk = (total - offset).min(capacity);
            let remaining = total - offset;
            let chain = if offset == 0 && remaining <= capacity {
                CHAIN_NONE
            } else if offset == 0 {
                CHAIN_FIRST
            } else if remaining > capacity {
                CHAIN_INTERMEDIATE
            } else {
                CHAIN_LAST
            };

            let mut payload = Vec::with_capacity(1 + chunk);
            payload.push(chain | PCTR_PRESENCE);
            payload.extend_from_slice(&apdu[offset..offset + chunk]);
            self.enqueue_data_frame(&payload);

            offset += chunk;
            if offset >= total {
                break;
            }
        }
    }

    fn enqueue_data_frame(&mut self, payload: &[u8]) {
        self.tx_seq = (self.tx_seq + 1) & 3;
        let frame = match Frame::data(self.tx_seq, self.rx_seq, payload) {
            Ok(frame) => frame,
            Err(_) => return,
        };
        let mut buf = [0u8; 300];
        let len = match frame.encode(&mut buf) {
            Ok(len) => len,
            Err(_) => return,
        };
        let clean = buf[..len].to_vec();
        let wire = if self.corrupt_crc_budget > 0 {
            self.corrupt_crc_budget -= 1;
            let mut corrupted = clean.clone();
            let last = corrupted.len() - 1;
            corrupted[last] ^= 0x01;
            corrupted
        } else {
            clean.clone()
        };
        self.out_frames.push_back((wire, clean));
    }

    fn enqueue_control(&mut self, seqctr: SeqCtr, ack_nr: u8) {
        let frame = Frame::control(seqctr, ack_nr);
        let mut buf = [0u8; 8];
        if let Ok(len) = frame.encode(&mut buf) {
            let bytes = buf[..len].to_vec();
            self.out_frames.push_back((bytes.clone(), bytes));
        }
    }

    fn next_random(&mut self) -> [u8; RANDOM_LEN] {
        self.random_counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"phylax-sim-random");
        hasher.update(self.random_counter.to_be_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; RANDOM_LEN];
        out.copy_from_slice(&digest);
        out
    }
}

impl SimHandle {
    fn with<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut state = self.state.lock().expect("sim state lock");
        f(&mut state)
    }

    /// Another bus endpoint onto the same slave, for re-opening a stack
    /// after `close` consumed the previous one
    pub fn bus(&self) -> SimBus {
        SimBus {
            state: Arc::clone(&self.state),
        }
    }

    /// Corrupt the MAC of the next `count` protected responses
    pub fn corrupt_macs(&self, count: u32) {
        self.with(|s| s.corrupt_mac_budget = count);
    }

    /// Corrupt the CRC of the next `count` outbound frames
    pub fn corrupt_crcs(&self, count: u32) {
        self.with(|s| s.corrupt_crc_budget = count);
    }

    /// Report BUSY for the next `count` status polls
    pub fn report_busy(&self, count: u32) {
        self.with(|s| s.busy_polls = count);
    }

    /// Make the soft-reset register unresponsive
    pub fn fail_soft_reset(&self, fail: bool) {
        self.with(|s| s.fail_soft_reset = fail);
    }

    /// Kill all bus traffic
    pub fn fail_io(&self, fail: bool) {
        self.with(|s| s.fail_io = fail);
    }

    /// Refuse the next session-restore request
    pub fn refuse_restore(&self, refuse: bool) {
        self.with(|s| s.refuse_restore = refuse);
    }

    /// Replace the command responder (default echoes the command)
    pub fn set_responder(&self, responder: Responder) {
        self.with(|s| s.responder = responder);
    }

    /// Soft resets the slave has performed
    pub fn soft_resets(&self) -> u32 {
        self.with(|s| s.soft_resets)
    }

    /// Integrity alerts received from the master
    pub fn integrity_alerts_seen(&self) -> u32 {
        self.with(|s| s.integrity_alerts_seen)
    }

    /// NACK control frames received from the master
    pub fn nacks_seen(&self) -> u32 {
        self.with(|s| s.nacks_seen)
    }

    /// RESYNC control frames received from the master
    pub fn resyncs_seen(&self) -> u32 {
        self.with(|s| s.resyncs_seen)
    }

    /// True while the slave holds a live shielded session
    pub fn has_session(&self) -> bool {
        self.with(|s| s.session.is_some())
    }

    /// True while the slave holds a saved (suspended) session
    pub fn has_saved_session(&self) -> bool {
        self.with(|s| s.saved.is_some())
    }
}

/// Recorded control line with a toggle counter
pub struct SimPin {
    state: Arc<Mutex<PinState>>,
}

/// Test-side view of a [`SimPin`]
#[derive(Clone)]
pub struct PinProbe {
    state: Arc<Mutex<PinState>>,
}

struct PinState {
    level: bool,
    transitions: usize,
}

impl SimPin {
    pub fn new() -> (SimPin, PinProbe) {
        let state = Arc::new(Mutex::new(PinState {
            level: true,
            transitions: 0,
        }));
        (
            SimPin {
                state: Arc::clone(&state),
            },
            PinProbe { state },
        )
    }
}

impl ControlPin for SimPin {
    fn set_high(&mut self) {
        let mut state = self.state.lock().expect("pin state lock");
        if !state.level {
            state.level = true;
            state.transitions += 1;
        }
    }

    fn set_low(&mut self) {
        let mut state = self.state.lock().expect("pin state lock");
        if state.level {
            state.level = false;
            state.transitions += 1;
        }
    }
}

impl PinProbe {
    /// Level transitions seen on the line
    pub fn transitions(&self) -> usize {
        let state = self.state.lock().expect("pin state lock");
        state.transitions
    }

    /// Current line level
    pub fn is_high(&self) -> bool {
        let state = self.state.lock().expect("pin state lock");
        state.level
    }
}
