//! Data-link layer: reliable framing over the busy physical channel
//!
//! Frames carry modulo-4 send/receive counters. Every data frame is
//! answered: by a control ACK, a control NACK, or a piggybacked data
//! frame. Corrupt frames are NACKed, lost acknowledgements retransmitted
//! up to the configured budget, and as a last resort both sides resync
//! their counters with a RESYNC control frame. All loops are bounded by
//! the retry budgets and the shared transceive deadline.

use heapless::Vec;
use phylax_pal::{Clock, ControlPin, Delay, I2cBus};

use crate::config::{Config, ResetKind, DL_MAX_FRAME_SIZE};
use crate::error::StackError;
use crate::frame::{Frame, SeqCtr, MAX_FRAME_NUM, MAX_FRAME_PAYLOAD};
use crate::phys::Phys;

/// Payload of a received data frame
pub type RxPayload = Vec<u8, MAX_FRAME_PAYLOAD>;

/// Outcome of a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DlEvent {
    /// The slave acknowledged the frame; response not yet available
    TxSuccess,
    /// The slave acknowledged and piggybacked a response frame
    TxRx(RxPayload),
}

/// Data-link layer state
pub struct DataLink<B, D, K, R, V> {
    phys: Phys<B, D, R, V>,
    clock: K,
    tx_seq: u8,
    rx_seq: u8,
    retransmit_budget: u8,
    exit_timeout_ms: u32,
    deadline_ms: u64,
}

impl<B, D, K, R, V> DataLink<B, D, K, R, V>
where
    B: I2cBus,
    D: Delay,
    K: Clock,
    R: ControlPin,
    V: ControlPin,
{
    pub fn new(phys: Phys<B, D, R, V>, clock: K, config: &Config) -> Self {
        Self {
            phys,
            clock,
            tx_seq: MAX_FRAME_NUM,
            rx_seq: MAX_FRAME_NUM,
            retransmit_budget: config.dl_retransmit_attempts,
            exit_timeout_ms: config.exit_timeout_ms,
            deadline_ms: 0,
        }
    }

    /// Access to the physical layer (reset, address management)
    pub fn phys(&mut self) -> &mut Phys<B, D, R, V> {
        &mut self.phys
    }

    /// Reset both frame counters to their initial value
    pub fn reset_counters(&mut self) {
        self.tx_seq = MAX_FRAME_NUM;
        self.rx_seq = MAX_FRAME_NUM;
    }

    /// Arm the shared transceive deadline; called once per transport
    /// transceive
    pub fn arm_deadline(&mut self) {
        self.deadline_ms = self.clock.millis() + u64::from(self.exit_timeout_ms);
    }

    fn deadline_expired(&mut self) -> bool {
        self.clock.millis() > self.deadline_ms
    }

    fn next_rx(&self) -> u8 {
        (self.rx_seq + 1) & MAX_FRAME_NUM
    }

    fn send_raw(&mut self, frame: &Frame) -> Result<(), StackError> {
        let mut buf = [0u8; DL_MAX_FRAME_SIZE];
        let len = frame.encode(&mut buf).map_err(|_| StackError::Protocol)?;
        self.phys.send_frame(&buf[..len])
    }

    fn send_control(&mut self, seqctr: SeqCtr, ack_nr: u8) -> Result<(), StackError> {
        self.send_raw(&Frame::control(seqctr, ack_nr))
    }

    /// Send RESYNC and reset the counters on both sides
    fn resync(&mut self) -> Result<(), StackError> {
        #[cfg(feature = "defmt")]
        defmt::debug!("dl: resync");
        self.reset_counters();
        self.send_control(SeqCtr::Resync, 0)
    }

    /// Send one transport packet fragment and wait for its acknowledgement
    ///
    /// Retransmits on NACK or corruption up to the budget, then resyncs
    /// once before giving up with [`StackError::Protocol`]. Physical
    /// fatal errors propagate unchanged.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<DlEvent, StackError> {
        if payload.is_empty() || payload.len() > MAX_FRAME_PAYLOAD {
            return Err(StackError::Protocol);
        }

        self.tx_seq = (self.tx_seq + 1) & MAX_FRAME_NUM;
        let mut retransmits = 0u8;
        let mut resynced = false;

        loop {
            if self.deadline_expired() {
                return Err(StackError::Protocol);
            }

            let frame = Frame::data(self.tx_seq, self.rx_seq, payload)
                .map_err(|_| StackError::Protocol)?;
            match self.send_raw(&frame) {
                Ok(()) => {}
                Err(StackError::Busy) => {
                    // Chip mid-operation; the poll budget inside phys has
                    // already paced us, count it against the retransmits
                    retransmits += 1;
                    if retransmits > self.retransmit_budget {
                        return Err(StackError::Protocol);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            }

            match self.await_acknowledgement()? {
                AckOutcome::Acked => return Ok(DlEvent::TxSuccess),
                AckOutcome::AckedWithData(payload) => return Ok(DlEvent::TxRx(payload)),
                AckOutcome::Retransmit => {
                    retransmits += 1;
                    if retransmits > self.retransmit_budget {
                        if resynced {
                            return Err(StackError::Protocol);
                        }
                        self.resync()?;
                        resynced = true;
                        retransmits = 0;
                        // Resynced counters renumber the frame
                        self.tx_seq = (self.tx_seq + 1) & MAX_FRAME_NUM;
                    }
                }
                AckOutcome::Resynced => {
                    resynced = true;
                    self.tx_seq = (self.tx_seq + 1) & MAX_FRAME_NUM;
                }
            }
        }
    }

    /// Wait for a further response frame (chained responses)
    pub fn receive_frame(&mut self) -> Result<RxPayload, StackError> {
        let mut nacks = 0u8;
        loop {
            if self.deadline_expired() {
                return Err(StackError::Protocol);
            }

            let mut buf = [0u8; DL_MAX_FRAME_SIZE];
            let len = match self.phys.receive_frame(&mut buf) {
                Ok(len) => len,
                Err(StackError::Memory) => return Err(StackError::Memory),
                Err(StackError::Fatal) => return Err(StackError::Fatal),
                Err(_) => {
                    nacks += 1;
                    if nacks > self.retransmit_budget {
                        return Err(StackError::Protocol);
                    }
                    continue;
                }
            };

            match Frame::decode(&buf[..len]) {
                Ok(frame) if !frame.is_control => {
                    if frame.frame_nr != self.next_rx() {
                        // Duplicate or stale; re-acknowledge what we have
                        self.send_control(SeqCtr::Ack, self.rx_seq)?;
                        continue;
                    }
                    if frame.seqctr == SeqCtr::Nack {
                        return Err(StackError::Protocol);
                    }
                    self.rx_seq = self.next_rx();
                    self.send_control(SeqCtr::Ack, self.rx_seq)?;
                    return Ok(frame.payload);
                }
                Ok(frame) => {
                    if frame.seqctr == SeqCtr::Resync {
                        self.reset_counters();
                    }
                    // Other control frames carry nothing for us here
                    continue;
                }
                Err(_) => {
                    nacks += 1;
                    if nacks > self.retransmit_budget {
                        return Err(StackError::Protocol);
                    }
                    self.send_control(SeqCtr::Nack, self.next_rx())?;
                }
            }
        }
    }

    /// Reset the slave and the link counters
    pub fn reset(&mut self, kind: ResetKind) -> Result<(), StackError> {
        self.phys.reset(kind)?;
        self.reset_counters();
        Ok(())
    }

    /// Read the acknowledgement (or piggybacked response) for the frame
    /// just sent
    fn await_acknowledgement(&mut self) -> Result<AckOutcome, StackError> {
        let mut discards = 0u8;
        loop {
            if self.deadline_expired() {
                return Err(StackError::Protocol);
            }

            let mut buf = [0u8; DL_MAX_FRAME_SIZE];
            let len = match self.phys.receive_frame(&mut buf) {
                Ok(len) => len,
                Err(StackError::Fatal) => return Err(StackError::Fatal),
                Err(StackError::Memory) => return Err(StackError::Memory),
                Err(_) => return Ok(AckOutcome::Retransmit),
            };

            let frame = match Frame::decode(&buf[..len]) {
                Ok(frame) => frame,
                Err(_) => {
                    // Corrupt response; ask for a clean copy
                    discards += 1;
                    if discards > self.retransmit_budget {
                        return Ok(AckOutcome::Retransmit);
                    }
                    self.send_control(SeqCtr::Nack, self.next_rx())?;
                    continue;
                }
            };

            if frame.is_control {
                match frame.seqctr {
                    SeqCtr::Resync => {
                        self.reset_counters();
                        return Ok(AckOutcome::Resynced);
                    }
                    SeqCtr::Nack => return Ok(AckOutcome::Retransmit),
                    SeqCtr::Ack => {
                        if frame.ack_nr == self.tx_seq {
                            return Ok(AckOutcome::Acked);
                        }
                        // ACK for a frame we no longer care about
                        discards += 1;
                        if discards > self.retransmit_budget {
                            return Ok(AckOutcome::Retransmit);
                        }
                    }
                }
                continue;
            }

            // Data frame in the acknowledgement slot: response piggyback
            if frame.seqctr == SeqCtr::Nack {
                return Ok(AckOutcome::Retransmit);
            }
            if frame.frame_nr != self.next_rx() || frame.ack_nr != self.tx_seq {
                // Duplicate of an old response; acknowledge and drop
                self.send_control(SeqCtr::Ack, self.rx_seq)?;
                discards += 1;
                if discards > self.retransmit_budget {
                    return Ok(AckOutcome::Retransmit);
                }
                continue;
            }
            self.rx_seq = self.next_rx();
            self.send_control(SeqCtr::Ack, self.rx_seq)?;
            return Ok(AckOutcome::AckedWithData(frame.payload));
        }
    }
}

enum AckOutcome {
    Acked,
    AckedWithData(RxPayload),
    Retransmit,
    Resynced,
}
