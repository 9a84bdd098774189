//! Transport layer: command chaining
//!
//! Commands larger than one data-link frame are split into a packet
//! chain; the packet-control byte (PCTR) carries the chain position plus
//! the presence bit announcing the shielded connection. Responses are
//! reassembled with the inverse rules, validating every chain-state
//! transition. Chain violations are recovered exactly once per side
//! before the transceive fails.

use heapless::Vec;
use phylax_pal::{Clock, ControlPin, Delay, I2cBus};

use crate::config::Config;
use crate::datalink::{DataLink, DlEvent, RxPayload};
use crate::error::StackError;
use crate::frame::{DL_HEADER_SIZE, MAX_FRAME_PAYLOAD};

/// Transport header (PCTR) length in bytes
pub const TL_HEADER_SIZE: usize = 1;

/// Presence bit: announced in every PCTR while the presentation layer is
/// part of the stack
const PCTR_PRESENCE_BIT: u8 = 0x08;

const PCTR_CHAIN_MASK: u8 = 0x07;
const PCTR_CHANNEL_MASK: u8 = 0xF8;

const CHAIN_NONE: u8 = 0x00;
const CHAIN_FIRST: u8 = 0x01;
const CHAIN_INTERMEDIATE: u8 = 0x02;
const CHAIN_LAST: u8 = 0x04;
const CHAIN_ERROR: u8 = 0x07;

/// Transceive availability state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitState {
    /// Stack not opened or torn down after a fatal error
    Uninitialized,
    /// Opened; first exchange not yet completed
    Initializing,
    /// At least one exchange completed
    Ready,
}

/// Transport layer state
pub struct Transport<B, D, K, R, V> {
    dl: DataLink<B, D, K, R, V>,
    max_packet_len: usize,
    init_state: InitState,
    in_flight: bool,
}

impl<B, D, K, R, V> Transport<B, D, K, R, V>
where
    B: I2cBus,
    D: Delay,
    K: Clock,
    R: ControlPin,
    V: ControlPin,
{
    pub fn new(dl: DataLink<B, D, K, R, V>, config: &Config) -> Self {
        let frame_size = config.frame_size as usize;
        Self {
            dl,
            max_packet_len: frame_size.saturating_sub(DL_HEADER_SIZE + TL_HEADER_SIZE),
            init_state: InitState::Uninitialized,
            in_flight: false,
        }
    }

    /// Access the data-link layer (reset paths)
    pub fn datalink(&mut self) -> &mut DataLink<B, D, K, R, V> {
        &mut self.dl
    }

    /// Mark the stack opened; the first response skips the presence check
    pub fn initialize(&mut self, negotiated_frame_size: u16) {
        self.max_packet_len =
            (negotiated_frame_size as usize).saturating_sub(DL_HEADER_SIZE + TL_HEADER_SIZE);
        self.init_state = InitState::Initializing;
        self.in_flight = false;
        self.dl.reset_counters();
    }

    /// Current initialization state
    pub fn init_state(&self) -> InitState {
        self.init_state
    }

    /// True while a transceive is in flight on this context
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    #[cfg(test)]
    pub(crate) fn force_busy(&mut self, busy: bool) {
        self.in_flight = busy;
    }

    /// Send a packet and receive the slave's response packet
    ///
    /// Returns the response length written into `rx`. Rejected with
    /// [`StackError::Busy`] while another transceive is in flight and
    /// with [`StackError::Protocol`] before [`Self::initialize`].
    pub fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, StackError> {
        if self.in_flight {
            return Err(StackError::Busy);
        }
        if self.init_state == InitState::Uninitialized || tx.is_empty() {
            return Err(StackError::Protocol);
        }

        self.in_flight = true;
        let result = self.transceive_inner(tx, rx);
        self.in_flight = false;

        match result {
            Ok(len) => {
                self.init_state = InitState::Ready;
                Ok(len)
            }
            Err(StackError::Fatal) => {
                self.init_state = InitState::Uninitialized;
                Err(StackError::Fatal)
            }
            Err(e) => Err(e),
        }
    }

    fn transceive_inner(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, StackError> {
        self.dl.arm_deadline();

        let mut chain_resends = 0u8;
        let mut chain_errors_sent = 0u8;

        'resend: loop {
            let piggyback = match self.send_all_fragments(tx)? {
                SendOutcome::Done(piggyback) => piggyback,
                SendOutcome::SlaveChainError => {
                    chain_resends += 1;
                    if chain_resends > 1 {
                        return Err(StackError::Protocol);
                    }
                    continue 'resend;
                }
            };

            match self.receive_all_fragments(piggyback, rx)? {
                RecvOutcome::Complete(len) => return Ok(len),
                RecvOutcome::SlaveChainError => {
                    chain_resends += 1;
                    if chain_resends > 1 {
                        return Err(StackError::Protocol);
                    }
                }
                RecvOutcome::MalformedChain => {
                    // Tell the slave its chain was bad, then retry once
                    chain_errors_sent += 1;
                    if chain_errors_sent > 1 {
                        return Err(StackError::Protocol);
                    }
                    self.send_chain_error()?;
                    chain_resends += 1;
                    if chain_resends > 1 {
                        return Err(StackError::Protocol);
                    }
                }
            }
        }
    }

    fn chain_for(&self, offset: usize, total: usize) -> u8 {
        let remaining = total - offset;
        if offset == 0 && remaining <= self.max_packet_len {
            CHAIN_NONE
        } else if offset == 0 {
            CHAIN_FIRST
        } else if remaining > self.max_packet_len {
            CHAIN_INTERMEDIATE
        } else {
            CHAIN_LAST
        }
    }

    fn send_all_fragments(&mut self, tx: &[u8]) -> Result<SendOutcome, StackError> {
        let mut offset = 0usize;
        let mut piggyback = None;

        while offset < tx.len() {
            let chunk = (tx.len() - offset).min(self.max_packet_len);
            let pctr = self.chain_for(offset, tx.len()) | PCTR_PRESENCE_BIT;

            let mut packet: Vec<u8, MAX_FRAME_PAYLOAD> = Vec::new();
            packet.push(pctr).map_err(|_| StackError::Protocol)?;
            packet
                .extend_from_slice(&tx[offset..offset + chunk])
                .map_err(|_| StackError::Protocol)?;

            match self.dl.send_frame(&packet)? {
                DlEvent::TxSuccess => {}
                DlEvent::TxRx(data) => {
                    let mid_command = offset + chunk < tx.len();
                    if mid_command {
                        // Only a chain-error report is legal here
                        if data.first().map(|p| p & PCTR_CHAIN_MASK) == Some(CHAIN_ERROR) {
                            return Ok(SendOutcome::SlaveChainError);
                        }
                        return Err(StackError::Protocol);
                    }
                    piggyback = Some(data);
                }
            }
            offset += chunk;
        }

        Ok(SendOutcome::Done(piggyback))
    }

    fn receive_all_fragments(
        &mut self,
        mut piggyback: Option<RxPayload>,
        rx: &mut [u8],
    ) -> Result<RecvOutcome, StackError> {
        let mut total = 0usize;
        let mut previous_chain = CHAIN_NONE;
        let mut first_fragment = true;

        loop {
            let data = match piggyback.take() {
                Some(data) => data,
                None => self.dl.receive_frame()?,
            };
            if data.is_empty() {
                return Err(StackError::Protocol);
            }

            let pctr = data[0];
            let chain = pctr & PCTR_CHAIN_MASK;

            if first_fragment {
                if self.init_state == InitState::Ready
                    && pctr & PCTR_CHANNEL_MASK != PCTR_PRESENCE_BIT
                {
                    return Err(StackError::Protocol);
                }
                first_fragment = false;
            }

            if chain == CHAIN_ERROR {
                return Ok(RecvOutcome::SlaveChainError);
            }
            if !chain_transition_valid(previous_chain, chain) {
                return Ok(RecvOutcome::SlaveChainError);
            }

            // Fragments before the last must fill the negotiated frame
            if (chain == CHAIN_FIRST || chain == CHAIN_INTERMEDIATE)
                && data.len() != self.max_packet_len + TL_HEADER_SIZE
            {
                return Ok(RecvOutcome::MalformedChain);
            }

            let body = &data[TL_HEADER_SIZE..];
            if total + body.len() > rx.len() {
                return Err(StackError::Memory);
            }
            rx[total..total + body.len()].copy_from_slice(body);
            total += body.len();

            if chain == CHAIN_NONE || chain == CHAIN_LAST {
                return Ok(RecvOutcome::Complete(total));
            }
            previous_chain = chain;
        }
    }

    fn send_chain_error(&mut self) -> Result<(), StackError> {
        let packet = [CHAIN_ERROR | PCTR_PRESENCE_BIT];
        match self.dl.send_frame(&packet)? {
            DlEvent::TxSuccess | DlEvent::TxRx(_) => Ok(()),
        }
    }
}

enum SendOutcome {
    /// All fragments delivered; the slave may have piggybacked the
    /// first response fragment on the last acknowledgement
    Done(Option<RxPayload>),
    /// The slave reported a chaining error mid-command
    SlaveChainError,
}

enum RecvOutcome {
    Complete(usize),
    SlaveChainError,
    MalformedChain,
}

/// Allowed chain-state transitions while receiving (previous → current)
fn chain_transition_valid(previous: u8, current: u8) -> bool {
    match current {
        CHAIN_NONE | CHAIN_FIRST => matches!(previous, CHAIN_NONE | CHAIN_LAST),
        CHAIN_INTERMEDIATE | CHAIN_LAST => {
            matches!(previous, CHAIN_FIRST | CHAIN_INTERMEDIATE)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys::Phys;
    use phylax_pal::gpio::NoPin;

    // Stub platform: any bus access fails, time stands still
    struct DeadBus;
    impl I2cBus for DeadBus {
        type Error = ();
        fn write(&mut self, _address: u8, _data: &[u8]) -> Result<(), ()> {
            Err(())
        }
        fn read(&mut self, _address: u8, _buf: &mut [u8]) -> Result<(), ()> {
            Err(())
        }
    }

    struct NoDelay;
    impl Delay for NoDelay {
        fn delay_us(&mut self, _us: u32) {}
    }

    struct StoppedClock;
    impl Clock for StoppedClock {
        fn millis(&mut self) -> u64 {
            0
        }
    }

    fn transport() -> Transport<DeadBus, NoDelay, StoppedClock, NoPin, NoPin> {
        let config = Config::default();
        let phys = Phys::new(DeadBus, NoDelay, None, None, &config);
        let dl = DataLink::new(phys, StoppedClock, &config);
        Transport::new(dl, &config)
    }

    #[test]
    fn transceive_rejected_before_initialize() {
        let mut tl = transport();
        let mut rx = [0u8; 8];
        assert_eq!(tl.transceive(&[1], &mut rx), Err(StackError::Protocol));
    }

    #[test]
    fn busy_gate_rejects_second_transceive() {
        let mut tl = transport();
        tl.initialize(300);
        tl.force_busy(true);

        let mut rx = [0u8; 8];
        assert_eq!(tl.transceive(&[1], &mut rx), Err(StackError::Busy));
        // In-flight state untouched by the rejected call
        assert!(tl.is_busy());
        assert_eq!(tl.init_state(), InitState::Initializing);
    }

    #[test]
    fn empty_command_rejected() {
        let mut tl = transport();
        tl.initialize(300);
        let mut rx = [0u8; 8];
        assert_eq!(tl.transceive(&[], &mut rx), Err(StackError::Protocol));
    }

    #[test]
    fn chain_transitions_follow_table() {
        // Fresh exchange
        assert!(chain_transition_valid(CHAIN_NONE, CHAIN_NONE));
        assert!(chain_transition_valid(CHAIN_NONE, CHAIN_FIRST));
        // Mid-chain
        assert!(chain_transition_valid(CHAIN_FIRST, CHAIN_INTERMEDIATE));
        assert!(chain_transition_valid(CHAIN_FIRST, CHAIN_LAST));
        assert!(chain_transition_valid(CHAIN_INTERMEDIATE, CHAIN_LAST));
        // Violations
        assert!(!chain_transition_valid(CHAIN_NONE, CHAIN_INTERMEDIATE));
        assert!(!chain_transition_valid(CHAIN_NONE, CHAIN_LAST));
        assert!(!chain_transition_valid(CHAIN_FIRST, CHAIN_NONE));
        assert!(!chain_transition_valid(CHAIN_LAST, CHAIN_INTERMEDIATE));
    }
}
