//! Top-level stack context
//!
//! One [`SecureChannel`] owns the whole layer stack for one slave. It is
//! an explicitly constructed, caller-owned object; nothing in the crate
//! is global. Exactly one transceive may be in flight per context; a
//! second call observes [`StackError::Busy`] instead of queueing.

use phylax_pal::gpio::NoPin;
use phylax_pal::{Clock, ControlPin, CryptOps, Datastore, Delay, I2cBus};

use crate::config::{Config, ResetKind, SessionContext};
use crate::datalink::DataLink;
use crate::error::StackError;
use crate::phys::Phys;
use crate::presentation::{Presentation, Protection};
use crate::transport::{InitState, Transport};

/// Everything the stack needs from the platform
pub struct Parts<B, D, K, C, S, R = NoPin, V = NoPin> {
    pub bus: B,
    pub delay: D,
    pub clock: K,
    pub crypt: C,
    pub store: S,
    /// RESET line; `None` disables warm resets
    pub reset_pin: Option<R>,
    /// VDD switch; `None` disables cold resets
    pub vdd_pin: Option<V>,
}

/// The assembled transport stack for one slave
pub struct SecureChannel<B, D, K, C, S, R = NoPin, V = NoPin> {
    prl: Presentation<B, D, K, C, S, R, V>,
    config: Config,
    busy: bool,
}

impl<B, D, K, C, S, R, V> SecureChannel<B, D, K, C, S, R, V>
where
    B: I2cBus,
    D: Delay,
    K: Clock,
    C: CryptOps,
    S: Datastore,
    R: ControlPin,
    V: ControlPin,
{
    /// Bring up the stack: reset the slave, negotiate the frame size,
    /// and (when configured) restore a saved shielded session
    pub fn open(parts: Parts<B, D, K, C, S, R, V>, config: Config) -> Result<Self, StackError> {
        let reset_kind = if parts.vdd_pin.is_some() {
            ResetKind::Cold
        } else if parts.reset_pin.is_some() {
            ResetKind::Warm
        } else {
            ResetKind::Soft
        };

        let phys = Phys::new(parts.bus, parts.delay, parts.reset_pin, parts.vdd_pin, &config);
        let dl = DataLink::new(phys, parts.clock, &config);
        let tl = Transport::new(dl, &config);
        let prl = Presentation::new(tl, parts.crypt, parts.store, &config);

        let mut channel = Self {
            prl,
            config,
            busy: false,
        };
        channel.bring_up(reset_kind)?;

        if channel.config.session_context == SessionContext::Restore {
            // A refused restore is not an error; the next protected
            // exchange negotiates freshly
            let _ = channel.prl.restore_session()?;
        }
        Ok(channel)
    }

    fn bring_up(&mut self, kind: ResetKind) -> Result<(), StackError> {
        let dl = self.prl.transport().datalink();
        dl.reset(kind)?;
        let negotiated = dl.phys().negotiate_frame_size(self.config.frame_size)?;
        self.prl.transport().initialize(negotiated);
        #[cfg(feature = "defmt")]
        defmt::debug!("channel up, frame size {}", negotiated);
        Ok(())
    }

    /// Send a command and receive its response
    ///
    /// Returns the response length written into `rx`. While a call is in
    /// flight the context reports [`StackError::Busy`]. A fatal link
    /// error triggers the reset-escalation policy before it is reported.
    pub fn transceive(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        protection: Protection,
    ) -> Result<usize, StackError> {
        if self.busy {
            return Err(StackError::Busy);
        }
        self.busy = true;
        let result = self.prl.transceive(tx, rx, protection);
        self.busy = false;

        match result {
            Err(StackError::Fatal) => {
                let _ = self.recover();
                Err(StackError::Fatal)
            }
            other => other,
        }
    }

    /// Reset the slave and re-initialize the link
    ///
    /// Any negotiated session is dropped; `Warm`/`Cold` degrade to
    /// `Soft` when the board lacks the pins.
    pub fn reset(&mut self, kind: ResetKind) -> Result<(), StackError> {
        if self.busy {
            return Err(StackError::Busy);
        }
        self.prl.clear_session();
        self.bring_up(kind)
    }

    /// Escalating link recovery: soft resets up to the policy budget,
    /// then a warm reset, then cold
    pub fn recover(&mut self) -> Result<(), StackError> {
        self.prl.clear_session();
        for _ in 0..self.config.reset_policy.soft_reset_attempts {
            if self.bring_up(ResetKind::Soft).is_ok() {
                return Ok(());
            }
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("soft reset budget exhausted, escalating");
        if self.bring_up(ResetKind::Warm).is_ok() {
            return Ok(());
        }
        self.bring_up(ResetKind::Cold)
    }

    /// Reconfigure the slave's bus address
    pub fn set_slave_address(&mut self, address: u8, persistent: bool) -> Result<(), StackError> {
        if self.busy {
            return Err(StackError::Busy);
        }
        self.prl
            .transport()
            .datalink()
            .phys()
            .write_slave_address(address, persistent)
    }

    /// Shut the stack down, saving the session first when configured
    pub fn close(mut self) -> Result<(), StackError> {
        if self.config.session_context == SessionContext::Save {
            self.prl.save_session()?;
        } else {
            self.prl.clear_session();
        }
        self.prl.transport().datalink().phys().power_down();
        Ok(())
    }

    /// True while a transceive is in flight
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Initialization state of the transport layer
    pub fn init_state(&self) -> InitState {
        self.prl.init_state()
    }

    /// True when a shielded session is negotiated
    pub fn has_session(&self) -> bool {
        self.prl.has_session()
    }

    /// Sequence number of the last sealed record, if a session exists
    pub fn master_sequence(&self) -> Option<u32> {
        self.prl.master_sequence()
    }
}
