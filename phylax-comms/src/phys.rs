//! Physical layer: register-protocol I2C access
//!
//! The slave exposes a small register file over I2C; a register access is
//! a write of the register address optionally followed by data, a read is
//! the address write followed by a read transaction. All waits are
//! bounded by the configured polling budget; exhausting the budget is
//! fatal for the session.

use phylax_pal::{ControlPin, Delay, I2cBus};

use crate::config::{Config, ResetKind, DL_MAX_FRAME_SIZE};
use crate::error::StackError;

/// Frame data register
const REG_DATA: u8 = 0x80;
/// Maximum frame size register (u16 BE), negotiated at open
const REG_DATA_REG_LEN: u8 = 0x81;
/// Status register, 4 bytes
const REG_I2C_STATE: u8 = 0x82;
/// Slave address register
const REG_BASE_ADDR: u8 = 0x84;
/// Soft reset register; writing 0x0000 resets the device
const REG_SOFT_RESET: u8 = 0x88;

/// I2C_STATE byte 0: device busy with a previous operation
const STATE_BUSY: u8 = 0x80;
/// I2C_STATE byte 0: a response is ready to be read
const STATE_RESP_READY: u8 = 0x40;

/// BASE_ADDR mode byte: persist the new address across resets
const BASE_ADDR_PERSISTENT: u8 = 0x80;

/// Physical layer over a PAL bus
pub struct Phys<B, D, R, V> {
    bus: B,
    delay: D,
    reset_pin: Option<R>,
    vdd_pin: Option<V>,
    address: u8,
    polling_interval_us: u32,
    polling_attempts: u16,
    guard_time_us: u32,
    reset_low_time_ms: u32,
    startup_time_ms: u32,
}

impl<B, D, R, V> Phys<B, D, R, V>
where
    B: I2cBus,
    D: Delay,
    R: ControlPin,
    V: ControlPin,
{
    /// Create the layer; pins may be absent (limits available reset kinds)
    pub fn new(bus: B, delay: D, reset_pin: Option<R>, vdd_pin: Option<V>, config: &Config) -> Self {
        Self {
            bus,
            delay,
            reset_pin,
            vdd_pin,
            address: config.slave_address,
            polling_interval_us: config.polling_interval_us,
            polling_attempts: config.polling_attempts,
            guard_time_us: config.guard_time_us,
            reset_low_time_ms: config.reset_policy.reset_low_time_ms,
            startup_time_ms: config.reset_policy.startup_time_ms,
        }
    }

    /// Currently configured slave address
    pub fn address(&self) -> u8 {
        self.address
    }

    fn guard_time(&mut self) {
        self.delay.delay_us(self.guard_time_us);
    }

    /// Write raw bytes, retrying while the slave NACKs (clock stretching
    /// or mid-write states present as NACKs on most masters)
    fn write_polled(&mut self, data: &[u8]) -> Result<(), StackError> {
        for _ in 0..self.polling_attempts {
            self.guard_time();
            if self.bus.write(self.address, data).is_ok() {
                return Ok(());
            }
            self.delay.delay_us(self.polling_interval_us);
        }
        Err(StackError::Fatal)
    }

    fn read_polled(&mut self, buf: &mut [u8]) -> Result<(), StackError> {
        for _ in 0..self.polling_attempts {
            self.guard_time();
            if self.bus.read(self.address, buf).is_ok() {
                return Ok(());
            }
            self.delay.delay_us(self.polling_interval_us);
        }
        Err(StackError::Fatal)
    }

    /// Read the 4-byte status register
    fn read_state(&mut self) -> Result<[u8; 4], StackError> {
        self.write_polled(&[REG_I2C_STATE])?;
        let mut state = [0u8; 4];
        self.read_polled(&mut state)?;
        Ok(state)
    }

    /// Queue a complete data-link frame for the slave
    ///
    /// Fails with [`StackError::Busy`] while the slave signals a previous
    /// operation in progress, [`StackError::Fatal`] when the bounded
    /// attempt budget is exhausted.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<(), StackError> {
        debug_assert!(frame.len() <= DL_MAX_FRAME_SIZE);

        let state = self.read_state()?;
        if state[0] & STATE_BUSY != 0 {
            return Err(StackError::Busy);
        }

        let mut tx = [0u8; DL_MAX_FRAME_SIZE + 1];
        tx[0] = REG_DATA;
        tx[1..1 + frame.len()].copy_from_slice(frame);
        self.write_polled(&tx[..1 + frame.len()])
    }

    /// Poll until the slave has a frame ready, then read it into `buf`
    ///
    /// Returns the frame length. [`StackError::Fatal`] when the polling
    /// budget runs out, [`StackError::Memory`] when the announced frame
    /// does not fit `buf`.
    pub fn receive_frame(&mut self, buf: &mut [u8]) -> Result<usize, StackError> {
        let mut len = 0usize;
        let mut ready = false;
        for _ in 0..self.polling_attempts {
            let state = self.read_state()?;
            if state[0] & STATE_RESP_READY != 0 {
                len = u16::from_be_bytes([state[2], state[3]]) as usize;
                if len > 0 {
                    ready = true;
                    break;
                }
            }
            self.delay.delay_us(self.polling_interval_us);
        }
        if !ready {
            return Err(StackError::Fatal);
        }
        if len > buf.len() {
            return Err(StackError::Memory);
        }

        self.write_polled(&[REG_DATA])?;
        self.read_polled(&mut buf[..len])?;
        Ok(len)
    }

    /// Negotiate the data-link frame size: write the desired value, read
    /// back what the slave accepted
    pub fn negotiate_frame_size(&mut self, requested: u16) -> Result<u16, StackError> {
        let req = requested.to_be_bytes();
        self.write_polled(&[REG_DATA_REG_LEN, req[0], req[1]])?;

        self.write_polled(&[REG_DATA_REG_LEN])?;
        let mut effective = [0u8; 2];
        self.read_polled(&mut effective)?;
        let effective = u16::from_be_bytes(effective);
        if effective == 0 {
            return Err(StackError::Protocol);
        }
        Ok(effective.min(requested).min(DL_MAX_FRAME_SIZE as u16))
    }

    /// Reconfigure the slave's bus address
    ///
    /// Volatile mode lasts until the next reset; persistent mode writes
    /// the slave's non-volatile address register. The layer talks to the
    /// new address from the next transaction on.
    pub fn write_slave_address(&mut self, new_address: u8, persistent: bool) -> Result<(), StackError> {
        let mode = if persistent { BASE_ADDR_PERSISTENT } else { 0 };
        self.write_polled(&[REG_BASE_ADDR, new_address & 0x7F, mode])?;
        self.address = new_address & 0x7F;
        Ok(())
    }

    /// Cut slave power on shutdown; no-op without the VDD pin
    pub fn power_down(&mut self) {
        if let Some(vdd) = self.vdd_pin.as_mut() {
            vdd.set_low();
        }
    }

    /// Reset the slave
    ///
    /// Kinds a board cannot perform (missing pins) degrade to a soft
    /// reset rather than failing.
    pub fn reset(&mut self, kind: ResetKind) -> Result<(), StackError> {
        match kind {
            ResetKind::Cold if self.vdd_pin.is_some() => {
                if let Some(vdd) = self.vdd_pin.as_mut() {
                    vdd.set_low();
                }
                if let Some(rst) = self.reset_pin.as_mut() {
                    rst.set_low();
                }
                self.delay.delay_ms(self.reset_low_time_ms);
                if let Some(vdd) = self.vdd_pin.as_mut() {
                    vdd.set_high();
                }
                if let Some(rst) = self.reset_pin.as_mut() {
                    rst.set_high();
                }
            }
            ResetKind::Warm if self.reset_pin.is_some() => {
                if let Some(rst) = self.reset_pin.as_mut() {
                    rst.set_low();
                }
                self.delay.delay_ms(self.reset_low_time_ms);
                if let Some(rst) = self.reset_pin.as_mut() {
                    rst.set_high();
                }
            }
            _ => {
                self.write_polled(&[REG_SOFT_RESET, 0x00, 0x00])?;
            }
        }
        self.delay.delay_ms(self.startup_time_ms);
        Ok(())
    }
}
