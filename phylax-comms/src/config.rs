//! Stack configuration
//!
//! All retry budgets, poll intervals and reset-escalation thresholds are
//! explicit configuration rather than magic numbers inside the layers.
//! The defaults match the protocol's reference timing.

/// Default 7-bit slave base address
pub const DEFAULT_SLAVE_ADDRESS: u8 = 0x30;

/// Largest data-link frame the stack supports, including header and CRC
pub const DL_MAX_FRAME_SIZE: usize = 300;

/// How the slave is reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetKind {
    /// Write to the soft-reset register
    Soft,
    /// Toggle the RESET pin; degrades to `Soft` without the pin
    Warm,
    /// Toggle VDD and RESET; degrades to `Soft` without the VDD pin
    Cold,
}

/// Session context handling across open/close (shielded connection)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionContext {
    /// No persistence; a fresh handshake happens when needed
    None,
    /// Save the negotiated session to the datastore on close
    Save,
    /// Restore a previously saved session on open; falls back to a fresh
    /// handshake if the blob is missing or the slave refuses it
    Restore,
}

/// Reset escalation policy
///
/// A failing recovery starts with soft resets and escalates: after
/// `soft_reset_attempts` consecutive soft-reset failures a warm reset is
/// tried, then a cold reset. Kinds the board cannot perform (missing
/// pins) degrade to soft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetPolicy {
    /// Consecutive soft-reset failures before escalating
    pub soft_reset_attempts: u8,
    /// Time the reset/VDD line is held low, in milliseconds
    pub reset_low_time_ms: u32,
    /// Time allowed for the slave to boot after a reset, in milliseconds
    pub startup_time_ms: u32,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            soft_reset_attempts: 2,
            reset_low_time_ms: 10,
            startup_time_ms: 15,
        }
    }
}

/// Stack configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit I2C slave address
    pub slave_address: u8,
    /// Data-link frame size to negotiate with the slave, in bytes.
    /// The slave may cap it; the read-back value wins.
    pub frame_size: u16,
    /// Delay between two status polls, in microseconds
    pub polling_interval_us: u32,
    /// Status polls before a wait is abandoned
    pub polling_attempts: u16,
    /// Quiet time between two bus accesses, in microseconds
    pub guard_time_us: u32,
    /// Data-link retransmits before a resync is attempted
    pub dl_retransmit_attempts: u8,
    /// Presentation-layer retransmits after an integrity alert
    pub prl_retransmit_attempts: u8,
    /// Overall deadline for one transceive, in milliseconds
    pub exit_timeout_ms: u32,
    /// Reset escalation policy
    pub reset_policy: ResetPolicy,
    /// Session persistence behavior
    pub session_context: SessionContext,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slave_address: DEFAULT_SLAVE_ADDRESS,
            frame_size: DL_MAX_FRAME_SIZE as u16,
            polling_interval_us: 1000,
            polling_attempts: 200,
            guard_time_us: 50,
            dl_retransmit_attempts: 3,
            prl_retransmit_attempts: 3,
            exit_timeout_ms: 180_000,
            reset_policy: ResetPolicy::default(),
            session_context: SessionContext::None,
        }
    }
}
