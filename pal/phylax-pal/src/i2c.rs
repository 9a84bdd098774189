//! I2C bus abstraction
//!
//! Provides the bus trait the physical layer drives. Implementations map
//! onto a blocking master peripheral; the stack performs its own busy
//! polling and retries on top.

/// I2C bus master
///
/// Write and read are independent transactions (the slave's register
/// protocol never uses repeated-start write-read).
pub trait I2cBus {
    /// Error type for I2C operations
    type Error;

    /// Write data to a device at the given address
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `data` - Bytes to write
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Read data from a device at the given address
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `buf` - Buffer to read into
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error>;
}

/// Adapter implementing [`I2cBus`] for any `embedded-hal` 1.0 I2C master.
#[cfg(feature = "embedded-hal")]
pub struct EmbeddedHalBus<T>(pub T);

#[cfg(feature = "embedded-hal")]
impl<T: embedded_hal::i2c::I2c> I2cBus for EmbeddedHalBus<T> {
    type Error = T::Error;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        self.0.write(address, data)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(address, buf)
    }
}

/// I2C configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        // Negotiation with the slave starts at standard mode
        Self { frequency: 100_000 }
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };

    /// Fast mode plus (1 MHz)
    pub const FAST_PLUS: Self = Self {
        frequency: 1_000_000,
    };
}
