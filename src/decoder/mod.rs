//! Protocol decoder types and the per-session decoder bank.
//!
//! Each decoder is a deterministic finite-state machine that consumes one
//! multiplexed sample per tick and emits [`DecodedEvent`]s anchored to the
//! monotonic sample index assigned by the acquisition loop. Decoders keep the
//! previous tick's line levels for edge detection; there is no debouncing.

use crate::capture_session::DecodeStats;

pub mod i2c;
pub mod spi;
pub mod uart;

pub use i2c::{I2cConfig, I2cDecoder};
pub use spi::{SpiConfig, SpiDecoder};
pub use uart::{UartConfig, UartDecoder};

/// Number of digital channels the capture device multiplexes into one sample.
pub const MAX_CHANNELS: u8 = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Channel index {channel} out of range, must be below {max}")]
    ChannelOutOfRange { channel: u8, max: u8 },

    #[error("Baud rate must be non-zero")]
    ZeroBaudRate,

    #[error("Stop bit count {0} out of range, must be at most 3")]
    StopBitsOutOfRange(u8),

    #[error("Frame width {0} out of range, must be between 1 and 32 bits")]
    FrameWidthOutOfRange(u8),
}

pub(crate) fn check_channel(channel: u8) -> Result<u8, ConfigError> {
    if channel < MAX_CHANNELS {
        Ok(channel)
    } else {
        Err(ConfigError::ChannelOutOfRange {
            channel,
            max: MAX_CHANNELS,
        })
    }
}

/// Rendering applied to decoded payload words before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    Binary,
    Decimal,
    #[default]
    Hexadecimal,
    Ascii,
}

impl DataFormat {
    /// Render a decoded word for display.
    pub fn render(self, value: u32) -> String {
        match self {
            Self::Binary => format!("{value:#b}"),
            Self::Decimal => value.to_string(),
            Self::Hexadecimal => format!("{value:#x}"),
            Self::Ascii => char::from_u32(value)
                .map_or_else(|| format!("\\x{value:02x}"), String::from),
        }
    }
}

/// Shift direction for multi-bit accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// Logic level of a control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    pub fn bit(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

/// UART line polarity. `Inverted` complements every sampled bit before the
/// state machine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Standard,
    Inverted,
}

/// I2C addressing mode. Seven-bit addresses carry a trailing R/W bit on the
/// wire, so both modes shift eight bits in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressWidth {
    Seven,
    #[default]
    Eight,
}

/// Direction bit of a 7-bit I2C address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwBit {
    Write,
    Read,
}

impl RwBit {
    pub(crate) fn from_bit(bit: u8) -> Self {
        if bit == 0 { Self::Write } else { Self::Read }
    }
}

/// Acknowledge level sampled on the ninth I2C clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckBit {
    Ack,
    Nack,
}

impl AckBit {
    pub(crate) fn from_bit(bit: u8) -> Self {
        if bit == 0 { Self::Ack } else { Self::Nack }
    }
}

/// One field of an I2C transaction, in wire order. A STOP event carries the
/// full list collected since the preceding START.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cItem {
    Address { address: u8, rw: Option<RwBit> },
    Ack(AckBit),
    Data(u8),
}

/// Payload of a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    I2cStart,
    I2cAddress { address: u8, rw: Option<RwBit> },
    I2cAck(AckBit),
    I2cData(u8),
    I2cStop { fields: Vec<I2cItem> },
    SpiData { mosi: u32, miso: u32, format: DataFormat },
    UartData { byte: u8, format: DataFormat },
}

/// A decoded protocol event. Immutable once emitted; its lifetime in the
/// renderer is bounded by whether `sample_index` is still inside the active
/// ring-buffer window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub group: usize,
    pub kind: EventKind,
    pub sample_index: u64,
}

/// A configured protocol decoder bound to one group of channels.
#[derive(Debug)]
pub enum ProtocolDecoder {
    I2c(I2cDecoder),
    Spi(SpiDecoder),
    Uart(UartDecoder),
}

impl ProtocolDecoder {
    /// Feed one sample tick through the state machine.
    pub fn tick(
        &mut self,
        raw: u16,
        sample_index: u64,
        events: &mut Vec<DecodedEvent>,
        stats: &mut DecodeStats,
    ) {
        match self {
            Self::I2c(d) => d.tick(raw, sample_index, events),
            Self::Spi(d) => d.tick(raw, sample_index, events),
            Self::Uart(d) => d.tick(raw, sample_index, events, stats),
        }
    }

    /// Reset the state machine to idle with empty accumulators.
    pub fn reset(&mut self) {
        match self {
            Self::I2c(d) => d.reset(),
            Self::Spi(d) => d.reset(),
            Self::Uart(d) => d.reset(),
        }
    }

    pub fn group(&self) -> usize {
        match self {
            Self::I2c(d) => d.group(),
            Self::Spi(d) => d.group(),
            Self::Uart(d) => d.group(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_formats_match_display_conventions() {
        assert_eq!(DataFormat::Binary.render(0xA5), "0b10100101");
        assert_eq!(DataFormat::Decimal.render(0xA5), "165");
        assert_eq!(DataFormat::Hexadecimal.render(0xA5), "0xa5");
        assert_eq!(DataFormat::Ascii.render(0x41), "A");
    }

    #[test]
    fn channel_bounds_are_enforced() {
        assert!(check_channel(7).is_ok());
        assert!(matches!(
            check_channel(8),
            Err(ConfigError::ChannelOutOfRange { channel: 8, .. })
        ));
    }
}
