//! SPI bus decoder.
//!
//! One state machine per configured group. MOSI and MISO are sampled together
//! on every clock rising edge while chip-select is at its active level. A
//! frame completes when the configured width is reached; multiple frames may
//! follow each other under one chip-select assertion, and a deassertion with a
//! partial frame accumulated discards it without emission.

use super::{check_channel, BitOrder, ConfigError, DataFormat, DecodedEvent, EventKind, Level};

#[derive(Debug, Clone, Copy)]
pub struct SpiConfig {
    ss_channel: u8,
    clock_channel: u8,
    mosi_channel: u8,
    miso_channel: u8,
    bits: u8,
    bit_order: BitOrder,
    ss_active: Level,
    data_format: DataFormat,
}

impl SpiConfig {
    pub fn new(
        ss_channel: u8,
        clock_channel: u8,
        mosi_channel: u8,
        miso_channel: u8,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            ss_channel: check_channel(ss_channel)?,
            clock_channel: check_channel(clock_channel)?,
            mosi_channel: check_channel(mosi_channel)?,
            miso_channel: check_channel(miso_channel)?,
            bits: 8,
            bit_order: BitOrder::default(),
            ss_active: Level::Low,
            data_format: DataFormat::default(),
        })
    }

    /// Frame width in bits, 1 to 32. Default 8.
    pub fn with_bits(mut self, bits: u8) -> Result<Self, ConfigError> {
        if bits == 0 || bits > 32 {
            return Err(ConfigError::FrameWidthOutOfRange(bits));
        }
        self.bits = bits;
        Ok(self)
    }

    pub fn with_bit_order(mut self, order: BitOrder) -> Self {
        self.bit_order = order;
        self
    }

    pub fn with_ss_active(mut self, level: Level) -> Self {
        self.ss_active = level;
        self
    }

    pub fn with_data_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpiState {
    Idle,
    Receive,
}

#[derive(Debug)]
pub struct SpiDecoder {
    group: usize,
    config: SpiConfig,
    state: SpiState,
    mosi_acc: u32,
    miso_acc: u32,
    bit_count: u8,
    clk_last: u8,
}

impl SpiDecoder {
    pub fn new(group: usize, config: SpiConfig) -> Self {
        Self {
            group,
            config,
            state: SpiState::Idle,
            mosi_acc: 0,
            miso_acc: 0,
            bit_count: 0,
            clk_last: 0,
        }
    }

    pub fn group(&self) -> usize {
        self.group
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    pub fn is_idle(&self) -> bool {
        self.state == SpiState::Idle
    }

    pub fn reset(&mut self) {
        self.state = SpiState::Idle;
        self.mosi_acc = 0;
        self.miso_acc = 0;
        self.bit_count = 0;
        self.clk_last = 0;
    }

    pub fn tick(&mut self, raw: u16, sample_index: u64, events: &mut Vec<DecodedEvent>) {
        let ss = ((raw >> self.config.ss_channel) & 1) as u8;
        let clk = ((raw >> self.config.clock_channel) & 1) as u8;
        let mosi = ((raw >> self.config.mosi_channel) & 1) as u32;
        let miso = ((raw >> self.config.miso_channel) & 1) as u32;

        let ss_active = ss == self.config.ss_active.bit();
        let clk_rising = clk == 1 && self.clk_last == 0;

        match self.state {
            SpiState::Idle => {
                if ss_active {
                    self.state = SpiState::Receive;
                    self.mosi_acc = 0;
                    self.miso_acc = 0;
                    self.bit_count = 0;
                }
            }
            SpiState::Receive => {
                if !ss_active {
                    // Deassertion mid-frame discards the partial accumulation.
                    if self.bit_count > 0 {
                        log::trace!(
                            "spi group {}: discarding {}-bit partial frame @ {}",
                            self.group,
                            self.bit_count,
                            sample_index
                        );
                    }
                    self.mosi_acc = 0;
                    self.miso_acc = 0;
                    self.bit_count = 0;
                    self.state = SpiState::Idle;
                } else if clk_rising {
                    match self.config.bit_order {
                        BitOrder::MsbFirst => {
                            self.mosi_acc = (self.mosi_acc << 1) | mosi;
                            self.miso_acc = (self.miso_acc << 1) | miso;
                        }
                        BitOrder::LsbFirst => {
                            self.mosi_acc |= mosi << self.bit_count;
                            self.miso_acc |= miso << self.bit_count;
                        }
                    }
                    self.bit_count += 1;
                    if self.bit_count == self.config.bits {
                        log::trace!(
                            "spi group {}: frame mosi={:#x} miso={:#x} @ {}",
                            self.group,
                            self.mosi_acc,
                            self.miso_acc,
                            sample_index
                        );
                        events.push(DecodedEvent {
                            group: self.group,
                            kind: EventKind::SpiData {
                                mosi: self.mosi_acc,
                                miso: self.miso_acc,
                                format: self.config.data_format,
                            },
                            sample_index,
                        });
                        self.mosi_acc = 0;
                        self.miso_acc = 0;
                        self.bit_count = 0;
                    }
                }
            }
        }

        self.clk_last = clk;
    }
}
