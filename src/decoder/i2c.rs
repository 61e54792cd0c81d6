//! I2C bus decoder.
//!
//! One state machine per configured group. SDA is sampled on every SCL rising
//! edge; start and stop conditions are SDA transitions while SCL is high.
//! Events are anchored at the sample index where the corresponding field began
//! shifting, so the renderer can place them against the raw waveform.

use super::{
    check_channel, AckBit, AddressWidth, ConfigError, DataFormat, DecodedEvent, EventKind, I2cItem,
    RwBit,
};

#[derive(Debug, Clone, Copy)]
pub struct I2cConfig {
    clock_channel: u8,
    data_channel: u8,
    address_width: AddressWidth,
    data_format: DataFormat,
}

impl I2cConfig {
    pub fn new(clock_channel: u8, data_channel: u8) -> Result<Self, ConfigError> {
        Ok(Self {
            clock_channel: check_channel(clock_channel)?,
            data_channel: check_channel(data_channel)?,
            address_width: AddressWidth::default(),
            data_format: DataFormat::default(),
        })
    }

    pub fn with_address_width(mut self, width: AddressWidth) -> Self {
        self.address_width = width;
        self
    }

    pub fn with_data_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    pub fn clock_channel(&self) -> u8 {
        self.clock_channel
    }

    pub fn data_channel(&self) -> u8 {
        self.data_channel
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    /// Bits shifted for the address field. Seven-bit mode captures the R/W
    /// bit as well, so both modes shift eight.
    fn address_bits(&self) -> u8 {
        match self.address_width {
            AddressWidth::Seven => 8,
            AddressWidth::Eight => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum I2cState {
    Idle,
    Start,
    Ack,
    Data,
    Ack2,
}

#[derive(Debug)]
pub struct I2cDecoder {
    group: usize,
    config: I2cConfig,
    state: I2cState,
    shift: u8,
    bit_count: u8,
    fields: Vec<I2cItem>,
    field_anchor: u64,
    scl_last: u8,
    sda_last: u8,
}

impl I2cDecoder {
    pub fn new(group: usize, config: I2cConfig) -> Self {
        Self {
            group,
            config,
            state: I2cState::Idle,
            shift: 0,
            bit_count: 0,
            fields: Vec::new(),
            field_anchor: 0,
            scl_last: 1,
            sda_last: 1,
        }
    }

    pub fn group(&self) -> usize {
        self.group
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    pub fn is_idle(&self) -> bool {
        self.state == I2cState::Idle
    }

    pub fn reset(&mut self) {
        self.state = I2cState::Idle;
        self.shift = 0;
        self.bit_count = 0;
        self.fields.clear();
        self.field_anchor = 0;
        self.scl_last = 1;
        self.sda_last = 1;
    }

    pub fn tick(&mut self, raw: u16, sample_index: u64, events: &mut Vec<DecodedEvent>) {
        let scl = ((raw >> self.config.clock_channel) & 1) as u8;
        let sda = ((raw >> self.config.data_channel) & 1) as u8;
        let scl_rising = scl == 1 && self.scl_last == 0;
        let sda_edge = sda != self.sda_last;

        match self.state {
            I2cState::Idle => {
                if sda_edge && sda == 0 && scl == 1 {
                    // Start condition: SDA falls while SCL is high.
                    self.state = I2cState::Start;
                    self.shift = 0;
                    self.bit_count = 0;
                    self.fields.clear();
                    self.emit(events, EventKind::I2cStart, sample_index);
                }
            }
            I2cState::Start => {
                if scl_rising {
                    if self.bit_count == 0 {
                        self.field_anchor = sample_index;
                    }
                    self.shift = (self.shift << 1) | sda;
                    self.bit_count += 1;
                    if self.bit_count == self.config.address_bits() {
                        let (address, rw) = match self.config.address_width {
                            AddressWidth::Seven => {
                                (self.shift >> 1, Some(RwBit::from_bit(self.shift & 1)))
                            }
                            AddressWidth::Eight => (self.shift, None),
                        };
                        self.fields.push(I2cItem::Address { address, rw });
                        let anchor = self.field_anchor;
                        self.emit(events, EventKind::I2cAddress { address, rw }, anchor);
                        self.shift = 0;
                        self.bit_count = 0;
                        self.state = I2cState::Ack;
                    }
                }
            }
            I2cState::Ack | I2cState::Ack2 => {
                if scl_rising {
                    let ack = AckBit::from_bit(sda);
                    self.fields.push(I2cItem::Ack(ack));
                    self.emit(events, EventKind::I2cAck(ack), sample_index);
                    self.state = I2cState::Data;
                }
            }
            I2cState::Data => {
                if scl_rising {
                    if self.bit_count == 0 {
                        self.field_anchor = sample_index;
                    }
                    self.shift = (self.shift << 1) | sda;
                    self.bit_count += 1;
                    if self.bit_count == 8 {
                        let byte = self.shift;
                        self.fields.push(I2cItem::Data(byte));
                        let anchor = self.field_anchor;
                        self.emit(events, EventKind::I2cData(byte), anchor);
                        self.shift = 0;
                        self.bit_count = 0;
                        self.state = I2cState::Ack2;
                    }
                }
            }
        }

        // Stop condition: SDA rises while SCL is high, from any in-progress
        // state. Emits the ordered field list collected since START.
        if self.state != I2cState::Idle && sda_edge && sda == 1 && scl == 1 {
            let fields = std::mem::take(&mut self.fields);
            self.emit(events, EventKind::I2cStop { fields }, sample_index);
            self.state = I2cState::Idle;
            self.shift = 0;
            self.bit_count = 0;
        }

        self.scl_last = scl;
        self.sda_last = sda;
    }

    fn emit(&self, events: &mut Vec<DecodedEvent>, kind: EventKind, sample_index: u64) {
        log::trace!("i2c group {}: {:?} @ {}", self.group, kind, sample_index);
        events.push(DecodedEvent {
            group: self.group,
            kind,
            sample_index,
        });
    }
}
