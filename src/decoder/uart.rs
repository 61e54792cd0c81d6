//! UART decoder.
//!
//! One state machine per configured channel, driven by a fixed 16x
//! oversampling factor against the channel's baud rate. Bit timing is counted
//! purely in ingested-sample units through a per-channel schedule of the next
//! sample point, so decoding is only correct when the acquisition rate matches
//! [`UartConfig::required_sample_rate`]. A stop bit sampled low is a framing
//! error: the frame is discarded silently and the machine returns to idle.

use crate::capture_session::DecodeStats;

use super::{check_channel, ConfigError, DataFormat, DecodedEvent, EventKind, Polarity};

/// Ticks per UART bit period.
pub const OVERSAMPLE: u64 = 16;

#[derive(Debug, Clone, Copy)]
pub struct UartConfig {
    data_channel: u8,
    polarity: Polarity,
    stop_bits: u8,
    baud_rate: u32,
    data_format: DataFormat,
}

impl UartConfig {
    pub fn new(data_channel: u8, baud_rate: u32) -> Result<Self, ConfigError> {
        if baud_rate == 0 {
            return Err(ConfigError::ZeroBaudRate);
        }
        Ok(Self {
            data_channel: check_channel(data_channel)?,
            polarity: Polarity::default(),
            stop_bits: 1,
            baud_rate,
            data_format: DataFormat::default(),
        })
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Stop bits sampled before a byte is emitted, 0 to 3. Zero behaves like
    /// one: the completion check runs after the first valid stop sample.
    pub fn with_stop_bits(mut self, stop_bits: u8) -> Result<Self, ConfigError> {
        if stop_bits > 3 {
            return Err(ConfigError::StopBitsOutOfRange(stop_bits));
        }
        self.stop_bits = stop_bits;
        Ok(self)
    }

    pub fn with_data_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Acquisition rate the device must be configured to for this channel to
    /// decode correctly.
    pub fn required_sample_rate(&self) -> u64 {
        u64::from(self.baud_rate) * OVERSAMPLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UartState {
    Idle,
    StartBit,
    DataBits,
    StopBits,
}

#[derive(Debug)]
pub struct UartDecoder {
    group: usize,
    config: UartConfig,
    state: UartState,
    byte: u8,
    bit_count: u8,
    stop_count: u8,
    next_sample: u64,
    last_bit: u8,
}

impl UartDecoder {
    pub fn new(group: usize, config: UartConfig) -> Self {
        Self {
            group,
            config,
            state: UartState::Idle,
            byte: 0,
            bit_count: 0,
            stop_count: 0,
            next_sample: 0,
            last_bit: 1,
        }
    }

    pub fn group(&self) -> usize {
        self.group
    }

    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    pub fn is_idle(&self) -> bool {
        self.state == UartState::Idle
    }

    pub fn reset(&mut self) {
        self.state = UartState::Idle;
        self.byte = 0;
        self.bit_count = 0;
        self.stop_count = 0;
        self.next_sample = 0;
        self.last_bit = 1;
    }

    pub fn tick(
        &mut self,
        raw: u16,
        sample_index: u64,
        events: &mut Vec<DecodedEvent>,
        stats: &mut DecodeStats,
    ) {
        let mut bit = ((raw >> self.config.data_channel) & 1) as u8;
        if self.config.polarity == Polarity::Inverted {
            bit = 1 - bit;
        }

        match self.state {
            UartState::Idle => {
                if bit == 0 && self.last_bit == 1 {
                    // Start bit edge; first data bit is sampled at its
                    // midpoint, one and a half bit periods out.
                    self.state = UartState::StartBit;
                    self.byte = 0;
                    self.bit_count = 0;
                    self.next_sample = sample_index + OVERSAMPLE + OVERSAMPLE / 2;
                }
            }
            UartState::StartBit => {
                if sample_index >= self.next_sample - OVERSAMPLE {
                    self.state = UartState::DataBits;
                }
            }
            UartState::DataBits => {
                if sample_index >= self.next_sample {
                    self.byte |= bit << self.bit_count;
                    self.bit_count += 1;
                    self.next_sample += OVERSAMPLE;
                    if self.bit_count >= 8 {
                        self.state = UartState::StopBits;
                        self.stop_count = 0;
                    }
                }
            }
            UartState::StopBits => {
                if sample_index >= self.next_sample {
                    if bit == 1 {
                        self.stop_count += 1;
                        self.next_sample += OVERSAMPLE;
                        if self.stop_count >= self.config.stop_bits {
                            log::trace!(
                                "uart group {}: byte {:#04x} @ {}",
                                self.group,
                                self.byte,
                                sample_index
                            );
                            events.push(DecodedEvent {
                                group: self.group,
                                kind: EventKind::UartData {
                                    byte: self.byte,
                                    format: self.config.data_format,
                                },
                                sample_index,
                            });
                            self.state = UartState::Idle;
                        }
                    } else {
                        // Framing error: discard the frame, no event.
                        stats.uart_framing_errors += 1;
                        self.state = UartState::Idle;
                    }
                }
            }
        }

        self.last_bit = bit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CH: u8 = 0;

    fn config() -> UartConfig {
        UartConfig::new(CH, 9600).unwrap()
    }

    /// Render a frame as one level per tick at 16x oversampling: idle, start
    /// bit, eight LSB-first data bits, stop bit(s), idle tail.
    fn frame_levels(byte: u8, stop_bits: u8, break_stop: bool) -> Vec<u16> {
        let n = OVERSAMPLE as usize;
        let mut levels = vec![1u16; n];
        levels.extend(std::iter::repeat(0).take(n)); // start bit
        for i in 0..8 {
            let bit = u16::from((byte >> i) & 1);
            levels.extend(std::iter::repeat(bit).take(n));
        }
        let stop_level = u16::from(!break_stop);
        for _ in 0..stop_bits.max(1) {
            levels.extend(std::iter::repeat(stop_level).take(n));
        }
        levels.extend(std::iter::repeat(1).take(2 * n)); // idle tail
        levels
    }

    fn decode(decoder: &mut UartDecoder, levels: &[u16]) -> (Vec<DecodedEvent>, DecodeStats) {
        let mut events = Vec::new();
        let mut stats = DecodeStats::default();
        for (idx, &level) in levels.iter().enumerate() {
            decoder.tick(level << CH, idx as u64, &mut events, &mut stats);
        }
        (events, stats)
    }

    #[test]
    fn byte_at_16x_timing_decodes() {
        let mut decoder = UartDecoder::new(0, config());
        let (events, stats) = decode(&mut decoder, &frame_levels(0x41, 1, false));

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            EventKind::UartData {
                byte: 0x41,
                format: DataFormat::Hexadecimal
            }
        );
        assert_eq!(stats.uart_framing_errors, 0);
        assert!(decoder.is_idle());
    }

    #[test]
    fn broken_stop_bit_suppresses_the_event() {
        let mut decoder = UartDecoder::new(0, config());
        let (events, stats) = decode(&mut decoder, &frame_levels(0x41, 1, true));
        assert!(events.is_empty());
        assert_eq!(stats.uart_framing_errors, 1);
        assert!(decoder.is_idle());
    }

    #[test]
    fn two_stop_bits_are_both_sampled() {
        let cfg = config().with_stop_bits(2).unwrap();
        let mut decoder = UartDecoder::new(0, cfg);
        let (events, _) = decode(&mut decoder, &frame_levels(0x5A, 2, false));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            EventKind::UartData { byte: 0x5A, .. }
        ));
    }

    #[test]
    fn inverted_polarity_complements_the_line() {
        let cfg = config().with_polarity(Polarity::Inverted);
        let mut decoder = UartDecoder::new(0, cfg);
        // Complement every level of a standard 0x41 frame.
        let levels: Vec<u16> = frame_levels(0x41, 1, false)
            .into_iter()
            .map(|l| 1 - l)
            .collect();
        let (events, _) = decode(&mut decoder, &levels);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            EventKind::UartData { byte: 0x41, .. }
        ));
    }

    #[test]
    fn consecutive_frames_decode_independently() {
        let mut decoder = UartDecoder::new(3, config());
        let mut levels = frame_levels(0x41, 1, false);
        levels.extend(frame_levels(0x42, 1, false));
        let (events, _) = decode(&mut decoder, &levels);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].kind,
            EventKind::UartData { byte: 0x41, .. }
        ));
        assert!(matches!(
            events[1].kind,
            EventKind::UartData { byte: 0x42, .. }
        ));
        assert_eq!(events[1].group, 3);
    }

    #[test]
    fn data_event_is_anchored_at_the_terminating_sample() {
        let mut decoder = UartDecoder::new(0, config());
        let (events, _) = decode(&mut decoder, &frame_levels(0xFF, 1, false));
        // Start edge at tick 16; stop bit sampled at 16 + 24 + 8*16 = 168.
        assert_eq!(events[0].sample_index, 168);
    }
}
