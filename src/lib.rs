//! # LogicProbe RS
//!
//! A Rust library for acquiring and decoding multiplexed digital samples from
//! LogicProbe 8-channel logic-analyzer devices.
//!
//! The device streams one ASCII decimal integer per sample tick over a serial
//! port, bit `i` carrying channel `i + 1`. This library owns that transport:
//! it assigns monotonic sample indices, keeps bounded per-channel bit
//! history, runs deterministic per-tick decoders for the embedded buses, and
//! ships trigger and timer configuration back to the device byte-for-byte in
//! the firmware's command protocol.
//!
//! ## Features
//!
//! - **Cross-platform device discovery**: Uses `serialport` for finding LogicProbe devices
//! - **Protocol decoding**: I2C, SPI and UART state machines plus raw edge capture
//! - **Sample correlation**: Ring-buffer windows map decoded events back onto the waveform
//! - **Device configuration**: Edge triggers and sample/trigger timers with exact register fitting
//! - **Type safety**: Strong typing and error handling throughout
//!
//! ## Examples
//!
//! ### Device Connection and Basic Usage
//!
//! ```rust,no_run
//! use logicprobe_rs::{CaptureSession, SessionEvent};
//!
//! // Connect to any available LogicProbe device
//! let session = CaptureSession::connect(None)?;
//!
//! // 1 MHz sampling, 4096-sample trigger window
//! session.apply_timing(1_000_000, 4096)?;
//! session.start()?;
//!
//! for event in session.events().iter().take(16) {
//!     if let SessionEvent::Decoded(event) = event {
//!         println!("{:?} @ {}", event.kind, event.sample_index);
//!     }
//! }
//! session.stop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Configuring Decoders
//!
//! ```rust,no_run
//! use logicprobe_rs::{CaptureSession, I2cConfig, I2cDecoder, ProtocolDecoder};
//! use logicprobe_rs::decoder::AddressWidth;
//!
//! let session = CaptureSession::connect(None)?;
//! let config = I2cConfig::new(1, 0)?.with_address_width(AddressWidth::Seven);
//! session.set_decoders(vec![ProtocolDecoder::I2c(I2cDecoder::new(0, config))]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Edge Triggers
//!
//! ```rust,no_run
//! use logicprobe_rs::{CaptureSession, TriggerMode, TriggerSettings};
//!
//! let session = CaptureSession::connect(None)?;
//! let mut triggers = TriggerSettings::new();
//! triggers.set_mode(0, TriggerMode::Rising)?;
//! triggers.set_mode(2, TriggerMode::Falling)?;
//! session.apply_trigger(&triggers)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Device Discovery
//!
//! ```rust,no_run
//! use logicprobe_rs::ProbeConnector;
//!
//! for device in ProbeConnector::get_available_devices()? {
//!     println!("Found device: {} at {}", device.name, device.port);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capture_session;
pub mod decoder;
pub mod probe_connector;
pub mod probe_link;
pub mod ring_buffer;
pub mod timing_config;
pub mod trigger_config;

// Re-export the main types for convenience
pub use capture_session::{
    CaptureMode, CaptureSession, DecodeStats, RawSample, SessionError, SessionEvent, CHANNEL_COUNT,
};

pub use decoder::{
    ConfigError, DataFormat, DecodedEvent, EventKind, I2cConfig, I2cDecoder, ProtocolDecoder,
    SpiConfig, SpiDecoder, UartConfig, UartDecoder,
};

pub use probe_connector::{ConnectorError, ProbeConnector, ProbeDevice};

pub use probe_link::{ByteStream, LinkError, ProbeLink};

pub use ring_buffer::{ChannelRings, SampleWindow};

pub use timing_config::{TimingError, TimingPlan, DEVICE_CLOCK_HZ};

pub use trigger_config::{TriggerMode, TriggerSettings};
