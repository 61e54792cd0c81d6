//! Stream decoded events from a connected LogicProbe.
//!
//! ```bash
//! cargo run --example basic_acquisition -- --rate 1000000 --samples 4096 --i2c 2,1
//! ```

use clap::Parser;
use logicprobe_rs::decoder::AddressWidth;
use logicprobe_rs::{
    CaptureSession, I2cConfig, I2cDecoder, ProtocolDecoder, SessionEvent, SpiConfig, SpiDecoder,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "LogicProbe acquisition demo")]
struct Args {
    /// Serial port of the device; discovered automatically when omitted
    #[arg(short, long)]
    port: Option<String>,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 1_000_000)]
    rate: u32,

    /// Samples per trigger window
    #[arg(long, default_value_t = 4096)]
    samples: u32,

    /// Decode I2C on "<scl>,<sda>" (zero-based channels)
    #[arg(long)]
    i2c: Option<String>,

    /// Decode SPI on "<ss>,<clk>,<mosi>,<miso>"
    #[arg(long)]
    spi: Option<String>,

    /// Seconds to capture before stopping
    #[arg(long, default_value_t = 5)]
    duration: u64,
}

fn parse_channels(spec: &str) -> Vec<u8> {
    spec.split(',')
        .map(|c| c.trim().parse().expect("channel list must be numeric"))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let session = CaptureSession::connect(args.port.as_deref())?;
    let plan = session.apply_timing(args.rate, args.samples)?;
    println!(
        "Timers: period={} period16={} prescaler={} (effective rate {:.0} Hz)",
        plan.sample_period,
        plan.period16,
        plan.prescaler,
        plan.effective_sample_rate()
    );

    let mut decoders = Vec::new();
    if let Some(spec) = &args.i2c {
        let ch = parse_channels(spec);
        let config = I2cConfig::new(ch[0], ch[1])?.with_address_width(AddressWidth::Seven);
        decoders.push(ProtocolDecoder::I2c(I2cDecoder::new(decoders.len(), config)));
    }
    if let Some(spec) = &args.spi {
        let ch = parse_channels(spec);
        let config = SpiConfig::new(ch[0], ch[1], ch[2], ch[3])?;
        decoders.push(ProtocolDecoder::Spi(SpiDecoder::new(decoders.len(), config)));
    }
    session.set_decoders(decoders);

    session.start()?;
    println!("Capturing for {} seconds...", args.duration);

    let events = session.events();
    let deadline = std::time::Instant::now() + Duration::from_secs(args.duration);
    while std::time::Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(SessionEvent::Decoded(event)) => {
                println!("group {} @ {}: {:?}", event.group, event.sample_index, event.kind);
            }
            Ok(SessionEvent::WindowFull { sample_index }) => {
                println!("window full at sample {sample_index}");
                break;
            }
            Err(_) => {}
        }
    }

    session.stop()?;
    let stats = session.stats();
    println!(
        "Done: {} samples, {} lines discarded, {} framing errors",
        stats.accepted_samples, stats.discarded_lines, stats.uart_framing_errors
    );
    Ok(())
}
