//! Configure per-channel edge triggers on a connected LogicProbe.
//!
//! ```bash
//! cargo run --example trigger_setup -- --rising 1 --rising 4 --falling 3
//! ```

use clap::Parser;
use logicprobe_rs::{CaptureSession, TriggerMode, TriggerSettings};

#[derive(Parser, Debug)]
#[command(author, version, about = "LogicProbe trigger configuration demo")]
struct Args {
    /// Serial port of the device; discovered automatically when omitted
    #[arg(short, long)]
    port: Option<String>,

    /// Channels (1-based) armed on a rising edge
    #[arg(long)]
    rising: Vec<u8>,

    /// Channels (1-based) armed on a falling edge
    #[arg(long)]
    falling: Vec<u8>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = TriggerSettings::new();
    for channel in &args.rising {
        settings.set_mode(channel - 1, TriggerMode::Rising)?;
    }
    for channel in &args.falling {
        settings.set_mode(channel - 1, TriggerMode::Falling)?;
    }

    println!(
        "edge mask = {:#010b}, enable mask = {:#010b}",
        settings.edge_mask(),
        settings.enable_mask()
    );

    let session = CaptureSession::connect(args.port.as_deref())?;
    session.apply_trigger(&settings)?;
    println!("Trigger configuration sent");
    Ok(())
}
