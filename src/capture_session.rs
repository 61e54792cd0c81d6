//! Capture session: acquisition worker, sample fan-out, and device control.
//!
//! A session owns the transport, one background acquisition thread, the
//! per-channel ring buffers and the decoder bank. The worker reads sample
//! lines, assigns monotonically increasing sample indices and fans each
//! accepted sample into the ring buffers, the raw-sample channel and every
//! configured decoder — all synchronously, per tick. Controllers reconfigure
//! the session through the shared state mutex and talk to the device through
//! the link's serialized command writers.
//!
//! No per-sample error escapes the worker: malformed lines are dropped and
//! counted, and the stream never dies on one bad sample.

use crate::decoder::{DecodedEvent, ProtocolDecoder};
use crate::probe_connector::{ConnectorError, ProbeConnector};
use crate::probe_link::{ByteStream, LinkError, ProbeLink};
use crate::ring_buffer::{ChannelRings, SampleWindow, DEFAULT_CAPACITY};
use crate::timing_config::{TimingError, TimingPlan};
use crate::trigger_config::TriggerSettings;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// Channels multiplexed into one sample line.
pub const CHANNEL_COUNT: usize = 8;

/// One accepted sample tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub value: u16,
    pub index: u64,
}

/// Everything the worker hands to the consumer context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Decoded(DecodedEvent),
    /// The ring-buffer window filled while in single-capture mode. The
    /// controller reacts by stopping the device.
    WindowFull { sample_index: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Continuous,
    Single,
}

/// Aggregate counters for input the worker absorbed silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStats {
    pub accepted_samples: u64,
    pub discarded_lines: u64,
    pub uart_framing_errors: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Timing error: {0}")]
    Timing(#[from] TimingError),
}

/// State shared between the worker and the controller. The worker reads the
/// decoder configuration every tick while the controller may swap it at
/// arbitrary times, so everything lives behind one mutex.
struct SharedState {
    decoders: Vec<ProtocolDecoder>,
    rings: ChannelRings,
    stats: DecodeStats,
    sample_index: u64,
    mode: CaptureMode,
    window_full_notified: bool,
}

/// Synchronous body of the acquisition loop: line splitting across chunk
/// boundaries, integer parsing, index assignment and fan-out. Kept apart from
/// the thread so the per-tick semantics are testable in isolation.
struct AcquisitionCore {
    shared: Arc<Mutex<SharedState>>,
    samples_tx: Sender<RawSample>,
    events_tx: Sender<SessionEvent>,
    pending: Vec<u8>,
    scratch: Vec<DecodedEvent>,
}

impl AcquisitionCore {
    const VALUE_LIMIT: u32 = 1 << CHANNEL_COUNT;

    fn ingest(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    let line = std::mem::take(&mut self.pending);
                    self.accept_line(&line);
                }
            } else {
                self.pending.push(byte);
            }
        }
    }

    fn accept_line(&mut self, line: &[u8]) {
        let mut shared = lock_shared(&self.shared);

        let parsed = std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|v| *v < Self::VALUE_LIMIT);
        let Some(value) = parsed else {
            // Partial or corrupt line; the stream must survive it.
            shared.stats.discarded_lines += 1;
            return;
        };
        let value = value as u16;

        let index = shared.sample_index;
        shared.sample_index += 1;
        shared.stats.accepted_samples += 1;
        shared.rings.push(value);

        let _ = self.samples_tx.send(RawSample { value, index });

        let state = &mut *shared;
        for decoder in &mut state.decoders {
            decoder.tick(value, index, &mut self.scratch, &mut state.stats);
        }
        for event in self.scratch.drain(..) {
            let _ = self.events_tx.send(SessionEvent::Decoded(event));
        }

        if state.mode == CaptureMode::Single && state.rings.is_full() && !state.window_full_notified
        {
            state.window_full_notified = true;
            log::debug!("Single-capture window full at sample {index}");
            let _ = self
                .events_tx
                .send(SessionEvent::WindowFull { sample_index: index });
        }
    }
}

fn acquisition_loop(core: &mut AcquisitionCore, link: &ProbeLink, stop: &AtomicBool) {
    log::debug!("Acquisition loop running");
    let mut buf = [0u8; 1024];

    while !stop.load(Ordering::Relaxed) {
        match link.read_chunk(&mut buf) {
            Ok(0) => {} // read timeout, check the stop flag again
            Ok(n) => core.ingest(&buf[..n]),
            Err(e) => {
                // Mid-stream IO errors are not retried.
                log::warn!("Acquisition read failed, stopping: {e}");
                break;
            }
        }
    }

    link.close();
    log::debug!("Acquisition loop exited");
}

fn lock_shared(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One capture session against one device. Multiple sessions may run
/// concurrently; nothing is shared between them.
pub struct CaptureSession {
    link: ProbeLink,
    shared: Arc<Mutex<SharedState>>,
    samples_rx: Receiver<RawSample>,
    events_rx: Receiver<SessionEvent>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Discover and connect a device, then spawn the acquisition worker.
    /// A transport that fails to open surfaces here, once; the worker itself
    /// never reports connection problems.
    pub fn connect(port: Option<&str>) -> Result<Self, SessionError> {
        let link = ProbeConnector::connect(port)?;
        Ok(Self::with_link(link, DEFAULT_CAPACITY))
    }

    /// Run a session over an arbitrary byte stream (tests, replays).
    pub fn over_stream(stream: Box<dyn ByteStream>) -> Self {
        Self::with_link(ProbeLink::from_stream(stream), DEFAULT_CAPACITY)
    }

    /// Spawn the acquisition worker over an open link.
    pub fn with_link(link: ProbeLink, window_capacity: usize) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            decoders: Vec::new(),
            rings: ChannelRings::new(CHANNEL_COUNT, window_capacity),
            stats: DecodeStats::default(),
            sample_index: 0,
            mode: CaptureMode::default(),
            window_full_notified: false,
        }));
        let (samples_tx, samples_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let mut core = AcquisitionCore {
            shared: Arc::clone(&shared),
            samples_tx,
            events_tx,
            pending: Vec::new(),
            scratch: Vec::new(),
        };
        let loop_link = link.clone();
        let loop_stop = Arc::clone(&stop);
        let worker = std::thread::Builder::new()
            .name("logicprobe-acquisition".to_string())
            .spawn(move || acquisition_loop(&mut core, &loop_link, &loop_stop))
            .expect("Failed to spawn acquisition thread");

        Self {
            link,
            shared,
            samples_rx,
            events_rx,
            stop,
            worker: Some(worker),
        }
    }

    /// Raw `(value, index)` stream for the renderer.
    pub fn samples(&self) -> Receiver<RawSample> {
        self.samples_rx.clone()
    }

    /// Decoded events and session notifications.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn link(&self) -> &ProbeLink {
        &self.link
    }

    /// Tell the device to start streaming samples.
    pub fn start(&self) -> Result<(), SessionError> {
        self.link.send_start()?;
        Ok(())
    }

    /// Tell the device to stop streaming samples.
    pub fn stop(&self) -> Result<(), SessionError> {
        self.link.send_stop()?;
        Ok(())
    }

    /// Clear ring buffers, reset every decoder to idle, and restart sample
    /// indexing from zero. Required after a channel remap so no decoder state
    /// straddles the reconfiguration.
    pub fn clear(&self) {
        let mut shared = lock_shared(&self.shared);
        shared.rings.clear();
        shared.sample_index = 0;
        shared.stats = DecodeStats::default();
        shared.window_full_notified = false;
        for decoder in &mut shared.decoders {
            decoder.reset();
        }
        log::debug!("Session buffers and decode state cleared");
    }

    /// Replace the decoder bank. Fresh decoders start idle; callers remapping
    /// channels mid-stream pair this with [`Self::clear`].
    pub fn set_decoders(&self, decoders: Vec<ProtocolDecoder>) {
        lock_shared(&self.shared).decoders = decoders;
    }

    pub fn add_decoder(&self, decoder: ProtocolDecoder) {
        lock_shared(&self.shared).decoders.push(decoder);
    }

    pub fn set_capture_mode(&self, mode: CaptureMode) {
        lock_shared(&self.shared).mode = mode;
    }

    pub fn capture_mode(&self) -> CaptureMode {
        lock_shared(&self.shared).mode
    }

    /// Recompute the trigger masks and ship both to the device.
    pub fn apply_trigger(&self, settings: &TriggerSettings) -> Result<(), SessionError> {
        self.link.send_trigger_edge_mask(settings.edge_mask())?;
        self.link.send_trigger_enable_mask(settings.enable_mask())?;
        Ok(())
    }

    /// Derive the device timers for a rate/count request and ship them.
    pub fn apply_timing(&self, sample_rate_hz: u32, sample_count: u32) -> Result<TimingPlan, SessionError> {
        let plan = TimingPlan::derive(sample_rate_hz, sample_count)?;
        self.link.send_sample_period(plan.sample_period)?;
        self.link.send_trigger_timer(plan.period16, plan.prescaler)?;
        Ok(plan)
    }

    pub fn stats(&self) -> DecodeStats {
        lock_shared(&self.shared).stats
    }

    /// Index the next accepted sample will receive.
    pub fn sample_index(&self) -> u64 {
        lock_shared(&self.shared).sample_index
    }

    /// Snapshot-copy of the ring-buffer window.
    pub fn window(&self) -> SampleWindow {
        lock_shared(&self.shared).rings.snapshot()
    }

    /// Whether the worker is still serving the transport.
    pub fn is_active(&self) -> bool {
        !self.stop.load(Ordering::Relaxed) && self.link.is_open()
    }

    /// Stop the worker cooperatively and close the transport.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.link.close();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{EventKind, I2cConfig, I2cDecoder, UartConfig, UartDecoder};
    use crate::probe_link::test_stream::{ScriptedStream, StreamProbe};
    use crate::trigger_config::TriggerMode;
    use std::time::Duration;

    const RECV: Duration = Duration::from_millis(500);

    fn session_over(input: impl Into<Vec<u8>>, capacity: usize) -> (CaptureSession, StreamProbe) {
        let (stream, probe) = ScriptedStream::new(input, 3);
        let link = ProbeLink::from_stream(Box::new(stream));
        (CaptureSession::with_link(link, capacity), probe)
    }

    fn collect_samples(session: &CaptureSession, n: usize) -> Vec<RawSample> {
        let rx = session.samples();
        (0..n).map(|_| rx.recv_timeout(RECV).expect("sample")).collect()
    }

    #[test]
    fn indices_increase_by_one_across_malformed_lines() {
        let (session, _probe) = session_over(&b"5\nbogus\n3\n\n250\n12junk\n7\n"[..], 64);
        let samples = collect_samples(&session, 4);

        let values: Vec<u16> = samples.iter().map(|s| s.value).collect();
        let indices: Vec<u64> = samples.iter().map(|s| s.index).collect();
        assert_eq!(values, vec![5, 3, 250, 7]);
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let stats = session.stats();
        assert_eq!(stats.accepted_samples, 4);
        assert_eq!(stats.discarded_lines, 2);
    }

    #[test]
    fn out_of_range_values_are_discarded() {
        let (session, _probe) = session_over(&b"256\n255\n"[..], 64);
        let samples = collect_samples(&session, 1);
        assert_eq!(samples[0].value, 255);
        assert_eq!(samples[0].index, 0);
        assert_eq!(session.stats().discarded_lines, 1);
    }

    #[test]
    fn lines_split_across_chunk_boundaries_survive() {
        // Chunk size 3 slices "123\n77\n" mid-number; the carry buffer must
        // reassemble both lines.
        let (session, _probe) = session_over(&b"123\n77\n"[..], 64);
        let samples = collect_samples(&session, 2);
        assert_eq!(samples[0].value, 123);
        assert_eq!(samples[1].value, 77);
    }

    #[test]
    fn i2c_events_flow_through_the_session() {
        // START + address 0xA5 + ACK + data 0x3C + ACK + STOP, one level set
        // per line. SCL on channel 1, SDA on channel 0.
        let mut lines = String::from("3\n2\n");
        for byte in [0xA5u8, 0x3C] {
            for i in (0..8).rev() {
                let sda = (byte >> i) & 1;
                lines.push_str(&format!("{}\n{}\n", sda, 2 + sda));
            }
            lines.push_str("0\n2\n"); // ACK bit low
        }
        lines.push_str("0\n2\n3\n"); // SDA rises while SCL high: STOP

        let (session, _probe) = session_over(lines.into_bytes(), 256);
        session.set_decoders(vec![ProtocolDecoder::I2c(I2cDecoder::new(
            0,
            I2cConfig::new(1, 0).unwrap(),
        ))]);

        let events = session.events();
        let mut kinds = Vec::new();
        for _ in 0..6 {
            match events.recv_timeout(RECV).expect("event") {
                SessionEvent::Decoded(e) => kinds.push(e.kind),
                SessionEvent::WindowFull { .. } => panic!("unexpected notification"),
            }
        }

        assert_eq!(kinds[0], EventKind::I2cStart);
        assert!(matches!(
            kinds[1],
            EventKind::I2cAddress { address: 0xA5, .. }
        ));
        assert!(matches!(kinds[3], EventKind::I2cData(0x3C)));
        assert!(matches!(kinds[5], EventKind::I2cStop { .. }));
    }

    #[test]
    fn clear_restarts_indexing_and_decoder_state() {
        let (session, probe) = session_over(&b"1\n2\n3\n"[..], 64);
        session.add_decoder(ProtocolDecoder::Uart(UartDecoder::new(
            0,
            UartConfig::new(0, 9600).unwrap(),
        )));
        let samples = session.samples();
        for _ in 0..3 {
            samples.recv_timeout(RECV).expect("sample");
        }

        session.clear();
        assert_eq!(session.sample_index(), 0);
        assert_eq!(session.stats(), DecodeStats::default());
        assert!(session.window().is_empty());

        probe.feed(b"9\n");
        let next = samples.recv_timeout(RECV).expect("sample");
        assert_eq!(next.index, 0);
        assert_eq!(next.value, 9);
    }

    #[test]
    fn channel_remap_plus_clear_leaves_no_stale_state() {
        // Drive an I2C decoder into the middle of a transaction, then swap
        // the clock/data mapping and clear. The next transaction on the new
        // mapping must decode from a clean idle state.
        let (session, probe) = session_over(&b"3\n2\n0\n2\n1\n3\n"[..], 256);
        session.set_decoders(vec![ProtocolDecoder::I2c(I2cDecoder::new(
            0,
            I2cConfig::new(1, 0).unwrap(),
        ))]);
        let events = session.events();
        // Start condition arrives; the decoder is now mid-address.
        match events.recv_timeout(RECV).expect("event") {
            SessionEvent::Decoded(e) => assert_eq!(e.kind, EventKind::I2cStart),
            other => panic!("unexpected event {other:?}"),
        }
        // Let the worker drain the whole first burst before reconfiguring.
        let deadline = std::time::Instant::now() + RECV;
        while session.sample_index() < 6 {
            assert!(std::time::Instant::now() < deadline, "ingest stalled");
            std::thread::sleep(Duration::from_millis(1));
        }

        // Remap: SCL now on channel 0, SDA on channel 1.
        session.set_decoders(vec![ProtocolDecoder::I2c(I2cDecoder::new(
            0,
            I2cConfig::new(0, 1).unwrap(),
        ))]);
        session.clear();
        assert_eq!(session.sample_index(), 0);

        // Full transaction with the lines swapped: value bit0 = SCL, bit1 = SDA.
        let mut lines = String::from("3\n1\n");
        for i in (0..8).rev() {
            let sda = (0x42u8 >> i) & 1;
            lines.push_str(&format!("{}\n{}\n", 2 * sda, 2 * sda + 1));
        }
        lines.push_str("0\n1\n3\n");
        probe.feed(lines.as_bytes());

        let mut kinds = Vec::new();
        for _ in 0..3 {
            match events.recv_timeout(RECV).expect("event") {
                SessionEvent::Decoded(e) => kinds.push(e.kind),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(kinds[0], EventKind::I2cStart);
        assert!(matches!(
            kinds[1],
            EventKind::I2cAddress { address: 0x42, .. }
        ));
        assert!(matches!(kinds[2], EventKind::I2cAck(_)));
    }

    #[test]
    fn single_capture_notifies_once_when_the_window_fills() {
        let (session, probe) = session_over(Vec::new(), 4);
        session.set_capture_mode(CaptureMode::Single);
        probe.feed(b"1\n2\n3\n4\n5\n6\n");

        let events = session.events();
        match events.recv_timeout(RECV).expect("notification") {
            SessionEvent::WindowFull { sample_index } => assert_eq!(sample_index, 3),
            other => panic!("unexpected event {other:?}"),
        }
        // The remaining samples must not re-trigger the notification.
        assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(session.stats().accepted_samples, 6);
    }

    #[test]
    fn control_commands_reach_the_wire() {
        let (session, probe) = session_over(Vec::new(), 64);

        session.start().unwrap();
        let mut settings = TriggerSettings::new();
        settings.set_mode(0, TriggerMode::Rising).unwrap();
        settings.set_mode(2, TriggerMode::Falling).unwrap();
        settings.set_mode(3, TriggerMode::Rising).unwrap();
        session.apply_trigger(&settings).unwrap();
        let plan = session.apply_timing(1_000_000, 300).unwrap();
        session.stop().unwrap();

        assert_eq!(plan.sample_period, 72);
        assert_eq!(plan.period16, 21_600);
        assert_eq!(plan.prescaler, 1);
        let written = probe.written.lock().unwrap();
        assert_eq!(
            written.as_slice(),
            &b"0002093013500607248496701111"[..]
        );
    }

    #[test]
    fn shutdown_stops_the_worker_and_closes_the_link() {
        let (session, _probe) = session_over(Vec::new(), 64);
        let link = session.link().clone();
        assert!(session.is_active());
        session.shutdown();
        assert!(!link.is_open());
    }
}
