//! Bounded per-channel bit history.
//!
//! The acquisition loop is the single writer; the renderer takes snapshot
//! copies. Each channel keeps the most recent `capacity` samples and retires
//! the oldest bit on overflow. A [`SampleWindow`] snapshot carries the index
//! of its first retained sample, which is what maps a decoded event's sample
//! index back into (or out of) the live window.

use std::collections::VecDeque;

/// Default per-channel window, matching the device's streaming burst size.
pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct ChannelRings {
    lanes: Vec<VecDeque<u8>>,
    capacity: usize,
    total: u64,
}

impl ChannelRings {
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            lanes: (0..channels)
                .map(|_| VecDeque::with_capacity(capacity))
                .collect(),
            capacity,
            total: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.lanes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples retained right now (0 to capacity).
    pub fn len(&self) -> usize {
        self.lanes.first().map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Total samples ever pushed since the last clear.
    pub fn total_samples(&self) -> u64 {
        self.total
    }

    /// Fan one multiplexed sample into every lane, retiring the oldest bit
    /// once capacity is exceeded.
    pub fn push(&mut self, raw: u16) {
        for (channel, lane) in self.lanes.iter_mut().enumerate() {
            if lane.len() >= self.capacity {
                lane.pop_front();
            }
            lane.push_back(((raw >> channel) & 1) as u8);
        }
        self.total += 1;
    }

    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
        self.total = 0;
    }

    /// Snapshot-copy of the current window for the renderer.
    pub fn snapshot(&self) -> SampleWindow {
        SampleWindow {
            start_index: self.total - self.len() as u64,
            lanes: self.lanes.iter().map(|l| l.iter().copied().collect()).collect(),
        }
    }
}

/// An immutable copy of the retained sample span across all channels.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    start_index: u64,
    lanes: Vec<Vec<u8>>,
}

impl SampleWindow {
    /// Sample index of the oldest retained sample.
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    pub fn len(&self) -> usize {
        self.lanes.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit history of one channel, oldest first.
    pub fn channel(&self, channel: usize) -> &[u8] {
        &self.lanes[channel]
    }

    /// Map an event's sample index to its position in the window, or `None`
    /// once the sample has been retired by overwrite. This is the retirement
    /// contract consumed by the renderer's cursor bookkeeping.
    pub fn position_of(&self, sample_index: u64) -> Option<usize> {
        if sample_index < self.start_index {
            return None;
        }
        let offset = sample_index - self.start_index;
        (offset < self.len() as u64).then_some(offset as usize)
    }
}
