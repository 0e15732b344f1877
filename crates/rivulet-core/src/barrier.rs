//! Count-based completion detection for channels fed by multiple
//! uncoordinated producers.
//!
//! A channel is complete exactly when (a) a terminal batch has been seen
//! from every upstream producer and (b) the number of non-terminal batches
//! received equals the sum of the counts those terminals carried. There is
//! no ordering assumption across producers: a terminal may race ahead of
//! data batches still in flight, and the tally simply waits until the
//! running count catches up. An abort closes the channel immediately.

use std::collections::{HashMap, HashSet};

use crate::envelope::{ChannelId, Completion};

/// Where a channel's tally stands after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Still waiting for data and/or terminals.
    Open,
    /// All producers terminated normally and every counted batch arrived.
    Complete,
    /// Some producer aborted; partial state must not be flushed.
    Aborted { code: i32 },
}

/// Per-channel completion bookkeeping.
#[derive(Debug, Clone)]
pub struct ChannelTally {
    producers: u32,
    terminals: u32,
    received: u64,
    expected: Option<u64>,
    abort: Option<i32>,
}

impl ChannelTally {
    /// `producers` is the number of upstream instances writing this
    /// channel into the queue; each is expected to send one terminal.
    pub fn new(producers: u32) -> Self {
        Self {
            producers: producers.max(1),
            terminals: 0,
            received: 0,
            expected: None,
            abort: None,
        }
    }

    /// Fold one batch's completion marker into the tally.
    pub fn observe(&mut self, completion: &Completion) -> BarrierState {
        match completion {
            Completion::Pending => self.received += 1,
            Completion::Finished { sent } => {
                self.terminals += 1;
                *self.expected.get_or_insert(0) += sent;
            }
            Completion::Aborted { code } => self.abort = Some(*code),
        }
        self.state()
    }

    pub fn state(&self) -> BarrierState {
        if let Some(code) = self.abort {
            return BarrierState::Aborted { code };
        }
        if self.terminals >= self.producers && self.expected == Some(self.received) {
            return BarrierState::Complete;
        }
        BarrierState::Open
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn expected(&self) -> Option<u64> {
        self.expected
    }
}

/// Tallies for every channel a worker is currently consuming.
///
/// Settled channels are remembered so that a straggler batch arriving
/// after completion is detected instead of silently reopening the channel.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    tallies: HashMap<ChannelId, ChannelTally>,
    settled: HashSet<ChannelId>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_settled(&self, channel: &ChannelId) -> bool {
        self.settled.contains(channel)
    }

    /// Fold one batch for `channel`; the tally is created lazily with the
    /// configured producer count on first sight.
    pub fn observe(
        &mut self,
        channel: &ChannelId,
        completion: &Completion,
        producers: u32,
    ) -> BarrierState {
        let tally = self
            .tallies
            .entry(channel.clone())
            .or_insert_with(|| ChannelTally::new(producers));
        let state = tally.observe(completion);
        if state != BarrierState::Open {
            self.tallies.remove(channel);
            self.settled.insert(channel.clone());
        }
        state
    }

    pub fn open_channels(&self) -> usize {
        self.tallies.len()
    }
}
