//! Rollover counter (ROC) reconstruction for SRTP (RFC 3711 section 3.3.1, appendix A).
//!
//! The wire carries a 16-bit sequence number, but the cipher needs the full
//! 48-bit packet index `ROC << 16 | SEQ`. [`RolloverCounter`] remembers the
//! highest index accepted for one SSRC and guesses the ROC of each new packet
//! from it.
//!
//! The work is split in two phases so that nothing is mutated before a packet
//! has actually been accepted:
//!
//! - [`RolloverCounter::estimate`] is pure and returns a [`RolloverEstimate`];
//! - [`RolloverCounter::apply`] consumes that estimate and commits it.

/// Half of the 16-bit sequence space.
const SEQ_NUM_MEDIAN: i32 = 1 << 15;

/// Size of the 16-bit sequence space.
const SEQ_NUM_MAX: i32 = 1 << 16;

/// Largest 48-bit packet index.
pub const MAX_INDEX: u64 = (1 << 48) - 1;

/// Which ROC epoch a packet belongs to, relative to the stored counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Epoch {
    /// A late packet sent before the most recent wrap (ROC - 1).
    Previous,
    /// No wrap implied.
    Current,
    /// The sequence number wrapped forward (ROC + 1).
    Next,
}

impl Epoch {
    /// Signed change this epoch implies for the stored ROC.
    pub fn roc_delta(self) -> i8 {
        match self {
            Epoch::Previous => -1,
            Epoch::Current => 0,
            Epoch::Next => 1,
        }
    }
}

/// Proposed outcome of reconstructing the index of one packet.
///
/// Not `Clone`: an estimate is applied at most once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an estimate does nothing until it is applied"]
pub struct RolloverEstimate {
    roc: u32,
    seq: u16,
    epoch: Epoch,
    /// Distance from the stored high-water sequence, in the guessed epoch.
    advance: i32,
    overflow: bool,
    bootstrap: bool,
}

impl RolloverEstimate {
    /// Guessed rollover counter for this packet.
    pub fn roc(&self) -> u32 {
        self.roc
    }

    pub fn seq(&self) -> u16 {
        self.seq
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// True when accepting this packet would push the ROC past `u32::MAX`,
    /// i.e. beyond 2^48 packets under one key.
    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// The 48-bit packet index `ROC << 16 | SEQ`.
    pub fn index(&self) -> u64 {
        (u64::from(self.roc) << 16) | u64::from(self.seq)
    }
}

/// ROC and highest accepted sequence number for one SSRC.
///
/// Both are kept as a single 48-bit high-water index, which makes "never
/// decrement the ROC" and "never regress the highest sequence" the same
/// invariant.
#[derive(Debug, Clone, Default)]
pub struct RolloverCounter {
    index: u64,
    /// False until the first packet has been committed.
    started: bool,
}

impl RolloverCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known ROC; the next packet's sequence number is adopted as-is.
    pub fn with_roc(roc: u32) -> Self {
        Self {
            index: u64::from(roc) << 16,
            started: false,
        }
    }

    pub fn roc(&self) -> u32 {
        (self.index >> 16) as u32
    }

    /// Highest sequence number committed so far, `None` before the first packet.
    pub fn highest_sequence(&self) -> Option<u16> {
        self.started.then_some(self.index as u16)
    }

    /// Reset to `roc` and wait for the next packet to bootstrap the sequence.
    pub fn set_roc(&mut self, roc: u32) {
        *self = Self::with_roc(roc);
    }

    /// Guess the ROC for `seq` without touching the stored state.
    pub fn estimate(&self, seq: u16) -> RolloverEstimate {
        let local_roc = self.roc();

        if !self.started {
            return RolloverEstimate {
                roc: local_roc,
                seq,
                epoch: Epoch::Current,
                advance: 0,
                overflow: false,
                bootstrap: true,
            };
        }

        let seq_i = i32::from(seq);
        let local_seq = (self.index & 0xFFFF) as i32;

        // While the high-water index is still in the first half of epoch 0
        // there is no previous epoch to fall back to.
        let (epoch, advance) = if self.index <= SEQ_NUM_MEDIAN as u64 {
            (Epoch::Current, seq_i - local_seq)
        } else if local_seq < SEQ_NUM_MEDIAN {
            if seq_i - local_seq > SEQ_NUM_MEDIAN {
                (Epoch::Previous, seq_i - local_seq - SEQ_NUM_MAX)
            } else {
                (Epoch::Current, seq_i - local_seq)
            }
        } else if local_seq - SEQ_NUM_MEDIAN > seq_i {
            (Epoch::Next, seq_i - local_seq + SEQ_NUM_MAX)
        } else {
            (Epoch::Current, seq_i - local_seq)
        };

        let (roc, overflow) = match epoch {
            Epoch::Previous => (local_roc.saturating_sub(1), false),
            Epoch::Current => (local_roc, false),
            Epoch::Next => match local_roc.checked_add(1) {
                Some(roc) => (roc, false),
                None => (0, true),
            },
        };

        RolloverEstimate {
            roc,
            seq,
            epoch,
            advance,
            overflow,
            bootstrap: false,
        }
    }

    /// Commit an estimate produced by [`estimate`](Self::estimate) on this counter.
    ///
    /// Only forward movement is recorded: a late packet from the previous
    /// epoch, or an older packet in the current one, leaves the state as is.
    pub fn apply(&mut self, estimate: RolloverEstimate) {
        if estimate.bootstrap {
            self.index = (self.index & !0xFFFF) | u64::from(estimate.seq);
            self.started = true;
            return;
        }

        if estimate.advance > 0 {
            let before = self.roc();
            self.index = (self.index + estimate.advance as u64) & MAX_INDEX;
            if self.roc() != before {
                tracing::debug!("ROC advanced {} -> {}", before, self.roc());
            }
        }
    }
}
