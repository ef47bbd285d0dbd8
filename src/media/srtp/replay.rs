//! Replay protection (RFC 3711 section 3.3.2).
//!
//! A detector is asked about an index first and only told to remember it once
//! the packet has authenticated. The answer to [`ReplayDetector::check`] is a
//! [`ReplayMark`] token that must be handed back to
//! [`ReplayDetector::accept`]; dropping it leaves the detector untouched.

/// Default number of indices tracked behind the highest accepted one.
pub const DEFAULT_WINDOW_SIZE: usize = 64;

/// Proof that an index passed [`ReplayDetector::check`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the index is not recorded until the mark is accepted"]
pub struct ReplayMark {
    index: u64,
}

impl ReplayMark {
    pub fn new(index: u64) -> Self {
        Self { index }
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

/// Duplicate/replay detection for one stream.
pub trait ReplayDetector: Send {
    /// Returns a mark if `index` has not been seen and is not too old.
    fn check(&self, index: u64) -> Option<ReplayMark>;

    /// Record an index previously approved by [`check`](Self::check).
    fn accept(&mut self, mark: ReplayMark);
}

/// How a context protects one direction (SRTP or SRTCP) against replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayProtection {
    /// Sliding window of the given size. A size of zero disables protection.
    Window(usize),
    Disabled,
}

impl Default for ReplayProtection {
    fn default() -> Self {
        ReplayProtection::Window(DEFAULT_WINDOW_SIZE)
    }
}

impl ReplayProtection {
    /// Build a fresh detector for a stream whose indices never exceed `max_index`.
    pub fn detector(self, max_index: u64) -> Box<dyn ReplayDetector> {
        match self {
            ReplayProtection::Window(0) | ReplayProtection::Disabled => {
                Box::new(NoReplayDetection)
            }
            ReplayProtection::Window(size) => Box::new(SlidingWindow::new(size, max_index)),
        }
    }
}

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReplayDetection;

impl ReplayDetector for NoReplayDetection {
    fn check(&self, index: u64) -> Option<ReplayMark> {
        Some(ReplayMark::new(index))
    }

    fn accept(&mut self, _mark: ReplayMark) {}
}

/// Bitmap window anchored at the highest accepted index.
///
/// Bit `k` of the bitmap records whether `latest - k` has been accepted.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    size: usize,
    max_index: u64,
    latest: u64,
    bits: Vec<u64>,
}

impl SlidingWindow {
    pub fn new(size: usize, max_index: u64) -> Self {
        let size = size.max(1);
        Self {
            size,
            max_index,
            latest: 0,
            bits: vec![0; size.div_ceil(64)],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn bit(&self, k: u64) -> bool {
        let k = k as usize;
        self.bits[k / 64] & (1 << (k % 64)) != 0
    }

    fn set_bit(&mut self, k: u64) {
        let k = k as usize;
        self.bits[k / 64] |= 1 << (k % 64);
    }

    /// Move every recorded bit `n` positions further from the head.
    fn shift(&mut self, n: u64) {
        if n >= self.size as u64 {
            self.bits.iter_mut().for_each(|w| *w = 0);
            return;
        }
        let n = n as usize;
        let word_shift = n / 64;
        let bit_shift = n % 64;
        for i in (0..self.bits.len()).rev() {
            let mut word = 0;
            if i >= word_shift {
                let src = i - word_shift;
                word = self.bits[src] << bit_shift;
                if bit_shift > 0 && src > 0 {
                    word |= self.bits[src - 1] >> (64 - bit_shift);
                }
            }
            self.bits[i] = word;
        }
    }
}

impl ReplayDetector for SlidingWindow {
    fn check(&self, index: u64) -> Option<ReplayMark> {
        if index > self.max_index {
            return None;
        }
        if index <= self.latest {
            let behind = self.latest - index;
            if behind >= self.size as u64 || self.bit(behind) {
                return None;
            }
        }
        Some(ReplayMark::new(index))
    }

    fn accept(&mut self, mark: ReplayMark) {
        let index = mark.index;
        if index > self.latest {
            self.shift(index - self.latest);
            self.latest = index;
        }
        let behind = self.latest - index;
        if behind < self.size as u64 {
            self.set_bit(behind);
        }
    }
}
