use std::cmp::Ordering;

/// Half-open timestamp interval `[min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    min: i64,
    max: i64,
}

impl TimeRange {
    /// Every non-negative timestamp.
    pub const ALL: Self = Self {
        min: 0,
        max: i64::MAX,
    };

    /// `[min, max)`; returns `None` when the interval is empty.
    pub fn new(min: i64, max: i64) -> Option<Self> {
        (min < max).then_some(Self { min, max })
    }

    /// Single timestamp `[ts, ts + 1)`.
    pub fn at(ts: i64) -> Self {
        Self {
            min: ts,
            max: ts.saturating_add(1),
        }
    }

    /// Inclusive lower bound.
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Exclusive upper bound.
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Whether the range covers every timestamp.
    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }

    /// Position of `ts` relative to the range.
    ///
    /// `Less` means older than the range (every later version of the column is
    /// older still), `Greater` means newer than the range (older versions may
    /// still qualify).
    pub fn compare(&self, ts: i64) -> Ordering {
        if ts < self.min {
            Ordering::Less
        } else if ts >= self.max {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Whether `ts` lies inside the range.
    pub fn within(&self, ts: i64) -> bool {
        self.compare(ts) == Ordering::Equal
    }

    /// Whether `ts` lies inside the range or after its upper bound.
    pub fn within_or_after(&self, ts: i64) -> bool {
        ts >= self.min
    }

    /// Whether any timestamp in `[lo, hi]` lies inside the range.
    pub fn overlaps(&self, lo: i64, hi: i64) -> bool {
        hi >= self.min && lo < self.max
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::ALL
    }
}
