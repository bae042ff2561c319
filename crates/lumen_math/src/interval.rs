use serde::{Deserialize, Serialize};

/// Closed range `[min, max]` of a coordinate or ray parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    /// Contains nothing; `include` grows it from here.
    pub const EMPTY: Interval = Interval {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    /// All non-negative ray parameters.
    pub const FORWARD: Interval = Interval {
        min: 0.0,
        max: f64::INFINITY,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        self.min <= x && x <= self.max
    }

    /// Widen by `margin` on both ends.
    pub fn pad(&self, margin: f64) -> Interval {
        Interval::new(self.min - margin, self.max + margin)
    }

    pub fn include(&self, x: f64) -> Interval {
        Interval::new(self.min.min(x), self.max.max(x))
    }

    /// Smallest interval covering both.
    pub fn union(&self, other: &Interval) -> Interval {
        Interval::new(self.min.min(other.min), self.max.max(other.max))
    }
}
