//! Rational frame rate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Source pacing as a rational `numerator / denominator` frames per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    /// Rate used when a source does not advertise one
    pub const DEFAULT: FrameRate = FrameRate { numerator: 25, denominator: 1 };

    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// Highest rate the sink will pace at
    pub const MAX_FPS: u64 = 1_000;

    /// Lowest rate the sink will pace at, in frames per minute
    pub const MIN_FRAMES_PER_MINUTE: u64 = 1;

    /// A rate with a zero term, or outside one frame per minute to
    /// [`FrameRate::MAX_FPS`], is treated as "not advertised"
    pub fn is_valid(self) -> bool {
        let numerator = u64::from(self.numerator);
        let denominator = u64::from(self.denominator);
        numerator > 0
            && denominator > 0
            && numerator <= denominator * Self::MAX_FPS
            && numerator * 60 >= denominator * Self::MIN_FRAMES_PER_MINUTE
    }

    /// Resolve an advertised rate, falling back to [`FrameRate::DEFAULT`]
    pub fn resolve(advertised: Option<FrameRate>) -> FrameRate {
        advertised.filter(|rate| rate.is_valid()).unwrap_or(Self::DEFAULT)
    }

    /// Frames per second as a float
    pub fn fps(self) -> f64 {
        if !self.is_valid() {
            return Self::DEFAULT.fps();
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// Time between two frames
    pub fn interval(self) -> Duration {
        let rate = if self.is_valid() { self } else { Self::DEFAULT };
        Duration::from_secs_f64(rate.denominator as f64 / rate.numerator as f64)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
