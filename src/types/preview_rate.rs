//! Update rate control for preview streams

use serde::{Deserialize, Serialize};

use super::FrameRate;

/// Rate at which a preview subscriber receives delivered frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PreviewRate {
    /// Every frame the sink delivers
    Native,

    /// Throttled to maximum Hz
    /// If the requested rate meets or exceeds the sink rate, Native is used
    Max(u32),
}

impl PreviewRate {
    /// Normalize against the sink's output rate
    pub fn normalize(self, sink_rate: FrameRate) -> Self {
        match self {
            PreviewRate::Native => PreviewRate::Native,
            PreviewRate::Max(0) => PreviewRate::Native,
            PreviewRate::Max(hz) if hz as f64 >= sink_rate.fps() => PreviewRate::Native,
            PreviewRate::Max(hz) => PreviewRate::Max(hz),
        }
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self, sink_rate: FrameRate) -> Option<std::time::Duration> {
        match self.normalize(sink_rate) {
            PreviewRate::Native => None,
            PreviewRate::Max(hz) => Some(std::time::Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rates_above_sink_rate_are_native() {
        let sink = FrameRate::new(25, 1);
        assert_eq!(PreviewRate::Max(30).normalize(sink), PreviewRate::Native);
        assert_eq!(PreviewRate::Max(25).normalize(sink), PreviewRate::Native);
        assert_eq!(PreviewRate::Max(0).normalize(sink), PreviewRate::Native);
        assert_eq!(PreviewRate::Max(10).normalize(sink), PreviewRate::Max(10));
    }

    #[test]
    fn throttle_interval_only_when_needed() {
        let sink = FrameRate::new(30, 1);
        assert_eq!(PreviewRate::Native.throttle_interval(sink), None);
        assert_eq!(PreviewRate::Max(10).throttle_interval(sink), Some(Duration::from_millis(100)));
    }
}
