use std::time::Duration;

/// Counters kept by the render loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderMetrics {
    frames_rendered: u64,
    frames_with_hand: u64,
    last_render_duration: Option<Duration>,
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, hand_present: bool, duration: Duration) {
        self.frames_rendered += 1;
        if hand_present {
            self.frames_with_hand += 1;
        }
        self.last_render_duration = Some(duration);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frames_with_hand(&self) -> u64 {
        self.frames_with_hand
    }

    pub fn last_render_duration(&self) -> Option<Duration> {
        self.last_render_duration
    }
}
