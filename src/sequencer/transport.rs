// Transport - Playback state shared by sequences and the dispatcher

/// Exactly one of these holds at any time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Paused,
    Running,
}

impl PlaybackState {
    pub fn is_running(&self) -> bool {
        matches!(self, PlaybackState::Running)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackState::Stopped)
    }
}

/// What the event loop should do after a tick returns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Call `tick` again after `delay` ms (may be zero or negative: fire at once)
    Rearm { delay: f64 },
    /// Nothing left to schedule
    Idle,
}
