// Performance options - Typed configuration for assisted performances

use crate::midi::event::{Message, command};
use serde::{Deserialize, Serialize};

/// Which tracks a substituted controller is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyTo {
    /// The live performer's track only
    Solo,
    /// Every switched-on track except the live performer's
    Others,
    /// Every switched-on track
    Both,
}

/// The message synthesised for a substituted controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlTarget {
    ChannelPressure,
    PitchWheel,
    /// A control change with this controller number
    Controller(u8),
}

impl ControlTarget {
    pub fn message(&self, channel: u8, value: u8) -> Message {
        let channel = channel & 0x0F;
        match *self {
            ControlTarget::ChannelPressure => {
                Message::two_byte(command::CHANNEL_PRESSURE | channel, value)
            }
            ControlTarget::PitchWheel => Message::new(command::PITCH_WHEEL | channel, 0, value),
            ControlTarget::Controller(cc) => Message::control_change(channel, cc, value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSubstitution {
    pub target: ControlTarget,
    pub apply_to: ApplyTo,
}

/// How the performer's key velocity shapes the notes of a subsequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityMode {
    /// Every note takes the performed velocity
    Overridden,
    /// The notated velocity scaled by the performed one
    Scaled,
    /// The mean of notated and performed velocity
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityOption {
    pub mode: VelocityMode,
    pub min_velocity: u8,
}

impl VelocityOption {
    /// Result is clamped to `min_velocity..=127` and never 0
    pub fn apply(&self, notated: u8, performed: u8) -> u8 {
        let notated = notated.min(127) as u16;
        let performed = performed.min(127) as u16;
        let min = self.min_velocity.min(127) as u16;
        let value = match self.mode {
            VelocityMode::Overridden => performed,
            VelocityMode::Scaled => {
                let range = notated.saturating_sub(min);
                min + range * performed / 127
            }
            VelocityMode::Shared => (notated + performed) / 2,
        };
        value.clamp(min.max(1), 127) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoteOffBehavior {
    /// Releasing the key silences the sounding subsequence
    #[default]
    Silence,
    /// The subsequence keeps playing after the key is released
    Sustain,
}

/// Per-performance options. `None` leaves the notated value untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceOptions {
    /// Sustain pedal (CC 64) sent to each switched-on track when a subsequence starts
    pub pedal: Option<bool>,
    pub velocity: Option<VelocityOption>,
    /// Multiplies the playback speed of every subsequence
    pub speed_factor: Option<f64>,
    pub note_off: Option<NoteOffBehavior>,
}

impl PerformanceOptions {
    pub fn note_off_behavior(&self) -> NoteOffBehavior {
        self.note_off.unwrap_or_default()
    }
}

/// Which notes take the performer's pitch and velocity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteOverrides {
    pub solo_pitch: bool,
    pub other_tracks_pitch: bool,
    pub solo_velocity: bool,
    pub other_tracks_velocity: bool,
}

impl NoteOverrides {
    pub fn any(&self) -> bool {
        self.solo_pitch || self.other_tracks_pitch || self.solo_velocity || self.other_tracks_velocity
    }

    pub fn pitch(&self, is_solo: bool) -> bool {
        if is_solo { self.solo_pitch } else { self.other_tracks_pitch }
    }

    pub fn velocity(&self, is_solo: bool) -> bool {
        if is_solo {
            self.solo_velocity
        } else {
            self.other_tracks_velocity
        }
    }
}

/// Everything the dispatcher needs besides the sequence itself
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantOptions {
    pub live_performer_track: usize,
    /// Follow the performer's tempo: each subsequence plays at the speed
    /// implied by how long the previous one actually took
    pub relative_durations: bool,
    pub overrides: NoteOverrides,
    pub pressure: Option<ControllerSubstitution>,
    pub pitch_wheel: Option<ControllerSubstitution>,
    pub modulation: Option<ControllerSubstitution>,
    pub performance: PerformanceOptions,
}
