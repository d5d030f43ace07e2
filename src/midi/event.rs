// MIDI messages - Output payloads and classified live input

use crate::error::PerformerError;
use serde::{Deserialize, Serialize};

/// Status nibbles (command & 0xF0)
pub mod command {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const AFTERTOUCH: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_WHEEL: u8 = 0xE0;
}

/// Controller numbers used by the engine
pub mod control {
    pub const MODULATION_WHEEL: u8 = 1;
    pub const SUSTAIN_PEDAL: u8 = 64;
}

/// One MIDI output unit: a status byte followed by one or two data bytes.
///
/// Messages carry no time of their own; the containing moment does.
/// Deserialized bytes go through [`Message::from_bytes`], so a message
/// always starts with a channel status byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    bytes: Vec<u8>,
}

#[derive(Deserialize)]
struct RawMessage {
    bytes: Vec<u8>,
}

impl TryFrom<RawMessage> for Message {
    type Error = PerformerError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        Message::from_bytes(&raw.bytes).ok_or_else(|| {
            PerformerError::Config(format!("invalid MIDI message bytes {:02x?}", raw.bytes))
        })
    }
}

impl Message {
    /// Three-byte channel message
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            bytes: vec![status, data1 & 0x7F, data2 & 0x7F],
        }
    }

    /// Two-byte channel message (program change, channel pressure)
    pub fn two_byte(status: u8, data1: u8) -> Self {
        Self {
            bytes: vec![status, data1 & 0x7F],
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(command::NOTE_ON | (channel & 0x0F), note, velocity)
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self::new(command::NOTE_OFF | (channel & 0x0F), note, 64)
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::new(command::CONTROL_CHANGE | (channel & 0x0F), controller, value)
    }

    /// Parse raw bytes. Returns None unless the first byte is a channel
    /// status byte followed by the data bytes its command requires.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if status & 0x80 == 0 || status >= 0xF0 {
            return None;
        }
        let len = match status & 0xF0 {
            command::PROGRAM_CHANGE | command::CHANNEL_PRESSURE => 2,
            _ => 3,
        };
        if bytes.len() < len || bytes[1..len].iter().any(|b| b & 0x80 != 0) {
            return None;
        }
        Some(Self {
            bytes: bytes[..len].to_vec(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// Command nibble (status & 0xF0)
    pub fn command(&self) -> u8 {
        self.bytes[0] & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    pub fn data1(&self) -> u8 {
        self.bytes.get(1).copied().unwrap_or(0)
    }

    pub fn data2(&self) -> u8 {
        self.bytes.get(2).copied().unwrap_or(0)
    }

    /// NOTE_ON with a non-zero velocity
    pub fn is_note_on(&self) -> bool {
        self.command() == command::NOTE_ON && self.data2() > 0
    }

    /// NOTE_OFF, or NOTE_ON with velocity 0
    pub fn is_note_off(&self) -> bool {
        self.command() == command::NOTE_OFF
            || (self.command() == command::NOTE_ON && self.data2() == 0)
    }

    pub(crate) fn set_data1(&mut self, value: u8) {
        if let Some(byte) = self.bytes.get_mut(1) {
            *byte = value & 0x7F;
        }
    }

    pub(crate) fn set_data2(&mut self, value: u8) {
        if let Some(byte) = self.bytes.get_mut(2) {
            *byte = value & 0x7F;
        }
    }
}

/// Classification of a live input message, keyed on its command nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ChannelPressure,
    Aftertouch,
    ModulationWheel,
    PitchWheel,
    NoteOn,
    NoteOff,
    Unknown,
}

/// A message received from the live input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputMessage {
    pub command: u8,
    pub channel: u8,
    pub data1: u8,
    pub data2: u8,
    /// Device timestamp in microseconds, as delivered by the driver
    pub arrival: u64,
}

impl InputMessage {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            command: status & 0xF0,
            channel: status & 0x0F,
            data1,
            data2,
            arrival: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8], arrival: u64) -> Option<Self> {
        let status = *bytes.first()?;
        if status & 0x80 == 0 {
            return None;
        }
        Some(Self {
            command: status & 0xF0,
            channel: status & 0x0F,
            data1: bytes.get(1).copied().unwrap_or(0),
            data2: bytes.get(2).copied().unwrap_or(0),
            arrival,
        })
    }

    pub fn kind(&self) -> InputKind {
        match self.command {
            command::CHANNEL_PRESSURE => InputKind::ChannelPressure,
            command::AFTERTOUCH => InputKind::Aftertouch,
            command::CONTROL_CHANGE if self.data1 == control::MODULATION_WHEEL => {
                InputKind::ModulationWheel
            }
            command::PITCH_WHEEL => InputKind::PitchWheel,
            command::NOTE_ON if self.data2 > 0 => InputKind::NoteOn,
            command::NOTE_ON | command::NOTE_OFF => InputKind::NoteOff,
            _ => InputKind::Unknown,
        }
    }

    /// The continuous value carried by a controller-type message
    pub fn controller_value(&self) -> u8 {
        match self.kind() {
            InputKind::ChannelPressure => self.data1,
            _ => self.data2,
        }
    }
}
