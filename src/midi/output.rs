// MIDI Output - Sinks that receive scheduled message bytes

use crate::error::{PerformerError, PerformerResult};
use crate::midi::device;
use crate::midi::event::command;
use midir::{MidiOutput as MidirOutput, MidiOutputConnection};
use std::cell::RefCell;
use std::rc::Rc;

/// Destination for outgoing messages. Fire-and-forget: a sink never reports
/// back, and must accept timestamps at or before "now" (send immediately).
pub trait OutputSink {
    fn send(&mut self, bytes: &[u8], timestamp: f64);
}

/// Sinks are shared between a sequence and the dispatcher on one thread
pub type SharedSink = Rc<RefCell<dyn OutputSink>>;

/// A message captured by [`CaptureSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub bytes: Vec<u8>,
    pub timestamp: f64,
}

/// In-memory sink, used for offline rendering and tests
#[derive(Debug, Default)]
pub struct CaptureSink {
    sent: Vec<SentMessage>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[SentMessage] {
        &self.sent
    }

    /// Byte payloads only, in send order
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent.iter().map(|m| m.bytes.clone()).collect()
    }

    pub fn take(&mut self) -> Vec<SentMessage> {
        std::mem::take(&mut self.sent)
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

impl OutputSink for CaptureSink {
    fn send(&mut self, bytes: &[u8], timestamp: f64) {
        self.sent.push(SentMessage {
            bytes: bytes.to_vec(),
            timestamp,
        });
    }
}

/// Hardware output through midir. The scheduler only hands over messages
/// that are due within the lookahead, so they are written straight away.
pub struct MidiOutputSink {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidiOutputSink {
    /// Connect to the named port, or the first available one
    pub fn connect(port_name: Option<&str>) -> PerformerResult<Self> {
        let midi_out = MidirOutput::new("Assisted Performer Output")
            .map_err(|e| PerformerError::Device(format!("MIDI init error: {}", e)))?;

        let port = device::find_output_port(&midi_out, port_name).ok_or_else(|| {
            PerformerError::Device(match port_name {
                Some(name) => format!("MIDI output port not found: {}", name),
                None => "No MIDI output port detected".to_string(),
            })
        })?;
        let name = midi_out
            .port_name(&port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_out
            .connect(&port, "assisted-performer-output")
            .map_err(|e| PerformerError::Device(format!("MIDI connection failed: {}", e)))?;

        log::info!("Connected to MIDI output port: {}", name);

        Ok(Self {
            connection,
            port_name: name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl OutputSink for MidiOutputSink {
    fn send(&mut self, bytes: &[u8], _timestamp: f64) {
        if let Err(e) = self.connection.send(bytes) {
            log::warn!("MIDI send failed on {}: {}", self.port_name, e);
        }
    }
}

/// Panic button: a note-off for every note on every channel
pub fn all_notes_off(sink: &mut dyn OutputSink, timestamp: f64) {
    for channel in 0..16u8 {
        for note in 0..128u8 {
            sink.send(&[command::NOTE_OFF | channel, note, 127], timestamp);
        }
    }
}
