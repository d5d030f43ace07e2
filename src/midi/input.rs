// MIDI Input - Receives live performer events on the driver thread

use crate::error::{PerformerError, PerformerResult};
use crate::messaging::channels::InputProducer;
use crate::midi::device;
use crate::midi::event::InputMessage;
use midir::{MidiInput as MidirInput, MidiInputConnection};

/// Keeps the midir connection alive; dropping it disconnects the port
pub struct MidiInputSource {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiInputSource {
    /// Connect to the named port (or the first available one) and forward
    /// every channel message into `input_tx`
    pub fn connect(port_name: Option<&str>, mut input_tx: InputProducer) -> PerformerResult<Self> {
        let mut midi_in = MidirInput::new("Assisted Performer Input")
            .map_err(|e| PerformerError::Device(format!("MIDI init error: {}", e)))?;
        midi_in.ignore(midir::Ignore::All);

        let port = device::find_input_port(&midi_in, port_name).ok_or_else(|| {
            PerformerError::Device(match port_name {
                Some(name) => format!("MIDI input port not found: {}", name),
                None => "No MIDI input port detected".to_string(),
            })
        })?;
        let name = midi_in
            .port_name(&port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_in
            .connect(
                &port,
                "assisted-performer-input",
                move |stamp, message, _| {
                    // Runs on the driver thread
                    if let Some(input) = InputMessage::from_bytes(message, stamp) {
                        // try_push never blocks
                        if ringbuf::traits::Producer::try_push(&mut input_tx, input).is_err() {
                            log::warn!("MIDI input queue full, event dropped");
                        }
                    }
                },
                (),
            )
            .map_err(|e| PerformerError::Device(format!("MIDI connection failed: {}", e)))?;

        log::info!("Connected to MIDI input port: {}", name);

        Ok(Self {
            _connection: connection,
            port_name: name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}
