// MIDI devices - Port lookup for the input and output connections

use midir::{MidiInput as MidirInput, MidiInputPort, MidiOutput as MidirOutput, MidiOutputPort};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

fn describe(names: impl Iterator<Item = String>) -> Vec<MidiDeviceInfo> {
    names
        .enumerate()
        .map(|(index, name)| MidiDeviceInfo {
            index,
            name,
            // The first port is treated as the default
            is_default: index == 0,
        })
        .collect()
}

/// Names of every available input port
pub fn list_input_ports() -> Vec<MidiDeviceInfo> {
    match MidirInput::new("Assisted Performer Scanner") {
        Ok(midi_in) => describe(
            midi_in
                .ports()
                .iter()
                .filter_map(|port| midi_in.port_name(port).ok()),
        ),
        Err(e) => {
            log::warn!("Cannot scan MIDI inputs: {}", e);
            Vec::new()
        }
    }
}

/// Names of every available output port
pub fn list_output_ports() -> Vec<MidiDeviceInfo> {
    match MidirOutput::new("Assisted Performer Scanner") {
        Ok(midi_out) => describe(
            midi_out
                .ports()
                .iter()
                .filter_map(|port| midi_out.port_name(port).ok()),
        ),
        Err(e) => {
            log::warn!("Cannot scan MIDI outputs: {}", e);
            Vec::new()
        }
    }
}

/// The input port with the given name, or the first one when no name is given
pub fn find_input_port(midi_in: &MidirInput, name: Option<&str>) -> Option<MidiInputPort> {
    let ports = midi_in.ports();
    match name {
        None => ports.into_iter().next(),
        Some(wanted) => ports
            .into_iter()
            .find(|port| midi_in.port_name(port).is_ok_and(|n| n == wanted)),
    }
}

/// The output port with the given name, or the first one when no name is given
pub fn find_output_port(midi_out: &MidirOutput, name: Option<&str>) -> Option<MidiOutputPort> {
    let ports = midi_out.ports();
    match name {
        None => ports.into_iter().next(),
        Some(wanted) => ports
            .into_iter()
            .find(|port| midi_out.port_name(port).is_ok_and(|n| n == wanted)),
    }
}
