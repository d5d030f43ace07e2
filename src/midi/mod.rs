// MIDI - Message model and midir device glue

pub mod device;
pub mod event;
pub mod input;
pub mod output;

pub use event::{InputKind, InputMessage, Message};
pub use input::MidiInputSource;
pub use output::{CaptureSink, MidiOutputSink, OutputSink, SentMessage, SharedSink, all_notes_off};
