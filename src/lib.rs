// Assisted Performer - Library exports for the binary, tests and benchmarks

pub mod assistant;
pub mod config;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod midi;
pub mod sequencer;
pub mod serialization;

// Re-export commonly used types for convenience
pub use assistant::{Assistant, AssistantOptions, EndOfPerformanceCallback, PerformanceOptions};
pub use config::PerformerConfig;
pub use engine::{EventLoop, Performance};
pub use error::{PerformerError, PerformerResult};
pub use messaging::channels::create_input_channel;
pub use midi::{CaptureSink, InputMessage, Message, OutputSink, SharedSink};
pub use sequencer::{
    Clock, ManualClock, Moment, MomentStart, MonotonicClock, PlaybackState, Sequence,
    SpanOptions, Subsequence, TickOutcome, Track,
};
