// Sequencer - Timed moments, tracks and the tick-driven scheduler

pub mod clock;
pub mod moment;
pub mod rescale;
pub mod sequence;
pub mod subsequence;
pub mod timer;
pub mod track;
pub mod transport;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use moment::{Moment, MomentStart};
pub use rescale::{rescale_durations, rescale_positions};
pub use sequence::{EndOfSpanCallback, PositionCallback, Sequence, SharedSequence, SpanOptions};
pub use subsequence::{Subsequence, SubsequenceKind, partition};
pub use timer::TimerQueue;
pub use track::Track;
pub use transport::{PlaybackState, TickOutcome};
