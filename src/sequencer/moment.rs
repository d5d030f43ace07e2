// Moment - Messages sharing one logical position

use crate::error::{PerformerError, PerformerResult};
use crate::midi::event::Message;
use serde::{Deserialize, Serialize};

/// Marks the first moment of a chord or rest in the live performer's track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomentStart {
    Chord,
    Rest,
}

/// An ordered bundle of messages sent together.
///
/// `position` is fixed at creation. `timestamp` is the absolute send time,
/// stamped by the scheduler. `adjusted` is a rescaled position used instead
/// of `position` when a subsequence plays at a different speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    position: i64,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<MomentStart>,
    #[serde(skip)]
    timestamp: Option<f64>,
    #[serde(skip)]
    adjusted: Option<i64>,
}

impl Moment {
    pub fn new(position: i64) -> Self {
        Self {
            position,
            messages: Vec::new(),
            start: None,
            timestamp: None,
            adjusted: None,
        }
    }

    pub fn with_messages(position: i64, messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::new(position)
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn messages_mut(&mut self) -> &mut Vec<Message> {
        &mut self.messages
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Empty moments are visited by the scheduler but send nothing
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn start(&self) -> Option<MomentStart> {
        self.start
    }

    pub fn is_chord_start(&self) -> bool {
        self.start == Some(MomentStart::Chord)
    }

    pub fn is_rest_start(&self) -> bool {
        self.start == Some(MomentStart::Rest)
    }

    /// Set the start flag. It can only be set once.
    pub fn mark_start(&mut self, start: MomentStart) -> PerformerResult<()> {
        match self.start {
            Some(existing) => Err(PerformerError::Precomposition(format!(
                "moment at {} is already a {:?} start",
                self.position, existing
            ))),
            None => {
                self.start = Some(start);
                Ok(())
            }
        }
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = Some(timestamp);
    }

    pub fn adjusted_position(&self) -> Option<i64> {
        self.adjusted
    }

    pub(crate) fn set_adjusted_position(&mut self, adjusted: Option<i64>) {
        self.adjusted = adjusted;
    }

    /// Position used for timing: the rescaled one if any
    pub fn schedule_position(&self) -> i64 {
        self.adjusted.unwrap_or(self.position)
    }

    /// Append `other`'s messages. Fails if the positions differ.
    pub fn merge(&mut self, other: &Moment) -> PerformerResult<()> {
        if other.position != self.position {
            return Err(PerformerError::Precomposition(format!(
                "cannot merge moment at {} into moment at {}",
                other.position, self.position
            )));
        }
        self.messages.extend(other.messages.iter().cloned());
        if self.start.is_none() {
            self.start = other.start;
        }
        Ok(())
    }

    /// Deep copy moved by `offset`. Scheduling state is not copied.
    pub fn clone_at_offset(&self, offset: i64) -> Moment {
        Moment {
            position: self.position + offset,
            messages: self.messages.clone(),
            start: self.start,
            timestamp: None,
            adjusted: None,
        }
    }
}
