// Track - Ordered moments for one channel, with a performing window and cursor

use super::moment::{Moment, MomentStart};
use crate::error::{PerformerError, PerformerResult};
use serde::{Deserialize, Serialize};

/// Moments in non-decreasing position order.
///
/// The moment list is built once and reused across spans: `set_window`
/// only moves the window bounds and the cursor. The window is
/// `from_index..to_index` (exclusive end) and `from_index <= current_index <= to_index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Moment>", into = "Vec<Moment>")]
pub struct Track {
    moments: Vec<Moment>,
    is_performing: bool,
    from_index: usize,
    to_index: usize,
    current_index: usize,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a track from moments already in order. Moments sharing a
    /// position are merged.
    pub fn from_moments(moments: Vec<Moment>) -> PerformerResult<Self> {
        let mut track = Self::new();
        for moment in moments {
            track.push_merged(moment)?;
        }
        Ok(track)
    }

    pub fn moments(&self) -> &[Moment] {
        &self.moments
    }

    pub(crate) fn moments_mut(&mut self) -> &mut [Moment] {
        &mut self.moments
    }

    pub fn len(&self) -> usize {
        self.moments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moments.is_empty()
    }

    /// Position of the last moment
    pub fn end_position(&self) -> Option<i64> {
        self.moments.last().map(Moment::position)
    }

    fn push_merged(&mut self, moment: Moment) -> PerformerResult<()> {
        match self.moments.last_mut() {
            Some(last) if last.position() == moment.position() => last.merge(&moment),
            Some(last) if last.position() > moment.position() => {
                Err(PerformerError::Precomposition(format!(
                    "moment at {} added after moment at {}",
                    moment.position(),
                    last.position()
                )))
            }
            _ => {
                self.moments.push(moment);
                Ok(())
            }
        }
    }

    /// Append a copy of `moment` moved by `offset`. A copy landing on the
    /// last moment's position is merged into it.
    pub fn add_moment(&mut self, moment: &Moment, offset: i64) -> PerformerResult<()> {
        self.push_merged(moment.clone_at_offset(offset))
    }

    /// Append a chord: its moments in order, the first one flagged as a chord start
    pub fn add_chord(&mut self, position: i64, moments: &[Moment]) -> PerformerResult<()> {
        let mut first = match moments.first() {
            Some(m) => m.clone_at_offset(position),
            None => Moment::new(position),
        };
        first.mark_start(MomentStart::Chord)?;
        self.push_merged(first)?;
        for moment in moments.iter().skip(1) {
            self.add_moment(moment, position)?;
        }
        Ok(())
    }

    /// Append an empty moment flagged as a rest start
    pub fn add_rest(&mut self, position: i64) -> PerformerResult<()> {
        let mut rest = Moment::new(position);
        rest.mark_start(MomentStart::Rest)?;
        self.push_merged(rest)
    }

    /// Append a moment as it was sent, keeping its timestamp. Used by recordings.
    pub fn add_recorded_moment(&mut self, moment: &Moment) {
        self.moments.push(moment.clone());
    }

    /// Select the moments that play in `[from_ms, to_ms)`.
    ///
    /// A moment exactly at `to_ms` is included only when it is the track's
    /// final moment (the final barline).
    pub fn set_window(&mut self, is_on: bool, from_ms: i64, to_ms: i64) {
        if !is_on || self.moments.is_empty() {
            self.is_performing = false;
            self.from_index = 0;
            self.to_index = 0;
            self.current_index = 0;
            return;
        }

        let last = self.moments.len() - 1;
        let from_index = self
            .moments
            .iter()
            .position(|m| m.position() >= from_ms)
            .unwrap_or(self.moments.len());

        let mut to_index = from_index;
        while to_index < self.moments.len() {
            let position = self.moments[to_index].position();
            if position < to_ms || (to_index == last && position == to_ms) {
                to_index += 1;
            } else {
                break;
            }
        }

        self.is_performing = true;
        self.from_index = from_index;
        self.to_index = to_index;
        self.current_index = from_index;
    }

    pub fn is_performing(&self) -> bool {
        self.is_performing
    }

    /// Window bounds as `(from_index, to_index)`, exclusive end
    pub fn window(&self) -> (usize, usize) {
        (self.from_index, self.to_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The moment under the cursor, if the track is performing and the
    /// cursor is still inside the window
    pub fn peek(&self) -> Option<&Moment> {
        if self.is_performing && self.current_index < self.to_index {
            self.moments.get(self.current_index)
        } else {
            None
        }
    }

    /// Move the cursor past the current moment and return its index
    pub(crate) fn advance(&mut self) -> usize {
        let index = self.current_index;
        self.current_index += 1;
        index
    }
}

impl TryFrom<Vec<Moment>> for Track {
    type Error = PerformerError;

    fn try_from(moments: Vec<Moment>) -> Result<Self, Self::Error> {
        Track::from_moments(moments)
    }
}

impl From<Track> for Vec<Moment> {
    fn from(track: Track) -> Self {
        track.moments
    }
}
