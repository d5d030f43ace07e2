// Subsequences - The score cut at the live performer's chord and rest starts

use super::moment::{Moment, MomentStart};
use super::rescale::rescale_positions;
use super::sequence::Sequence;
use super::track::Track;
use crate::assistant::options::{NoteOverrides, VelocityOption};
use crate::error::{PerformerError, PerformerResult};
use crate::midi::event::{Message, command};

/// Whether a subsequence is started by a key press or follows on by itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsequenceKind {
    Chord,
    Rest,
}

impl From<MomentStart> for SubsequenceKind {
    fn from(start: MomentStart) -> Self {
        match start {
            MomentStart::Chord => SubsequenceKind::Chord,
            MomentStart::Rest => SubsequenceKind::Rest,
        }
    }
}

/// A sequence re-based so that its boundary is position zero.
///
/// Owns copies of its moments. Overrides and rescaling modify those copies;
/// `restore` brings back the messages and timing they were cut with.
#[derive(Debug)]
pub struct Subsequence {
    sequence: Sequence,
    kind: SubsequenceKind,
    score_duration: i64,
    pristine: Option<Vec<Vec<Vec<Message>>>>,
}

impl Subsequence {
    pub fn kind(&self) -> SubsequenceKind {
        self.kind
    }

    pub fn is_chord(&self) -> bool {
        self.kind == SubsequenceKind::Chord
    }

    pub fn is_rest(&self) -> bool {
        self.kind == SubsequenceKind::Rest
    }

    pub fn position_in_score(&self) -> i64 {
        self.sequence.position_in_score()
    }

    /// Notated length: up to the next boundary, or to the last moment for
    /// the final subsequence
    pub fn score_duration(&self) -> i64 {
        self.score_duration
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn sequence_mut(&mut self) -> &mut Sequence {
        &mut self.sequence
    }

    /// Play at `speed` times the notated tempo. Durations between
    /// consecutive moments are rescaled so the whole subsequence lasts
    /// exactly `round(score_duration / speed)`.
    pub fn rescale(&mut self, speed: f64) -> PerformerResult<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PerformerError::Precondition(format!(
                "speed must be a positive number, got {}",
                speed
            )));
        }

        let mut positions: Vec<i64> = self
            .sequence
            .tracks()
            .iter()
            .flat_map(|t| t.moments().iter().map(Moment::position))
            .collect();
        positions.push(0);
        positions.push(self.score_duration);
        positions.sort_unstable();
        positions.dedup();

        let rescaled = rescale_positions(&positions, speed);
        for track in self.sequence.tracks_mut() {
            for moment in track.moments_mut() {
                // Every moment position is in `positions`
                if let Ok(i) = positions.binary_search(&moment.position()) {
                    moment.set_adjusted_position(Some(rescaled[i]));
                }
            }
        }
        log::debug!(
            "Subsequence at {} rescaled by {:.3}",
            self.position_in_score(),
            speed
        );
        Ok(())
    }

    pub fn revert_timing(&mut self) {
        for track in self.sequence.tracks_mut() {
            for moment in track.moments_mut() {
                moment.set_adjusted_position(None);
            }
        }
    }

    /// Give note messages the performer's pitch and/or velocity.
    /// `velocity_option` shapes overridden velocities; without it the
    /// performed velocity is used as is.
    ///
    /// Pitch overrides apply to note-ons and note-offs alike so that every
    /// started note is released. Velocity overrides apply to note-ons.
    pub fn apply_note_overrides(
        &mut self,
        live_track: usize,
        pitch: u8,
        velocity: u8,
        overrides: &NoteOverrides,
        velocity_option: Option<&VelocityOption>,
    ) {
        if !overrides.any() {
            return;
        }
        self.save_pristine();

        for (index, track) in self.sequence.tracks_mut().iter_mut().enumerate() {
            let is_solo = index == live_track;
            let override_pitch = overrides.pitch(is_solo);
            let override_velocity = overrides.velocity(is_solo);

            for moment in track.moments_mut() {
                for message in moment.messages_mut() {
                    let is_note = matches!(message.command(), command::NOTE_ON | command::NOTE_OFF);
                    if override_pitch && is_note {
                        message.set_data1(pitch);
                    }
                    if override_velocity && message.is_note_on() {
                        let new_velocity = match velocity_option {
                            Some(option) => option.apply(message.data2(), velocity),
                            None => velocity.max(1),
                        };
                        message.set_data2(new_velocity);
                    }
                }
            }
        }
    }

    fn save_pristine(&mut self) {
        if self.pristine.is_some() {
            return;
        }
        let snapshot = self
            .sequence
            .tracks()
            .iter()
            .map(|t| t.moments().iter().map(|m| m.messages().to_vec()).collect())
            .collect();
        self.pristine = Some(snapshot);
    }

    /// Undo rescaling and note overrides
    pub fn restore(&mut self) {
        self.revert_timing();
        let Some(pristine) = self.pristine.take() else {
            return;
        };
        for (track, saved_track) in self.sequence.tracks_mut().iter_mut().zip(pristine) {
            for (moment, saved) in track.moments_mut().iter_mut().zip(saved_track) {
                *moment.messages_mut() = saved;
            }
        }
    }
}

/// Cut `sequence` at every chord or rest start in the live performer's track.
///
/// Every track is split at the same boundaries: a moment belongs to the
/// subsequence whose `[boundary, next boundary)` range contains it, and the
/// last subsequence is unbounded. Moments are copied and re-based on their
/// subsequence's boundary.
pub fn partition(sequence: &Sequence, live_performer: usize) -> PerformerResult<Vec<Subsequence>> {
    let performer = sequence.track(live_performer).ok_or_else(|| {
        PerformerError::Lookup(format!(
            "live performer track {} does not exist ({} tracks)",
            live_performer,
            sequence.tracks().len()
        ))
    })?;

    let boundaries: Vec<(i64, SubsequenceKind)> = performer
        .moments()
        .iter()
        .filter_map(|m| m.start().map(|start| (m.position(), start.into())))
        .collect();

    let Some(&(first_boundary, _)) = boundaries.first() else {
        return Err(PerformerError::Lookup(format!(
            "live performer track {} has no chord or rest starts",
            live_performer
        )));
    };

    let mut tracks_per_subsequence: Vec<Vec<Track>> = boundaries.iter().map(|_| Vec::new()).collect();

    for (track_index, track) in sequence.tracks().iter().enumerate() {
        if let Some(early) = track.moments().first().filter(|m| m.position() < first_boundary) {
            return Err(PerformerError::Lookup(format!(
                "track {} has a moment at {} before the first boundary at {}",
                track_index,
                early.position(),
                first_boundary
            )));
        }

        let mut moments = track.moments().iter().peekable();
        for (k, &(lower, _)) in boundaries.iter().enumerate() {
            let upper = boundaries.get(k + 1).map(|&(position, _)| position);
            let mut piece = Track::new();
            while let Some(moment) = moments.next_if(|m| upper.is_none_or(|u| m.position() < u)) {
                piece.add_moment(moment, -lower)?;
            }
            tracks_per_subsequence[k].push(piece);
        }
    }

    let lookahead = sequence.lookahead();
    let subsequences = boundaries
        .iter()
        .zip(tracks_per_subsequence)
        .enumerate()
        .map(|(k, (&(boundary, kind), tracks))| {
            let mut sub_sequence = Sequence::from_tracks(tracks, sequence.clock().clone())
                .with_lookahead(lookahead);
            sub_sequence.set_position_in_score(boundary);
            let score_duration = match boundaries.get(k + 1) {
                Some(&(next, _)) => next - boundary,
                None => sub_sequence.end_position(),
            };
            Subsequence {
                sequence: sub_sequence,
                kind,
                score_duration,
                pristine: None,
            }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "Partitioned {} tracks into {} subsequences",
        sequence.tracks().len(),
        subsequences.len()
    );
    Ok(subsequences)
}
