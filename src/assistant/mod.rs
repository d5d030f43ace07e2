// Assistant - Live-input dispatcher for assisted performances
//
// The score is cut into subsequences at the live performer's chord and
// rest starts. Each key press starts the next chord subsequence; rests
// follow on by themselves when the key is released.

pub mod options;

pub use options::{
    ApplyTo, AssistantOptions, ControlTarget, ControllerSubstitution, NoteOffBehavior,
    NoteOverrides, PerformanceOptions, VelocityMode, VelocityOption,
};

use crate::error::{PerformerError, PerformerResult};
use crate::midi::event::{InputKind, InputMessage, Message, control};
use crate::midi::output::SharedSink;
use crate::sequencer::clock::SharedClock;
use crate::sequencer::sequence::{PositionCallback, Sequence, SpanOptions};
use crate::sequencer::subsequence::{Subsequence, partition};
use crate::sequencer::transport::{PlaybackState, TickOutcome};
use std::fmt;
use std::rc::Rc;

/// Called once when an assisted performance ends
pub type EndOfPerformanceCallback = Rc<dyn Fn()>;

/// A subsequence started by an input message, whose first tick outcome
/// the event loop has to arm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Started {
    pub index: usize,
    pub outcome: TickOutcome,
}

pub struct Assistant {
    subsequences: Vec<Subsequence>,
    n_tracks: usize,
    options: AssistantOptions,
    clock: SharedClock,

    state: PlaybackState,
    start_index: usize,
    end_index: usize,
    current_index: Option<usize>,
    next_index: usize,
    held_key: Option<u8>,
    previous_start: Option<f64>,
    paused_at: Option<f64>,

    sink: Option<SharedSink>,
    tracks_on: Vec<bool>,
    on_end: EndOfPerformanceCallback,
    on_position: PositionCallback,
}

impl Assistant {
    /// Partition `sequence` for the live performer named in `options`
    pub fn new(
        sequence: &Sequence,
        options: AssistantOptions,
        on_end: EndOfPerformanceCallback,
        on_position: PositionCallback,
    ) -> PerformerResult<Self> {
        if let Some(speed) = options.performance.speed_factor {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(PerformerError::Precondition(format!(
                    "speed factor must be positive, got {}",
                    speed
                )));
            }
        }
        let subsequences = partition(sequence, options.live_performer_track)?;

        Ok(Self {
            n_tracks: sequence.tracks().len(),
            end_index: subsequences.len(),
            subsequences,
            options,
            clock: sequence.clock().clone(),
            state: PlaybackState::Stopped,
            start_index: 0,
            current_index: None,
            next_index: 0,
            held_key: None,
            previous_start: None,
            paused_at: None,
            sink: None,
            tracks_on: Vec::new(),
            on_end,
            on_position,
        })
    }

    pub fn subsequences(&self) -> &[Subsequence] {
        &self.subsequences
    }

    pub fn subsequence(&self, index: usize) -> Option<&Subsequence> {
        self.subsequences.get(index)
    }

    pub fn options(&self) -> &AssistantOptions {
        &self.options
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    /// Span bounds as subsequence indices `(start, end)`, exclusive end
    pub fn span(&self) -> (usize, usize) {
        (self.start_index, self.end_index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn held_key(&self) -> Option<u8> {
        self.held_key
    }

    fn is_track_on(&self, index: usize) -> bool {
        self.tracks_on.get(index).copied().unwrap_or(true)
    }

    /// Get ready to follow the performer through `[from_ms, to_ms)`.
    /// Nothing sounds until the first key press.
    pub fn play_span(
        &mut self,
        sink: SharedSink,
        from_ms: i64,
        to_ms: i64,
        tracks_on: Vec<bool>,
    ) -> PerformerResult<()> {
        self.stop();

        let first_at_or_after = |bound: i64| {
            self.subsequences
                .iter()
                .position(|s| s.position_in_score() >= bound)
                .unwrap_or(self.subsequences.len())
        };
        let start_index = first_at_or_after(from_ms);
        let end_index = first_at_or_after(to_ms);
        if start_index >= end_index {
            return Err(PerformerError::Precondition(format!(
                "span {}..{} contains no subsequence",
                from_ms, to_ms
            )));
        }

        self.sink = Some(sink);
        self.tracks_on = tracks_on;
        self.start_index = start_index;
        self.end_index = end_index;
        self.next_index = start_index;
        self.current_index = None;
        self.held_key = None;
        self.previous_start = None;
        self.paused_at = None;
        self.state = PlaybackState::Running;

        log::info!(
            "Assisted performance ready: subsequences {}..{}",
            start_index,
            end_index
        );
        Ok(())
    }

    /// Handle one live input message. Returns the subsequence it started, if any.
    pub fn handle_input(&mut self, input: &InputMessage) -> PerformerResult<Option<Started>> {
        if !self.is_running() {
            log::trace!("Input ignored while {:?}", self.state);
            return Ok(None);
        }

        match input.kind() {
            InputKind::NoteOn => self.handle_note_on(input.data1, input.data2),
            InputKind::NoteOff => self.handle_note_off(input.data1),
            InputKind::ChannelPressure => {
                self.substitute_controller(self.options.pressure, input.controller_value());
                Ok(None)
            }
            InputKind::Aftertouch => {
                self.substitute_controller(self.options.pressure, input.controller_value());
                Ok(None)
            }
            InputKind::ModulationWheel => {
                self.substitute_controller(self.options.modulation, input.controller_value());
                Ok(None)
            }
            InputKind::PitchWheel => {
                self.substitute_controller(self.options.pitch_wheel, input.controller_value());
                Ok(None)
            }
            InputKind::Unknown => {
                if self.next_index >= self.end_index || self.next_index >= self.subsequences.len() {
                    log::info!("Unrecognised input after the last subsequence, stopping");
                    self.stop();
                } else {
                    log::warn!(
                        "Unrecognised input ignored: command {:#04x}",
                        input.command
                    );
                }
                Ok(None)
            }
        }
    }

    fn next_is_eligible(&self) -> bool {
        self.next_index < self.end_index
            && (self.next_index == self.start_index || self.subsequences[self.next_index].is_chord())
    }

    fn handle_note_on(&mut self, key: u8, velocity: u8) -> PerformerResult<Option<Started>> {
        if !self.next_is_eligible() {
            log::debug!("Key {} pressed but no chord is waiting", key);
            return Ok(None);
        }

        self.finish_current_silently();
        self.held_key = Some(key);
        let index = self.next_index;
        self.current_index = Some(index);
        self.next_index += 1;

        let started = self.start_subsequence(index, key, velocity)?;
        Ok(Some(started))
    }

    fn handle_note_off(&mut self, key: u8) -> PerformerResult<Option<Started>> {
        if self.held_key != Some(key) {
            return Ok(None);
        }

        if self.options.performance.note_off_behavior() == NoteOffBehavior::Silence {
            self.finish_current_silently();
        }

        self.held_key = None;
        let started = if self.next_index < self.end_index && self.subsequences[self.next_index].is_rest() {
            let index = self.next_index;
            self.current_index = Some(index);
            self.next_index += 1;
            self.start_subsequence(index, key, 0).map(Some)
        } else {
            Ok(None)
        };

        if self.next_index >= self.end_index {
            self.complete();
        }
        started
    }

    fn start_subsequence(&mut self, index: usize, key: u8, velocity: u8) -> PerformerResult<Started> {
        let now = self.clock.now();
        let live = self.options.live_performer_track;

        let mut speed = self.options.performance.speed_factor.unwrap_or(1.0);
        if self.options.relative_durations {
            if let Some(previous_start) = self.previous_start.filter(|_| index > self.start_index) {
                let previous = &self.subsequences[index - 1];
                let notated = self.subsequences[index].position_in_score() - previous.position_in_score();
                let elapsed = now - previous_start;
                if notated > 0 && elapsed > 0.0 {
                    speed *= notated as f64 / elapsed;
                }
            }
            self.previous_start = Some(now);
        }

        let overrides = self.options.overrides;
        let velocity_option = self.options.performance.velocity;
        let subsequence = &mut self.subsequences[index];
        subsequence.restore();
        if velocity > 0 {
            subsequence.apply_note_overrides(live, key, velocity, &overrides, velocity_option.as_ref());
        }
        if (speed - 1.0).abs() > f64::EPSILON {
            subsequence.rescale(speed)?;
        }

        let sink = self.sink.clone().ok_or_else(|| {
            PerformerError::Precondition("an output sink is required to start a subsequence".into())
        })?;

        if let Some(pedal) = self.options.performance.pedal {
            let value = if pedal { 127 } else { 0 };
            let mut out = sink.borrow_mut();
            for channel in (0..self.n_tracks).filter(|&t| self.is_track_on(t)) {
                let message = Message::control_change(channel as u8, control::SUSTAIN_PEDAL, value);
                out.send(message.bytes(), now);
            }
        }

        log::debug!(
            "Starting {:?} subsequence {} at score position {} (speed {:.3})",
            self.subsequences[index].kind(),
            index,
            self.subsequences[index].position_in_score(),
            speed
        );

        if !self.is_audible(index) {
            log::debug!("Subsequence {} has nothing to play on the enabled tracks", index);
            return Ok(Started {
                index,
                outcome: TickOutcome::Idle,
            });
        }

        let span = SpanOptions::new()
            .sink(sink)
            .tracks_on(self.tracks_on.clone())
            .on_position(self.on_position.clone());
        let outcome = self.subsequences[index].sequence_mut().play_span(span)?;
        Ok(Started { index, outcome })
    }

    /// True when an enabled track of the subsequence has a moment
    fn is_audible(&self, index: usize) -> bool {
        self.subsequences[index]
            .sequence()
            .tracks()
            .iter()
            .enumerate()
            .any(|(t, track)| self.is_track_on(t) && !track.is_empty())
    }

    fn finish_current_silently(&mut self) {
        if let Some(index) = self.current_index {
            let sequence = self.subsequences[index].sequence_mut();
            if !sequence.is_stopped() {
                sequence.finish_silently();
            }
        }
    }

    fn substitute_controller(&self, substitution: Option<ControllerSubstitution>, value: u8) {
        let Some(substitution) = substitution else {
            return;
        };
        let Some(sink) = &self.sink else {
            return;
        };

        let live = self.options.live_performer_track;
        let now = self.clock.now();
        let mut out = sink.borrow_mut();
        for channel in (0..self.n_tracks).filter(|&t| self.is_track_on(t)) {
            let applies = match substitution.apply_to {
                ApplyTo::Solo => channel == live,
                ApplyTo::Others => channel != live,
                ApplyTo::Both => true,
            };
            if applies {
                let message = substitution.target.message(channel as u8, value);
                out.send(message.bytes(), now);
            }
        }
    }

    /// Advance a subsequence's scheduler; called by the event loop
    pub fn tick(&mut self, index: usize, generation: u64) -> TickOutcome {
        match self.subsequences.get_mut(index) {
            Some(subsequence) => subsequence.sequence_mut().tick(generation),
            None => TickOutcome::Idle,
        }
    }

    /// Generation of a subsequence's scheduler, for arming its ticks
    pub fn generation(&self, index: usize) -> Option<u64> {
        self.subsequences.get(index).map(|s| s.sequence().generation())
    }

    pub fn pause(&mut self) -> PerformerResult<()> {
        if !self.is_running() {
            return Err(PerformerError::InvalidState(format!(
                "attempt to pause a {:?} performance",
                self.state
            )));
        }
        if let Some(index) = self.current_index {
            let sequence = self.subsequences[index].sequence_mut();
            if sequence.is_running() {
                sequence.pause()?;
            }
        }
        self.paused_at = Some(self.clock.now());
        self.state = PlaybackState::Paused;
        log::debug!("Assisted performance paused");
        Ok(())
    }

    /// Resume, shifting the tempo reference by the time spent paused.
    /// Returns the sounding subsequence if it has to be re-armed.
    pub fn resume(&mut self) -> PerformerResult<Option<Started>> {
        if !self.is_paused() {
            return Err(PerformerError::InvalidState(format!(
                "attempt to resume a {:?} performance",
                self.state
            )));
        }

        let now = self.clock.now();
        if let Some(paused_at) = self.paused_at.take() {
            if let Some(previous_start) = self.previous_start.as_mut() {
                *previous_start += now - paused_at;
            }
        }
        self.state = PlaybackState::Running;
        log::debug!("Assisted performance resumed");

        if let Some(index) = self.current_index {
            let sequence = self.subsequences[index].sequence_mut();
            if sequence.is_paused() {
                let outcome = sequence.resume()?;
                return Ok(Some(Started { index, outcome }));
            }
        }
        Ok(None)
    }

    /// Stop the performance: silence the sounding subsequence, undo every
    /// rescaling and override, and report the end. Once the performance has
    /// ended this only silences a last subsequence still running out; the
    /// end is never reported twice.
    pub fn stop(&mut self) {
        if self.is_stopped() {
            if let Some(index) = self.current_index {
                let subsequence = &mut self.subsequences[index];
                if !subsequence.sequence().is_stopped() {
                    subsequence.sequence_mut().finish_silently();
                    subsequence.restore();
                    log::debug!("Silenced subsequence {} after the performance ended", index);
                }
            }
            return;
        }
        self.finish_current_silently();
        for subsequence in &mut self.subsequences {
            subsequence.restore();
        }
        self.finish();
    }

    /// The performer has played through the span. The last subsequence is
    /// left to run out; the others are restored now and it is restored
    /// before its next use.
    fn complete(&mut self) {
        for (index, subsequence) in self.subsequences.iter_mut().enumerate() {
            if Some(index) == self.current_index && !subsequence.sequence().is_stopped() {
                continue;
            }
            subsequence.restore();
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.state = PlaybackState::Stopped;
        self.held_key = None;
        self.paused_at = None;
        self.previous_start = None;
        log::info!("Assisted performance ended");
        (self.on_end)();
    }
}

impl fmt::Debug for Assistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assistant")
            .field("subsequences", &self.subsequences.len())
            .field("state", &self.state)
            .field("span", &(self.start_index, self.end_index))
            .field("current_index", &self.current_index)
            .field("next_index", &self.next_index)
            .field("held_key", &self.held_key)
            .finish()
    }
}
