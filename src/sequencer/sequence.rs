// Sequence - Parallel tracks and the tick-driven scheduler that plays them

use super::clock::SharedClock;
use super::moment::Moment;
use super::track::Track;
use super::transport::{PlaybackState, TickOutcome};
use crate::error::{PerformerError, PerformerResult};
use crate::midi::event::command;
use crate::midi::output::SharedSink;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A recording is owned by the caller and appended to by the playing sequence
pub type SharedSequence = Rc<RefCell<Sequence>>;

/// Receives the score position of each chord or rest start once it has been sent
pub type PositionCallback = Rc<dyn Fn(i64)>;

/// Receives the recording (if any) and the performance duration in ms
pub type EndOfSpanCallback = Rc<dyn Fn(Option<SharedSequence>, u64)>;

/// Arguments to [`Sequence::play_span`]
#[derive(Clone)]
pub struct SpanOptions {
    pub sink: Option<SharedSink>,
    pub from_ms: i64,
    pub to_ms: i64,
    /// Per-track on/off snapshot. Tracks beyond its end are on.
    pub tracks_on: Vec<bool>,
    pub recording: Option<SharedSequence>,
    pub on_end: Option<EndOfSpanCallback>,
    pub on_position: Option<PositionCallback>,
}

impl SpanOptions {
    /// Whole sequence, every track on, no sink or callbacks yet
    pub fn new() -> Self {
        Self {
            sink: None,
            from_ms: 0,
            to_ms: i64::MAX,
            tracks_on: Vec::new(),
            recording: None,
            on_end: None,
            on_position: None,
        }
    }

    pub fn span(mut self, from_ms: i64, to_ms: i64) -> Self {
        self.from_ms = from_ms;
        self.to_ms = to_ms;
        self
    }

    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn tracks_on(mut self, tracks_on: Vec<bool>) -> Self {
        self.tracks_on = tracks_on;
        self
    }

    pub fn recording(mut self, recording: SharedSequence) -> Self {
        self.recording = Some(recording);
        self
    }

    pub fn on_end(mut self, on_end: EndOfSpanCallback) -> Self {
        self.on_end = Some(on_end);
        self
    }

    pub fn on_position(mut self, on_position: PositionCallback) -> Self {
        self.on_position = Some(on_position);
        self
    }

    pub fn is_track_on(&self, index: usize) -> bool {
        self.tracks_on.get(index).copied().unwrap_or(true)
    }
}

impl Default for SpanOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// (track index, moment index) of the moment in flight
type Cursor = (usize, usize);

/// Parallel tracks (index = output channel) plus the scheduler state.
///
/// Playing is driven from outside: `play_span`, `resume` and `tick` return a
/// [`TickOutcome`] telling the event loop when to call `tick` again. Every
/// start, pause and stop bumps the generation, so a tick armed before the
/// change sends nothing.
pub struct Sequence {
    tracks: Vec<Track>,
    position_in_score: i64,
    clock: SharedClock,
    lookahead_ms: f64,

    state: PlaybackState,
    generation: u64,
    current: Option<Cursor>,
    origin: f64,
    started_at: f64,
    paused_at: Option<f64>,
    paused_total: f64,

    last_reported: Option<i64>,
    position_to_report: Option<i64>,
    max_deviation: f64,

    sink: Option<SharedSink>,
    recording: Option<SharedSequence>,
    on_end: Option<EndOfSpanCallback>,
    on_position: Option<PositionCallback>,
}

impl Sequence {
    pub fn new(clock: SharedClock) -> Self {
        Self::from_tracks(Vec::new(), clock)
    }

    pub fn from_tracks(tracks: Vec<Track>, clock: SharedClock) -> Self {
        Self {
            tracks,
            position_in_score: 0,
            clock,
            lookahead_ms: 0.0,
            state: PlaybackState::Stopped,
            generation: 0,
            current: None,
            origin: 0.0,
            started_at: 0.0,
            paused_at: None,
            paused_total: 0.0,
            last_reported: None,
            position_to_report: None,
            max_deviation: 0.0,
            sink: None,
            recording: None,
            on_end: None,
            on_position: None,
        }
    }

    /// An empty sequence with `n_tracks` tracks, ready to be recorded into
    pub fn recording(n_tracks: usize, clock: SharedClock) -> SharedSequence {
        let tracks = (0..n_tracks).map(|_| Track::new()).collect();
        Rc::new(RefCell::new(Self::from_tracks(tracks, clock)))
    }

    pub fn with_lookahead(mut self, lookahead_ms: f64) -> Self {
        self.lookahead_ms = lookahead_ms.max(0.0);
        self
    }

    pub fn set_lookahead(&mut self, lookahead_ms: f64) {
        self.lookahead_ms = lookahead_ms.max(0.0);
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead_ms
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Absolute score position of this sequence's zero (non-zero for subsequences)
    pub fn position_in_score(&self) -> i64 {
        self.position_in_score
    }

    pub(crate) fn set_position_in_score(&mut self, position: i64) {
        self.position_in_score = position;
    }

    /// Position of the last moment in any track
    pub fn end_position(&self) -> i64 {
        self.tracks
            .iter()
            .filter_map(Track::end_position)
            .max()
            .unwrap_or(0)
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

    /// Token an armed tick must present to be honoured
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The moment held while paused
    pub fn paused_moment(&self) -> Option<&Moment> {
        if self.is_paused() {
            self.current.map(|cursor| self.moment(cursor))
        } else {
            None
        }
    }

    /// Largest lateness seen so far in this span, in ms
    pub fn max_deviation(&self) -> f64 {
        self.max_deviation
    }

    fn moment(&self, (track, index): Cursor) -> &Moment {
        &self.tracks[track].moments()[index]
    }

    /// Start playing `[from_ms, to_ms)`. Any span already playing is
    /// stopped first. Returns when the first tick should be re-armed.
    pub fn play_span(&mut self, options: SpanOptions) -> PerformerResult<TickOutcome> {
        self.stop();

        let sink = options.sink.clone().ok_or_else(|| {
            PerformerError::Precondition("an output sink is required to play a span".into())
        })?;
        let on_position = options.on_position.clone().ok_or_else(|| {
            PerformerError::Precondition("a position callback is required to play a span".into())
        })?;

        for (index, track) in self.tracks.iter_mut().enumerate() {
            track.set_window(options.is_track_on(index), options.from_ms, options.to_ms);
        }
        if !self.tracks.iter().any(Track::is_performing) {
            return Err(PerformerError::Precondition(
                "no track is performing in this span".into(),
            ));
        }

        self.sink = Some(sink);
        self.on_position = Some(on_position);
        self.on_end = options.on_end;
        self.recording = options.recording;
        self.last_reported = None;
        self.position_to_report = None;
        self.max_deviation = 0.0;
        self.paused_total = 0.0;

        let now = self.clock.now();
        self.started_at = now;
        let first_position = self
            .tracks
            .iter()
            .filter_map(Track::peek)
            .map(Moment::schedule_position)
            .min()
            .unwrap_or(0);

        log::debug!(
            "Playing span {}..{} from score position {}",
            options.from_ms,
            options.to_ms,
            self.position_in_score
        );
        Ok(self.run_from(first_position, now))
    }

    fn run_from(&mut self, first_position: i64, now: f64) -> TickOutcome {
        self.state = PlaybackState::Running;
        self.generation += 1;
        self.origin = now - first_position as f64;
        self.current = self.next_moment();
        if self.current.is_none() {
            return TickOutcome::Idle;
        }
        self.tick(self.generation)
    }

    /// Earliest moment across performing tracks; equal positions go to the
    /// lower track index. Advances that track's cursor.
    fn pick_next(&mut self) -> Option<Cursor> {
        let mut best: Option<(usize, i64)> = None;
        for (index, track) in self.tracks.iter().enumerate() {
            if let Some(moment) = track.peek() {
                let position = moment.position();
                if best.is_none_or(|(_, best_position)| position < best_position) {
                    best = Some((index, position));
                }
            }
        }

        let (track_index, _) = best?;
        let moment_index = self.tracks[track_index].advance();
        Some((track_index, moment_index))
    }

    /// Pick and stamp the next moment, or stop when the span is exhausted
    fn next_moment(&mut self) -> Option<Cursor> {
        if !self.is_running() {
            return None;
        }

        let Some(cursor) = self.pick_next() else {
            self.stop();
            return None;
        };

        let origin = self.origin;
        let position_in_score = self.position_in_score;
        let reporting = self.on_position.is_some();
        let last_reported = self.last_reported;
        let (track, index) = cursor;
        let moment = &mut self.tracks[track].moments_mut()[index];

        if reporting && moment.start().is_some() {
            let score_position = position_in_score + moment.position();
            if last_reported.is_none_or(|last| score_position > last) {
                self.position_to_report = Some(score_position);
            }
        }
        moment.set_timestamp(origin + moment.schedule_position() as f64);

        Some(cursor)
    }

    /// Send everything due within the lookahead, then say when to come back.
    /// A tick from an older generation, or on a sequence that is not
    /// running, does nothing.
    pub fn tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation || !self.is_running() {
            return TickOutcome::Idle;
        }

        let now = self.clock.now();
        while let Some(cursor) = self.current {
            let timestamp = self.moment(cursor).timestamp().unwrap_or(now);
            let delay = timestamp - now;
            if delay > self.lookahead_ms {
                return TickOutcome::Rearm { delay };
            }

            if -delay > self.max_deviation {
                self.max_deviation = -delay;
                log::trace!("Scheduler running {:.3} ms late", -delay);
            }

            if let Some(position) = self.position_to_report.take() {
                self.last_reported = Some(position);
                if let Some(report) = self.on_position.clone() {
                    report(position);
                }
            }

            self.send(cursor, timestamp);
            self.record(cursor);
            self.current = self.next_moment();
        }
        TickOutcome::Idle
    }

    fn send(&self, cursor: Cursor, timestamp: f64) {
        let moment = self.moment(cursor);
        if moment.is_empty() {
            return;
        }
        if let Some(sink) = &self.sink {
            let mut sink = sink.borrow_mut();
            for message in moment.messages() {
                sink.send(message.bytes(), timestamp);
            }
        }
    }

    fn record(&self, cursor: Cursor) {
        let Some(recording) = &self.recording else {
            return;
        };
        let moment = self.moment(cursor);
        let Some(first) = moment.messages().first() else {
            return;
        };

        let channel = first.channel() as usize;
        let mut recording = recording.borrow_mut();
        match recording.tracks.get_mut(channel) {
            Some(track) => track.add_recorded_moment(moment),
            None => log::warn!(
                "Recording has no track for channel {}, moment at {} not recorded",
                channel,
                moment.position()
            ),
        }
    }

    /// Hold the in-flight moment and stop scheduling
    pub fn pause(&mut self) -> PerformerResult<()> {
        if !self.is_running() {
            return Err(PerformerError::InvalidState(format!(
                "attempt to pause a {:?} sequence",
                self.state
            )));
        }
        self.state = PlaybackState::Paused;
        self.generation += 1;
        self.paused_at = Some(self.clock.now());
        log::debug!("Sequence paused");
        Ok(())
    }

    /// Continue from the held moment. Everything still to come moves later
    /// by exactly the time spent paused.
    pub fn resume(&mut self) -> PerformerResult<TickOutcome> {
        if !self.is_paused() {
            return Err(PerformerError::InvalidState(format!(
                "attempt to resume a {:?} sequence",
                self.state
            )));
        }

        let now = self.clock.now();
        let paused_for = now - self.paused_at.take().unwrap_or(now);
        self.origin += paused_for;
        self.paused_total += paused_for;

        let origin = self.origin;
        if let Some((track, index)) = self.current {
            let moment = &mut self.tracks[track].moments_mut()[index];
            moment.set_timestamp(origin + moment.schedule_position() as f64);
        }

        self.state = PlaybackState::Running;
        self.generation += 1;
        log::debug!("Sequence resumed after {:.1} ms", paused_for);
        Ok(self.tick(self.generation))
    }

    /// Stop and report the performance duration to the end callback.
    /// Does nothing if already stopped.
    pub fn stop(&mut self) {
        if self.is_stopped() {
            return;
        }

        let now = self.clock.now();
        let paused = self.paused_at.take().map_or(0.0, |at| now - at);
        let duration = (now - self.started_at - self.paused_total - paused)
            .max(0.0)
            .ceil() as u64;

        self.state = PlaybackState::Stopped;
        self.generation += 1;
        self.current = None;
        self.position_to_report = None;

        log::debug!(
            "Sequence at {} stopped after {} ms (max deviation {:.3} ms)",
            self.position_in_score,
            duration,
            self.max_deviation
        );

        if let Some(on_end) = self.on_end.clone() {
            on_end(self.recording.clone(), duration);
        }
    }

    /// Cut the span short: send the in-flight moment and everything left in
    /// the window right now, minus note-ons, without recording, then stop.
    pub fn finish_silently(&mut self) {
        if self.is_stopped() {
            return;
        }

        let now = self.clock.now();
        self.state = PlaybackState::Running;
        self.generation += 1;
        self.position_to_report = None;

        let sink = self.sink.clone();
        let mut cursor = self.current.take();
        while let Some(current) = cursor {
            if let Some(sink) = &sink {
                let mut sink = sink.borrow_mut();
                for message in self.moment(current).messages() {
                    let is_note_on =
                        message.command() == command::NOTE_ON && message.data2() > 0;
                    if !is_note_on {
                        sink.send(message.bytes(), now);
                    }
                }
            }
            cursor = self.pick_next();
        }

        self.stop();
    }

    /// Shift recorded timestamps so the earliest one is zero. False if
    /// nothing was recorded.
    pub fn normalize_recording(&mut self) -> bool {
        let earliest = self
            .tracks
            .iter()
            .filter_map(|t| t.moments().first().and_then(Moment::timestamp))
            .reduce(f64::min);

        let Some(earliest) = earliest else {
            return false;
        };
        for track in &mut self.tracks {
            for moment in track.moments_mut() {
                if let Some(timestamp) = moment.timestamp() {
                    moment.set_timestamp(timestamp - earliest);
                }
            }
        }
        true
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("tracks", &self.tracks.len())
            .field("position_in_score", &self.position_in_score)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish()
    }
}
