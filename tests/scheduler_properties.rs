//! Scheduler behaviour across whole spans: ordering, windows, pause/resume
//! and silent finishing, driven by a hand-advanced clock.

use assisted_performer::midi::event::Message;
use assisted_performer::sequencer::SharedSequence;
use assisted_performer::{
    CaptureSink, Clock, ManualClock, Moment, MomentStart, PerformerError, Sequence, SpanOptions,
    TickOutcome, Track,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn note_track(channel: u8, positions: &[i64]) -> Track {
    let moments = positions
        .iter()
        .map(|&p| {
            let mut moment =
                Moment::with_messages(p, vec![Message::note_on(channel, (p / 10) as u8, 100)]);
            moment.mark_start(MomentStart::Chord).unwrap();
            moment
        })
        .collect();
    Track::from_moments(moments).unwrap()
}

fn random_tracks(rng: &mut StdRng) -> Vec<Track> {
    let n_tracks = rng.gen_range(1..4);
    (0..n_tracks)
        .map(|channel| {
            let mut positions: Vec<i64> = (0..rng.gen_range(1..20))
                .map(|_| rng.gen_range(0..100) * 10)
                .collect();
            positions.sort_unstable();
            positions.dedup();
            note_track(channel as u8, &positions)
        })
        .collect()
}

fn span(sink: &Rc<RefCell<CaptureSink>>) -> SpanOptions {
    SpanOptions::new()
        .sink(sink.clone())
        .on_position(Rc::new(|_: i64| {}))
}

/// Tick at exactly the requested times until the span is exhausted
fn run_to_end(sequence: &mut Sequence, clock: &ManualClock, mut outcome: TickOutcome) {
    while let TickOutcome::Rearm { delay } = outcome {
        clock.advance(delay.max(0.0));
        outcome = sequence.tick(sequence.generation());
    }
}

fn sent(sink: &Rc<RefCell<CaptureSink>>) -> Vec<(Vec<u8>, f64)> {
    sink.borrow()
        .sent()
        .iter()
        .map(|m| (m.bytes.clone(), m.timestamp))
        .collect()
}

#[test]
fn test_two_tracks_interleave_in_position_order() {
    let clock = ManualClock::new(0.0);
    let tracks = vec![note_track(0, &[0, 100, 200]), note_track(1, &[50, 150])];
    let mut sequence = Sequence::from_tracks(tracks, clock.shared());
    let sink = Rc::new(RefCell::new(CaptureSink::new()));
    let ends = Rc::new(Cell::new(0));
    let duration = Rc::new(Cell::new(0u64));

    let (e, d) = (ends.clone(), duration.clone());
    let outcome = sequence
        .play_span(span(&sink).span(0, 250).on_end(Rc::new(
            move |_: Option<SharedSequence>, ms: u64| {
                e.set(e.get() + 1);
                d.set(ms);
            },
        )))
        .unwrap();
    run_to_end(&mut sequence, &clock, outcome);

    let timestamps: Vec<f64> = sent(&sink).iter().map(|(_, t)| *t).collect();
    assert_eq!(timestamps, vec![0.0, 50.0, 100.0, 150.0, 200.0]);
    let channels: Vec<u8> = sent(&sink).iter().map(|(b, _)| b[0] & 0x0F).collect();
    assert_eq!(channels, vec![0, 1, 0, 1, 0]);

    assert!(sequence.is_stopped());
    assert_eq!(ends.get(), 1);
    assert_eq!(duration.get(), 200);

    // Nothing more once both tracks are exhausted
    clock.advance(1000.0);
    assert_eq!(sequence.tick(sequence.generation()), TickOutcome::Idle);
    assert_eq!(sink.borrow().len(), 5);
    assert_eq!(ends.get(), 1);
}

#[test]
fn test_equal_positions_follow_track_order() {
    let clock = ManualClock::new(0.0);
    let tracks = vec![note_track(2, &[0, 100]), note_track(0, &[0, 100]), note_track(1, &[100])];
    let mut sequence = Sequence::from_tracks(tracks, clock.shared());
    let sink = Rc::new(RefCell::new(CaptureSink::new()));

    let outcome = sequence.play_span(span(&sink)).unwrap();
    run_to_end(&mut sequence, &clock, outcome);

    let channels: Vec<u8> = sent(&sink).iter().map(|(b, _)| b[0] & 0x0F).collect();
    assert_eq!(channels, vec![2, 0, 2, 0, 1]);
}

#[test]
fn test_late_tick_sends_everything_due() {
    let clock = ManualClock::new(0.0);
    let mut sequence = Sequence::from_tracks(vec![note_track(0, &[0, 10, 20, 500])], clock.shared());
    let sink = Rc::new(RefCell::new(CaptureSink::new()));

    sequence.play_span(span(&sink)).unwrap();
    clock.set(100.0);
    let outcome = sequence.tick(sequence.generation());

    assert_eq!(sink.borrow().len(), 3);
    assert_eq!(outcome, TickOutcome::Rearm { delay: 400.0 });
    assert!(sequence.max_deviation() >= 80.0);
}

#[test]
fn test_pause_resume_shifts_by_paused_interval() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let tracks = random_tracks(&mut rng);
        let pause_at = rng.gen_range(0..1000) as f64 + 0.5;
        let paused_for = rng.gen_range(1..5000) as f64;

        // Uninterrupted reference run
        let clock = ManualClock::new(0.0);
        let mut sequence = Sequence::from_tracks(tracks.clone(), clock.shared());
        let sink = Rc::new(RefCell::new(CaptureSink::new()));
        let outcome = sequence.play_span(span(&sink)).unwrap();
        run_to_end(&mut sequence, &clock, outcome);
        let reference = sent(&sink);

        // Same span, paused once
        let clock = ManualClock::new(0.0);
        let mut sequence = Sequence::from_tracks(tracks, clock.shared());
        let sink = Rc::new(RefCell::new(CaptureSink::new()));
        let mut outcome = sequence.play_span(span(&sink)).unwrap();
        let mut paused = false;
        while let TickOutcome::Rearm { delay } = outcome {
            let due = clock.now() + delay.max(0.0);
            if !paused && due > pause_at {
                clock.set(pause_at);
                sequence.pause().unwrap();
                clock.advance(paused_for);
                outcome = sequence.resume().unwrap();
                paused = true;
                continue;
            }
            clock.set(due);
            outcome = sequence.tick(sequence.generation());
        }

        let interrupted = sent(&sink);
        assert_eq!(interrupted.len(), reference.len());
        for ((bytes, t), (ref_bytes, ref_t)) in interrupted.iter().zip(&reference) {
            assert_eq!(bytes, ref_bytes);
            let expected = if paused && *ref_t > pause_at {
                ref_t + paused_for
            } else {
                *ref_t
            };
            assert_eq!(*t, expected);
        }
    }
}

#[test]
fn test_sequential_windows_match_full_span() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let tracks = random_tracks(&mut rng);

        let clock = ManualClock::new(0.0);
        let mut sequence = Sequence::from_tracks(tracks.clone(), clock.shared());
        let sink = Rc::new(RefCell::new(CaptureSink::new()));
        let outcome = sequence.play_span(span(&sink)).unwrap();
        run_to_end(&mut sequence, &clock, outcome);
        let full = sink.borrow().payloads();

        // Cut points fall between moments (positions are multiples of 10)
        let mut cuts: Vec<i64> = (0..rng.gen_range(1..4))
            .map(|_| rng.gen_range(0..100) * 10 + 5)
            .collect();
        cuts.sort_unstable();
        cuts.dedup();
        let mut bounds = vec![0];
        bounds.extend(cuts);
        bounds.push(i64::MAX);

        let sink = Rc::new(RefCell::new(CaptureSink::new()));
        for window in bounds.windows(2) {
            match sequence.play_span(span(&sink).span(window[0], window[1])) {
                Ok(outcome) => run_to_end(&mut sequence, &clock, outcome),
                Err(PerformerError::Precondition(_)) => unreachable!("tracks are never empty"),
                Err(e) => panic!("{}", e),
            }
        }
        assert_eq!(sink.borrow().payloads(), full);
    }
}

#[test]
fn test_finish_silently_drops_pending_note_ons() {
    let clock = ManualClock::new(0.0);
    let mut first = Moment::with_messages(0, vec![Message::note_on(0, 60, 100)]);
    first.mark_start(MomentStart::Chord).unwrap();
    let pending = Moment::with_messages(
        100,
        vec![Message::note_on(0, 62, 100), Message::control_change(0, 7, 90)],
    );
    let later = Moment::with_messages(200, vec![Message::note_off(0, 60)]);
    let track = Track::from_moments(vec![first, pending, later]).unwrap();

    let mut sequence = Sequence::from_tracks(vec![track], clock.shared());
    let sink = Rc::new(RefCell::new(CaptureSink::new()));
    let recording = Sequence::recording(1, clock.shared());
    sequence
        .play_span(span(&sink).recording(recording.clone()))
        .unwrap();
    assert_eq!(sink.borrow().len(), 1);

    clock.set(50.0);
    sequence.finish_silently();

    assert!(sequence.is_stopped());
    let after: Vec<(Vec<u8>, f64)> = sent(&sink).into_iter().skip(1).collect();
    assert_eq!(
        after,
        vec![(vec![0xB0, 7, 90], 50.0), (vec![0x80, 60, 64], 50.0)]
    );
    // Only the moment sent by the tick was recorded
    assert_eq!(recording.borrow().tracks()[0].len(), 1);
}

#[test]
fn test_finish_silently_while_paused() {
    let clock = ManualClock::new(0.0);
    let mut sequence = Sequence::from_tracks(vec![note_track(0, &[0, 100])], clock.shared());
    let sink = Rc::new(RefCell::new(CaptureSink::new()));
    sequence.play_span(span(&sink)).unwrap();
    sequence.pause().unwrap();

    sequence.finish_silently();
    assert!(sequence.is_stopped());
    assert_eq!(sink.borrow().len(), 1);
}

#[test]
fn test_play_span_restarts_a_running_sequence() {
    let clock = ManualClock::new(0.0);
    let mut sequence = Sequence::from_tracks(vec![note_track(0, &[0, 100, 200])], clock.shared());
    let sink = Rc::new(RefCell::new(CaptureSink::new()));
    let ends = Rc::new(Cell::new(0));

    let e = ends.clone();
    let on_end = Rc::new(move |_: Option<SharedSequence>, _: u64| e.set(e.get() + 1));
    sequence.play_span(span(&sink).on_end(on_end.clone())).unwrap();
    let stale = sequence.generation();

    clock.set(10.0);
    sequence.play_span(span(&sink).span(100, 300)).unwrap();
    assert_eq!(ends.get(), 1);
    assert_eq!(sequence.tick(stale), TickOutcome::Idle);

    let timestamps: Vec<f64> = sent(&sink).iter().map(|(_, t)| *t).collect();
    assert_eq!(timestamps, vec![0.0, 10.0]);
}

#[test]
fn test_positions_reported_before_their_moment_is_sent() {
    let clock = ManualClock::new(0.0);
    let mut sequence = Sequence::from_tracks(vec![note_track(0, &[0, 100, 200])], clock.shared());
    let sink = Rc::new(RefCell::new(CaptureSink::new()));
    let log = Rc::new(RefCell::new(Vec::new()));

    let (l, s) = (log.clone(), sink.clone());
    let outcome = sequence
        .play_span(span(&sink).on_position(Rc::new(move |p: i64| {
            l.borrow_mut().push((p, s.borrow().len()))
        })))
        .unwrap();
    assert_eq!(*log.borrow(), vec![(0, 0)]);

    run_to_end(&mut sequence, &clock, outcome);
    assert_eq!(*log.borrow(), vec![(0, 0), (100, 1), (200, 2)]);
}
