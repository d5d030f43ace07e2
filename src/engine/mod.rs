// Engine - Single-threaded event loop driving ticks and live input
//
// Ticks re-arm themselves through a timer queue; live input arrives on a
// lock-free ring buffer filled by the driver thread. Each pass drains the
// input first, in arrival order, then fires every due timer.

use crate::assistant::{Assistant, Started};
use crate::error::{PerformerError, PerformerResult};
use crate::messaging::channels::InputConsumer;
use crate::midi::event::InputMessage;
use crate::midi::output::SharedSink;
use crate::sequencer::clock::SharedClock;
use crate::sequencer::sequence::{Sequence, SpanOptions};
use crate::sequencer::timer::TimerQueue;
use crate::sequencer::transport::TickOutcome;
use ringbuf::traits::Consumer;
use std::time::Duration;

/// What a timer entry ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTarget {
    Main,
    Subsequence(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerKey {
    target: TickTarget,
    generation: u64,
}

/// The performance being driven
#[derive(Debug)]
pub enum Performance {
    /// The whole sequence under its own timing
    Free(Sequence),
    /// Subsequences triggered by the live performer
    Assisted(Assistant),
}

pub struct EventLoop {
    performance: Performance,
    clock: SharedClock,
    timers: TimerQueue<TimerKey>,
    idle_poll_ms: f64,
}

impl EventLoop {
    pub fn new(performance: Performance, clock: SharedClock) -> Self {
        Self {
            performance,
            clock,
            timers: TimerQueue::new(),
            idle_poll_ms: 1.0,
        }
    }

    pub fn free(sequence: Sequence) -> Self {
        let clock = sequence.clock().clone();
        Self::new(Performance::Free(sequence), clock)
    }

    pub fn assisted(assistant: Assistant, clock: SharedClock) -> Self {
        Self::new(Performance::Assisted(assistant), clock)
    }

    /// Longest sleep between passes when nothing is due
    pub fn with_idle_poll(mut self, idle_poll_ms: f64) -> Self {
        self.idle_poll_ms = idle_poll_ms.max(0.0);
        self
    }

    pub fn performance(&self) -> &Performance {
        &self.performance
    }

    pub fn performance_mut(&mut self) -> &mut Performance {
        &mut self.performance
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.timers.next_deadline()
    }

    /// True once the performance has stopped and no tick is armed
    pub fn is_finished(&self) -> bool {
        let stopped = match &self.performance {
            Performance::Free(sequence) => sequence.is_stopped(),
            Performance::Assisted(assistant) => {
                assistant.is_stopped()
                    && assistant
                        .subsequences()
                        .iter()
                        .all(|s| s.sequence().is_stopped())
            }
        };
        stopped && self.timers.is_empty()
    }

    fn generation(&self, target: TickTarget) -> Option<u64> {
        match (&self.performance, target) {
            (Performance::Free(sequence), TickTarget::Main) => Some(sequence.generation()),
            (Performance::Assisted(assistant), TickTarget::Subsequence(index)) => {
                assistant.generation(index)
            }
            _ => None,
        }
    }

    fn arm(&mut self, target: TickTarget, outcome: TickOutcome) {
        if let TickOutcome::Rearm { delay } = outcome {
            if let Some(generation) = self.generation(target) {
                let deadline = self.clock.now() + delay.max(0.0);
                self.timers.schedule(deadline, TimerKey { target, generation });
            }
        }
    }

    fn arm_started(&mut self, started: Option<Started>) {
        if let Some(Started { index, outcome }) = started {
            self.arm(TickTarget::Subsequence(index), outcome);
        }
    }

    /// Start a free performance of `[from_ms, to_ms)`
    pub fn play_span(&mut self, options: SpanOptions) -> PerformerResult<()> {
        let Performance::Free(sequence) = &mut self.performance else {
            return Err(PerformerError::InvalidState(
                "play_span needs a free performance".into(),
            ));
        };
        let outcome = sequence.play_span(options)?;
        self.arm(TickTarget::Main, outcome);
        Ok(())
    }

    /// Start following the live performer through `[from_ms, to_ms)`
    pub fn start_assisted(
        &mut self,
        sink: SharedSink,
        from_ms: i64,
        to_ms: i64,
        tracks_on: Vec<bool>,
    ) -> PerformerResult<()> {
        let Performance::Assisted(assistant) = &mut self.performance else {
            return Err(PerformerError::InvalidState(
                "start_assisted needs an assisted performance".into(),
            ));
        };
        assistant.play_span(sink, from_ms, to_ms, tracks_on)
    }

    pub fn pause(&mut self) -> PerformerResult<()> {
        match &mut self.performance {
            Performance::Free(sequence) => sequence.pause(),
            Performance::Assisted(assistant) => assistant.pause(),
        }
    }

    pub fn resume(&mut self) -> PerformerResult<()> {
        match &mut self.performance {
            Performance::Free(sequence) => {
                let outcome = sequence.resume()?;
                self.arm(TickTarget::Main, outcome);
            }
            Performance::Assisted(assistant) => {
                let started = assistant.resume()?;
                self.arm_started(started);
            }
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        match &mut self.performance {
            Performance::Free(sequence) => sequence.stop(),
            Performance::Assisted(assistant) => assistant.stop(),
        }
        self.timers.clear();
    }

    /// Dispatch one live input message
    pub fn handle_input(&mut self, input: &InputMessage) -> PerformerResult<()> {
        match &mut self.performance {
            Performance::Free(_) => {
                log::trace!("Input ignored during a free performance");
                Ok(())
            }
            Performance::Assisted(assistant) => {
                let started = assistant.handle_input(input)?;
                self.arm_started(started);
                Ok(())
            }
        }
    }

    /// Fire every timer that is due. Stale entries are discarded.
    pub fn run_due(&mut self) -> usize {
        let mut fired = 0;
        while let Some(key) = self.timers.pop_due(self.clock.now()) {
            if self.generation(key.target) != Some(key.generation) {
                continue;
            }
            let outcome = match (&mut self.performance, key.target) {
                (Performance::Free(sequence), TickTarget::Main) => sequence.tick(key.generation),
                (Performance::Assisted(assistant), TickTarget::Subsequence(index)) => {
                    assistant.tick(index, key.generation)
                }
                _ => TickOutcome::Idle,
            };
            fired += 1;
            self.arm(key.target, outcome);
        }
        fired
    }

    /// One pass: drain queued input in arrival order, then fire due timers.
    /// An input handler error is logged and the rest of the queue still runs.
    pub fn poll(&mut self, input: &mut InputConsumer) -> usize {
        while let Some(message) = input.try_pop() {
            if let Err(e) = self.handle_input(&message) {
                log::error!("Input handling failed: {}", e);
            }
        }
        self.run_due()
    }

    /// Poll until `keep_running` says otherwise, sleeping until the next
    /// deadline (capped at the idle poll interval) between passes
    pub fn run(&mut self, input: &mut InputConsumer, mut keep_running: impl FnMut(&Self) -> bool) {
        loop {
            self.poll(input);
            if !keep_running(self) {
                break;
            }

            let now = self.clock.now();
            let wait = self
                .next_deadline()
                .map_or(self.idle_poll_ms, |deadline| (deadline - now).clamp(0.0, self.idle_poll_ms));
            if wait > 0.0 {
                spin_sleep::sleep(Duration::from_secs_f64(wait / 1000.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::Message;
    use crate::midi::output::CaptureSink;
    use crate::sequencer::clock::ManualClock;
    use crate::sequencer::moment::Moment;
    use crate::sequencer::track::Track;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sequence(clock: &ManualClock) -> Sequence {
        let track = Track::from_moments(
            [0, 100, 200]
                .iter()
                .map(|&p| Moment::with_messages(p, vec![Message::note_on(0, 60, 100)]))
                .collect(),
        )
        .unwrap();
        Sequence::from_tracks(vec![track], clock.shared())
    }

    #[test]
    fn test_free_performance_runs_to_completion() {
        let clock = ManualClock::new(0.0);
        let sink = Rc::new(RefCell::new(CaptureSink::new()));
        let mut event_loop = EventLoop::free(sequence(&clock));

        event_loop
            .play_span(SpanOptions::new().sink(sink.clone()).on_position(Rc::new(|_: i64| {})))
            .unwrap();
        assert_eq!(sink.borrow().len(), 1);
        assert_eq!(event_loop.next_deadline(), Some(100.0));

        clock.set(99.0);
        assert_eq!(event_loop.run_due(), 0);
        clock.set(100.0);
        assert_eq!(event_loop.run_due(), 1);
        clock.set(250.0);
        event_loop.run_due();

        let timestamps: Vec<f64> = sink.borrow().sent().iter().map(|m| m.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 100.0, 200.0]);
        assert!(event_loop.is_finished());
    }

    #[test]
    fn test_stale_timer_after_pause_is_dropped() {
        let clock = ManualClock::new(0.0);
        let sink = Rc::new(RefCell::new(CaptureSink::new()));
        let mut event_loop = EventLoop::free(sequence(&clock));
        event_loop
            .play_span(SpanOptions::new().sink(sink.clone()).on_position(Rc::new(|_: i64| {})))
            .unwrap();

        event_loop.pause().unwrap();
        clock.set(500.0);
        assert_eq!(event_loop.run_due(), 0);
        assert_eq!(sink.borrow().len(), 1);

        event_loop.resume().unwrap();
        assert_eq!(event_loop.next_deadline(), Some(600.0));
    }

    #[test]
    fn test_wrong_mode_calls() {
        let clock = ManualClock::new(0.0);
        let mut event_loop = EventLoop::free(sequence(&clock));
        let sink = Rc::new(RefCell::new(CaptureSink::new()));
        assert!(matches!(
            event_loop.start_assisted(sink, 0, 100, Vec::new()),
            Err(PerformerError::InvalidState(_))
        ));
        assert!(event_loop.handle_input(&InputMessage::new(0x90, 60, 100)).is_ok());
    }
}
