// Scheduler - Look-ahead poll-and-drain loop shared by playback and metronome
// Event times accumulate from the audio clock, never from timer firing times

use crate::sequencer::clock::TransportClock;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default look-ahead window
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Shortest interval the poll task ticks at
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What a scheduler plays: the unit length, how its position advances and
/// what happens at each position
///
/// Methods take `&self`; implementations keep their settings behind `Cell`
/// or `RefCell` so they can be edited while the scheduler runs.
pub trait Cadence {
    /// Position in unit space (step/measure or beat)
    type Position: Copy + Default + fmt::Debug + PartialEq + 'static;

    /// Deferred visual event produced by a dispatch
    type Cue: 'static;

    /// Label used in log output
    const NAME: &'static str;

    /// Units (steps or beats) in one measure
    fn units_per_measure(&self) -> usize;

    /// Length of one unit in seconds, read on every cycle
    fn unit_seconds(&self) -> f64;

    /// Position playback begins from, given where the last run stopped
    fn start_position(&self, _previous: Self::Position) -> Self::Position {
        Self::Position::default()
    }

    /// Position kept after a stop
    fn stop_position(&self, _previous: Self::Position) -> Self::Position {
        Self::Position::default()
    }

    /// Issue the render calls for `position` at audio time `time`
    fn dispatch(&self, position: Self::Position, time: f64) -> Option<Self::Cue>;

    /// Position following `position`
    fn advance(&self, position: Self::Position) -> Self::Position;

    /// Deliver a visual cue once its audio has become audible
    fn fire(&self, _cue: Self::Cue) {}

    /// Called after a stop
    fn on_stop(&self) {}
}

/// Mutable scheduling state: where we are and when it sounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor<P> {
    pub position: P,
    pub next_event_time: f64,
}

impl<P: Default> Default for Cursor<P> {
    fn default() -> Self {
        Self {
            position: P::default(),
            next_event_time: 0.0,
        }
    }
}

/// One dispatch cycle's visual cue with the audio time it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched<Q> {
    pub time: f64,
    pub cue: Q,
}

/// The look-ahead window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAhead {
    window: f64,
}

impl LookAhead {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.as_secs_f64(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window)
    }

    /// Run every dispatch cycle whose event time falls before `now + window`
    ///
    /// Each cycle dispatches the cursor position, adds one unit to the event
    /// time and advances the position.
    pub fn drain<C: Cadence + ?Sized>(
        &self,
        cadence: &C,
        cursor: &mut Cursor<C::Position>,
        now: f64,
    ) -> Vec<Dispatched<C::Cue>> {
        let horizon = now + self.window;
        let mut cues = Vec::new();

        while cursor.next_event_time < horizon {
            let time = cursor.next_event_time;
            if let Some(cue) = cadence.dispatch(cursor.position, time) {
                cues.push(Dispatched { time, cue });
            }

            let unit = cadence.unit_seconds();
            if unit.is_nan() || unit <= 0.0 {
                tracing::warn!(cadence = C::NAME, unit, "Non-positive unit length, skipping drain");
                break;
            }
            cursor.next_event_time += unit;
            cursor.position = cadence.advance(cursor.position);
        }

        cues
    }
}

impl Default for LookAhead {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKAHEAD)
    }
}

/// How polls are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    /// The host calls [`Scheduler::poll`] itself; visual cues fire from polls
    Manual,
    /// A local tokio task polls on this interval; visual cues are delayed
    /// local tasks. Requires a `LocalSet` context.
    Interval(Duration),
}

impl Default for Drive {
    fn default() -> Self {
        Drive::Interval(DEFAULT_POLL_INTERVAL)
    }
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Stopped,
    /// Start was requested before the clock was ready
    Pending,
    Running,
}

impl SchedulerState {
    /// Running, or waiting for the clock to start running
    pub fn is_active(&self) -> bool {
        !matches!(self, SchedulerState::Stopped)
    }
}

struct Core<C: Cadence> {
    cadence: Rc<C>,
    clock: TransportClock,
    lookahead: LookAhead,
    drive: Drive,
    cursor: Cell<Cursor<C::Position>>,
    state: Cell<SchedulerState>,
    /// Bumped on every start and stop; stale tasks compare against it
    generation: Cell<u64>,
    task: RefCell<Option<JoinHandle<()>>>,
    due: RefCell<VecDeque<Dispatched<C::Cue>>>,
}

impl<C: Cadence + 'static> Core<C> {
    fn begin(&self, now: f64) {
        let previous = self.cursor.get().position;
        self.cursor.set(Cursor {
            position: self.cadence.start_position(previous),
            next_event_time: now,
        });
        self.state.set(SchedulerState::Running);
        tracing::info!(cadence = C::NAME, at = now, "Scheduler running");
    }

    fn poll(self: &Rc<Self>) -> usize {
        let now = match (self.state.get(), self.clock.now()) {
            (SchedulerState::Stopped, _) | (_, None) => return 0,
            (SchedulerState::Pending, Some(now)) => {
                self.begin(now);
                now
            }
            (SchedulerState::Running, Some(now)) => now,
        };

        let generation = self.generation.get();
        let mut cursor = self.cursor.get();
        let cues = self.lookahead.drain(self.cadence.as_ref(), &mut cursor, now);
        // A sink may have stopped us mid-drain; its reset wins
        if self.generation.get() != generation {
            return cues.len();
        }
        self.cursor.set(cursor);
        let dispatched = cues.len();

        match self.drive {
            Drive::Manual => {
                self.due.borrow_mut().extend(cues);
                self.fire_due(now);
            }
            Drive::Interval(_) => {
                for Dispatched { time, cue } in cues {
                    self.schedule_visual(time, cue, generation);
                }
            }
        }

        dispatched
    }

    fn fire_due(&self, now: f64) {
        loop {
            let next = {
                let mut due = self.due.borrow_mut();
                match due.front() {
                    Some(entry) if entry.time <= now => due.pop_front(),
                    _ => None,
                }
            };
            match next {
                Some(entry) => self.cadence.fire(entry.cue),
                None => break,
            }
        }
    }

    fn schedule_visual(self: &Rc<Self>, time: f64, cue: C::Cue, generation: u64) {
        let delay = self.clock.delay_until(time);
        let core = Rc::downgrade(self);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = core.upgrade() {
                if core.generation.get() == generation {
                    core.cadence.fire(cue);
                }
            }
        });
    }
}

async fn poll_loop<C: Cadence + 'static>(core: Weak<Core<C>>, interval: Duration, generation: u64) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(core) = core.upgrade() else {
            break;
        };
        if core.generation.get() != generation {
            break;
        }
        core.poll();
    }
}

/// A look-ahead scheduler driving one [`Cadence`]
///
/// Cloning yields another handle to the same scheduler.
pub struct Scheduler<C: Cadence + 'static> {
    core: Rc<Core<C>>,
}

impl<C: Cadence + 'static> Scheduler<C> {
    pub fn new(cadence: Rc<C>, clock: TransportClock, lookahead: LookAhead, drive: Drive) -> Self {
        Self {
            core: Rc::new(Core {
                cadence,
                clock,
                lookahead,
                drive,
                cursor: Cell::new(Cursor::default()),
                state: Cell::new(SchedulerState::Stopped),
                generation: Cell::new(0),
                task: RefCell::new(None),
                due: RefCell::new(VecDeque::new()),
            }),
        }
    }

    pub fn cadence(&self) -> &Rc<C> {
        &self.core.cadence
    }

    pub fn clock(&self) -> &TransportClock {
        &self.core.clock
    }

    pub fn state(&self) -> SchedulerState {
        self.core.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    pub fn cursor(&self) -> Cursor<C::Position> {
        self.core.cursor.get()
    }

    /// Stopped -> Running; a no-op otherwise
    ///
    /// If the clock is not ready the start is queued as
    /// [`SchedulerState::Pending`] and completes on the first poll that
    /// sees the clock running.
    ///
    /// # Panics
    ///
    /// With [`Drive::Interval`] the poll task is spawned with
    /// `tokio::task::spawn_local`, so this panics when called outside a
    /// tokio `LocalSet`. [`Drive::Manual`] has no such requirement.
    pub fn start(&self) -> SchedulerState {
        let core = &self.core;
        if core.state.get() != SchedulerState::Stopped {
            return core.state.get();
        }

        let generation = core.generation.get().wrapping_add(1);
        core.generation.set(generation);

        match core.clock.now() {
            Some(now) => core.begin(now),
            None => {
                core.state.set(SchedulerState::Pending);
                tracing::debug!(cadence = C::NAME, "Clock not ready, start deferred");
            }
        }

        if let Drive::Interval(interval) = core.drive {
            let interval = interval.max(MIN_POLL_INTERVAL);
            let handle = tokio::task::spawn_local(poll_loop(Rc::downgrade(core), interval, generation));
            if let Some(stale) = core.task.replace(Some(handle)) {
                stale.abort();
            }
        }

        core.state.get()
    }

    /// Running/Pending -> Stopped
    ///
    /// The poll task is cancelled before this returns, so no dispatch cycle
    /// runs after it. Only the step/beat part of the position is reset.
    pub fn stop(&self) {
        let core = &self.core;
        if core.state.get() == SchedulerState::Stopped {
            return;
        }

        core.state.set(SchedulerState::Stopped);
        core.generation.set(core.generation.get().wrapping_add(1));
        if let Some(handle) = core.task.borrow_mut().take() {
            handle.abort();
        }
        core.due.borrow_mut().clear();

        let mut cursor = core.cursor.get();
        cursor.position = core.cadence.stop_position(cursor.position);
        core.cursor.set(cursor);

        core.cadence.on_stop();
        tracing::info!(cadence = C::NAME, "Scheduler stopped");
    }

    /// Move the cursor to `position` without touching its event time
    pub fn set_position(&self, position: C::Position) {
        let mut cursor = self.core.cursor.get();
        cursor.position = position;
        self.core.cursor.set(cursor);
    }

    /// Start when stopped, stop otherwise; returns the new state
    pub fn toggle(&self) -> SchedulerState {
        if self.state().is_active() {
            self.stop();
            self.state()
        } else {
            self.start()
        }
    }

    /// Run one poll: drain every cycle inside the look-ahead window
    ///
    /// Returns the number of dispatch cycles run.
    pub fn poll(&self) -> usize {
        self.core.poll()
    }
}

impl<C: Cadence + 'static> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<C: Cadence + 'static> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("cadence", &C::NAME)
            .field("state", &self.state())
            .field("cursor", &self.cursor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::clock::{SampleClock, SystemClock};
    use tokio::task::LocalSet;

    /// Counts units modulo 4, one unit per 0.125 s
    #[derive(Default)]
    struct Counter {
        dispatched: RefCell<Vec<(usize, f64)>>,
        fired: RefCell<Vec<usize>>,
        stops: Cell<usize>,
    }

    impl Cadence for Counter {
        type Position = usize;
        type Cue = usize;
        const NAME: &'static str = "counter";

        fn units_per_measure(&self) -> usize {
            4
        }

        fn unit_seconds(&self) -> f64 {
            0.125
        }

        fn dispatch(&self, position: usize, time: f64) -> Option<usize> {
            self.dispatched.borrow_mut().push((position, time));
            Some(position)
        }

        fn advance(&self, position: usize) -> usize {
            (position + 1) % self.units_per_measure()
        }

        fn fire(&self, cue: usize) {
            self.fired.borrow_mut().push(cue);
        }

        fn on_stop(&self) {
            self.stops.set(self.stops.get() + 1);
        }
    }

    fn manual(clock: &SampleClock) -> Scheduler<Counter> {
        Scheduler::new(
            Rc::new(Counter::default()),
            TransportClock::new(clock.clone()),
            LookAhead::default(),
            Drive::Manual,
        )
    }

    #[test]
    fn test_drain_fills_window() {
        let counter = Counter::default();
        let mut cursor = Cursor::default();
        let cues = LookAhead::new(Duration::from_millis(300)).drain(&counter, &mut cursor, 0.0);

        // 0.0, 0.125, 0.25 are inside [0, 0.3)
        let times: Vec<f64> = cues.iter().map(|d| d.time).collect();
        assert_eq!(times, [0.0, 0.125, 0.25]);
        assert_eq!(cursor.position, 3);
        assert_eq!(cursor.next_event_time, 0.375);
    }

    #[test]
    fn test_drain_is_idempotent_within_window() {
        let counter = Counter::default();
        let lookahead = LookAhead::default();
        let mut cursor = Cursor::default();

        assert_eq!(lookahead.drain(&counter, &mut cursor, 0.0).len(), 1);
        assert!(lookahead.drain(&counter, &mut cursor, 0.0).is_empty());
        assert!(lookahead.drain(&counter, &mut cursor, 0.02).is_empty());
        assert_eq!(lookahead.drain(&counter, &mut cursor, 0.03).len(), 1);
    }

    #[test]
    fn test_event_times_accumulate_exactly() {
        let counter = Counter::default();
        let mut cursor = Cursor::default();
        LookAhead::default().drain(&counter, &mut cursor, 2.0);

        let times: Vec<f64> = counter.dispatched.borrow().iter().map(|d| d.1).collect();
        assert_eq!(times.len(), 17);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], 0.125);
        }
    }

    #[test]
    fn test_start_and_poll() {
        let clock = SampleClock::with_sample_rate(1000.0);
        let scheduler = manual(&clock);
        assert_eq!(scheduler.start(), SchedulerState::Running);
        assert_eq!(scheduler.poll(), 1);

        clock.advance(250);
        // Window now reaches 0.35: units at 0.125 and 0.25
        assert_eq!(scheduler.poll(), 2);
        assert_eq!(scheduler.cursor().position, 3);
        assert_eq!(*scheduler.cadence().fired.borrow(), [0, 1, 2]);
    }

    #[test]
    fn test_start_is_noop_while_running() {
        let clock = SampleClock::with_sample_rate(1000.0);
        let scheduler = manual(&clock);
        scheduler.start();
        scheduler.poll();
        clock.advance(100);
        scheduler.start();
        assert_eq!(scheduler.cursor().next_event_time, 0.125);
    }

    #[test]
    fn test_deferred_start() {
        let clock = SampleClock::new();
        let scheduler = manual(&clock);

        assert_eq!(scheduler.start(), SchedulerState::Pending);
        assert_eq!(scheduler.poll(), 0);
        assert!(scheduler.cadence().dispatched.borrow().is_empty());

        clock.start(1000.0);
        clock.advance(500);
        assert_eq!(scheduler.poll(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(scheduler.cadence().dispatched.borrow()[0], (0, 0.5));
    }

    #[test]
    fn test_stop_cancels_dispatch() {
        let clock = SampleClock::with_sample_rate(1000.0);
        let scheduler = manual(&clock);
        scheduler.start();
        scheduler.poll();
        scheduler.stop();

        clock.advance(1000);
        assert_eq!(scheduler.poll(), 0);
        assert_eq!(scheduler.cadence().dispatched.borrow().len(), 1);
        assert_eq!(scheduler.cadence().stops.get(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[test]
    fn test_stop_drops_undelivered_cues() {
        let clock = SampleClock::with_sample_rate(1000.0);
        let scheduler = Scheduler::new(
            Rc::new(Counter::default()),
            TransportClock::new(clock.clone()),
            LookAhead::new(Duration::from_millis(500)),
            Drive::Manual,
        );
        scheduler.start();
        assert_eq!(scheduler.poll(), 4);
        // Only the cue at 0.0 is due yet
        assert_eq!(*scheduler.cadence().fired.borrow(), [0]);

        scheduler.stop();
        scheduler.start();
        clock.advance(100);
        scheduler.poll();
        assert!(!scheduler.cadence().fired.borrow().contains(&1));
    }

    #[test]
    fn test_toggle() {
        let clock = SampleClock::with_sample_rate(1000.0);
        let scheduler = manual(&clock);
        assert_eq!(scheduler.toggle(), SchedulerState::Running);
        assert_eq!(scheduler.toggle(), SchedulerState::Stopped);

        let pending = manual(&SampleClock::new());
        assert_eq!(pending.toggle(), SchedulerState::Pending);
        assert_eq!(pending.toggle(), SchedulerState::Stopped);
    }

    #[test]
    fn test_restart_resets_position_by_default() {
        let clock = SampleClock::with_sample_rate(1000.0);
        let scheduler = manual(&clock);
        scheduler.start();
        clock.advance(250);
        scheduler.poll();
        scheduler.stop();
        assert_eq!(scheduler.cursor().position, 0);

        scheduler.start();
        assert_eq!(scheduler.cursor().next_event_time, 0.25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_keeps_polling() {
        LocalSet::new()
            .run_until(async {
                let scheduler = Scheduler::new(
                    Rc::new(Counter::default()),
                    TransportClock::new(SystemClock::running()),
                    LookAhead::default(),
                    Drive::Interval(Duration::ZERO),
                );
                assert_eq!(scheduler.start(), SchedulerState::Running);

                tokio::time::sleep(Duration::from_millis(310)).await;
                // Horizon 0.41 s: 0.0, 0.125, 0.25, 0.375
                assert_eq!(scheduler.cadence().dispatched.borrow().len(), 4);
                assert_eq!(*scheduler.cadence().fired.borrow(), [0, 1, 2]);
                assert!(scheduler.is_running());
                scheduler.stop();
            })
            .await;
    }

    #[test]
    #[should_panic(expected = "spawn_local")]
    fn test_interval_start_requires_local_set() {
        let scheduler = Scheduler::new(
            Rc::new(Counter::default()),
            TransportClock::new(SampleClock::with_sample_rate(1000.0)),
            LookAhead::default(),
            Drive::Interval(DEFAULT_POLL_INTERVAL),
        );
        scheduler.start();
    }
}
