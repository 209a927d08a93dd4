// Sequencer Player - Pattern playback over the look-ahead scheduler
// Dispatches every active step of the pattern to the render sink

use crate::render::{RenderSink, VisualSync};
use crate::sequencer::pattern::PatternStore;
use crate::sequencer::scheduler::{Cadence, Scheduler};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Step/measure position of the playback cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepPosition {
    pub step: usize,
    pub measure: usize,
}

impl StepPosition {
    pub fn new(step: usize, measure: usize) -> Self {
        Self { step, measure }
    }
}

/// Where playback begins after a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Every start begins at step 0 of measure 0
    #[default]
    Rewind,
    /// Start at step 0 of the measure reached before the stop
    Resume,
}

/// Pattern playback cadence: one unit is one sixteenth-note step
pub struct PatternCadence {
    store: Rc<RefCell<PatternStore>>,
    sink: Rc<dyn RenderSink>,
    visual: Rc<dyn VisualSync>,
    restart: Cell<RestartPolicy>,
}

impl PatternCadence {
    pub fn new(
        store: Rc<RefCell<PatternStore>>,
        sink: Rc<dyn RenderSink>,
        visual: Rc<dyn VisualSync>,
    ) -> Self {
        Self {
            store,
            sink,
            visual,
            restart: Cell::new(RestartPolicy::default()),
        }
    }

    pub fn with_restart_policy(self, policy: RestartPolicy) -> Self {
        self.restart.set(policy);
        self
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart.get()
    }

    pub fn set_restart_policy(&self, policy: RestartPolicy) {
        self.restart.set(policy);
    }

    pub fn store(&self) -> &Rc<RefCell<PatternStore>> {
        &self.store
    }
}

impl Cadence for PatternCadence {
    type Position = StepPosition;
    type Cue = StepPosition;
    const NAME: &'static str = "pattern";

    fn units_per_measure(&self) -> usize {
        self.store.borrow().steps_per_measure()
    }

    fn unit_seconds(&self) -> f64 {
        self.store.borrow().tempo().seconds_per_step()
    }

    fn start_position(&self, previous: StepPosition) -> StepPosition {
        match self.restart.get() {
            RestartPolicy::Rewind => StepPosition::default(),
            RestartPolicy::Resume => {
                let total = self.store.borrow().total_measures();
                let measure = if previous.measure < total {
                    previous.measure
                } else {
                    0
                };
                StepPosition::new(0, measure)
            }
        }
    }

    fn stop_position(&self, previous: StepPosition) -> StepPosition {
        StepPosition::new(0, previous.measure)
    }

    fn dispatch(&self, position: StepPosition, time: f64) -> Option<StepPosition> {
        // Collect first so sinks run with the store unborrowed
        let hits: Vec<(String, f32)> = self
            .store
            .borrow()
            .pattern()
            .hits_at(position.measure, position.step)
            .map(|track| (track.instrument_id.clone(), track.gain()))
            .collect();

        for (instrument, gain) in hits {
            if let Err(e) = self.sink.render(&instrument, time, gain) {
                tracing::warn!(
                    instrument = %instrument,
                    step = position.step,
                    measure = position.measure,
                    error = %e,
                    "Render failed, event dropped"
                );
            }
        }

        Some(position)
    }

    fn advance(&self, position: StepPosition) -> StepPosition {
        let store = self.store.borrow();
        let step = position.step + 1;
        if step < store.steps_per_measure() {
            return StepPosition::new(step, position.measure);
        }

        let measure = position.measure + 1;
        if measure < store.total_measures() {
            StepPosition::new(0, measure)
        } else {
            StepPosition::default()
        }
    }

    fn fire(&self, cue: StepPosition) {
        let viewed = self.store.borrow().viewed_measure();
        if viewed == cue.measure {
            self.visual.on_step_due(cue.step, cue.measure);
        }
    }

    fn on_stop(&self) {
        self.visual.clear_highlight();
    }
}

/// Look-ahead scheduler playing a [`PatternStore`]
pub type PatternScheduler = Scheduler<PatternCadence>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{CaptureSink, CaptureVisual};
    use crate::sequencer::clock::{SampleClock, TransportClock};
    use crate::sequencer::scheduler::{Cursor, Drive, LookAhead};
    use crate::sequencer::timeline::TimeSignature;
    use std::time::Duration;

    struct Rig {
        store: Rc<RefCell<PatternStore>>,
        sink: Rc<CaptureSink>,
        visual: Rc<CaptureVisual>,
        clock: SampleClock,
        scheduler: PatternScheduler,
    }

    fn rig(policy: RestartPolicy) -> Rig {
        let store = Rc::new(RefCell::new(PatternStore::default()));
        let sink = Rc::new(CaptureSink::new());
        let visual = Rc::new(CaptureVisual::new());
        let clock = SampleClock::with_sample_rate(48000.0);
        let cadence = PatternCadence::new(store.clone(), sink.clone(), visual.clone())
            .with_restart_policy(policy);
        let scheduler = Scheduler::new(
            Rc::new(cadence),
            TransportClock::new(clock.clone()),
            LookAhead::default(),
            Drive::Manual,
        );
        Rig {
            store,
            sink,
            visual,
            clock,
            scheduler,
        }
    }

    /// Poll every 25 ms for `seconds`
    fn run_for(rig: &Rig, seconds: f64) {
        let polls = (seconds / 0.025).round() as usize;
        for _ in 0..polls {
            rig.scheduler.poll();
            rig.clock.advance_seconds(0.025);
        }
        rig.scheduler.poll();
    }

    #[test]
    fn test_step_four_sounds_half_a_second_later() {
        let rig = rig(RestartPolicy::Rewind);
        rig.clock.advance_seconds(1.0);
        {
            let mut store = rig.store.borrow_mut();
            store.toggle_step(0, 0, 0).unwrap();
            store.toggle_step(0, 0, 4).unwrap();
        }

        rig.scheduler.start();
        run_for(&rig, 0.6);

        let calls = rig.sink.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].time, 1.0);
        assert_eq!(calls[1].time, 1.5);
        assert_eq!(calls[0].instrument_id, "Kick 808");
        assert_eq!(calls[0].gain, 0.8);
    }

    #[test]
    fn test_wraps_from_last_step_of_last_measure() {
        let rig = rig(RestartPolicy::Rewind);
        rig.store.borrow_mut().add_measure().unwrap();
        let cadence = rig.scheduler.cadence();

        assert_eq!(cadence.advance(StepPosition::new(31, 1)), StepPosition::new(0, 0));
        assert_eq!(cadence.advance(StepPosition::new(31, 0)), StepPosition::new(0, 1));
        assert_eq!(cadence.advance(StepPosition::new(7, 1)), StepPosition::new(8, 1));
    }

    #[test]
    fn test_wrap_follows_time_signature() {
        let rig = rig(RestartPolicy::Rewind);
        rig.store.borrow_mut().set_time_signature(TimeSignature::TwoFour);
        let cadence = rig.scheduler.cadence();
        assert_eq!(cadence.units_per_measure(), 16);
        assert_eq!(cadence.advance(StepPosition::new(15, 0)), StepPosition::new(0, 0));
    }

    #[test]
    fn test_cursor_past_removed_measure_reads_silence() {
        let rig = rig(RestartPolicy::Rewind);
        rig.store.borrow_mut().toggle_step(0, 0, 0).unwrap();
        let cadence = rig.scheduler.cadence();

        assert_eq!(cadence.dispatch(StepPosition::new(0, 4), 0.0), Some(StepPosition::new(0, 4)));
        assert!(rig.sink.calls().is_empty());
        assert_eq!(cadence.advance(StepPosition::new(31, 4)), StepPosition::new(0, 0));
    }

    #[test]
    fn test_hits_render_in_track_order() {
        let rig = rig(RestartPolicy::Rewind);
        {
            let mut store = rig.store.borrow_mut();
            store.toggle_step(4, 0, 0).unwrap();
            store.toggle_step(1, 0, 0).unwrap();
            store.toggle_step(0, 0, 0).unwrap();
        }
        rig.scheduler.start();
        rig.scheduler.poll();

        let ids: Vec<_> = rig.sink.calls().into_iter().map(|c| c.instrument_id).collect();
        assert_eq!(ids, ["Kick 808", "Snare 808", "Splash"]);
    }

    #[test]
    fn test_render_failure_does_not_halt() {
        let rig = rig(RestartPolicy::Rewind);
        rig.sink.fail_on("Kick 808");
        {
            let mut store = rig.store.borrow_mut();
            store.toggle_step(0, 0, 0).unwrap();
            store.toggle_step(1, 0, 0).unwrap();
            store.toggle_step(0, 0, 2).unwrap();
            store.toggle_step(1, 0, 2).unwrap();
        }
        rig.scheduler.start();
        run_for(&rig, 0.3);

        let calls = rig.sink.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.instrument_id == "Snare 808"));
        assert!(rig.scheduler.is_running());
        assert!(rig.scheduler.cursor().position.step > 2);
    }

    #[test]
    fn test_visual_suppressed_for_other_measure() {
        let rig = rig(RestartPolicy::Rewind);
        rig.store.borrow_mut().add_measure().unwrap();
        // add_measure moved the view to measure 1; playback starts on measure 0
        rig.scheduler.start();
        run_for(&rig, 0.25);
        assert!(rig.visual.steps().is_empty());

        rig.store.borrow_mut().view_measure(-1);
        run_for(&rig, 0.25);
        assert!(!rig.visual.steps().is_empty());
        assert!(rig.visual.steps().iter().all(|&(_, measure)| measure == 0));
    }

    #[test]
    fn test_visual_fires_once_audible() {
        let rig = rig(RestartPolicy::Rewind);
        rig.scheduler.start();
        rig.scheduler.poll();
        assert_eq!(rig.visual.steps(), [(0, 0)]);

        // Step 1 at 0.125 is dispatched by a poll at 0.05 but not yet shown
        rig.clock.advance_seconds(0.05);
        rig.scheduler.poll();
        assert_eq!(rig.scheduler.cursor().position, StepPosition::new(2, 0));
        assert_eq!(rig.visual.steps(), [(0, 0)]);

        rig.clock.advance_seconds(0.075);
        rig.scheduler.poll();
        assert_eq!(rig.visual.steps(), [(0, 0), (1, 0)]);
    }

    #[test]
    fn test_stop_keeps_measure_and_clears_highlight() {
        let rig = rig(RestartPolicy::Rewind);
        rig.store.borrow_mut().add_measure().unwrap();
        rig.scheduler.start();
        run_for(&rig, 4.5);
        assert_eq!(rig.scheduler.cursor().position.measure, 1);

        rig.scheduler.stop();
        assert_eq!(rig.scheduler.cursor().position, StepPosition::new(0, 1));
        assert_eq!(rig.visual.clears(), 1);

        rig.scheduler.start();
        assert_eq!(rig.scheduler.cursor().position, StepPosition::new(0, 0));
    }

    #[test]
    fn test_resume_policy_keeps_measure() {
        let rig = rig(RestartPolicy::Resume);
        rig.store.borrow_mut().add_measure().unwrap();
        rig.scheduler.start();
        run_for(&rig, 4.5);
        rig.scheduler.stop();

        rig.scheduler.start();
        assert_eq!(rig.scheduler.cursor().position, StepPosition::new(0, 1));

        // The measure was removed while stopped
        rig.scheduler.stop();
        rig.store.borrow_mut().remove_measure().unwrap();
        rig.scheduler.start();
        assert_eq!(rig.scheduler.cursor().position, StepPosition::new(0, 0));
    }

    #[test]
    fn test_tempo_change_applies_next_cycle() {
        let rig = rig(RestartPolicy::Rewind);
        let cadence = rig.scheduler.cadence();
        let mut cursor = Cursor::default();
        let lookahead = LookAhead::new(Duration::from_millis(150));

        lookahead.drain(cadence.as_ref(), &mut cursor, 0.0);
        assert_eq!(cursor.next_event_time, 0.25);

        rig.store.borrow_mut().set_bpm(60).unwrap();
        lookahead.drain(cadence.as_ref(), &mut cursor, 0.2);
        assert_eq!(cursor.next_event_time, 0.5);
    }
}
