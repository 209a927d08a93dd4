// Drum machine - Wires the pattern store, both schedulers, sinks and library
// This is the surface a UI drives

use crate::config::{ConfigError, EngineConfig};
use crate::library::{LibraryError, PatternLibrary, PatternSnapshot};
use crate::messaging::channels::{self, NotificationConsumer, NotificationProducer};
use crate::messaging::{Notification, NotificationCategory};
use crate::render::{RenderSink, SoundSource, SourceRouter, VisualSync};
use crate::sequencer::scheduler::{Drive, Scheduler, SchedulerState};
use crate::sequencer::{
    Metronome, Pattern, PatternCadence, PatternError, PatternScheduler, PatternStore,
    TimeSignature, Track, TransportClock,
};
use std::cell::{Ref, RefCell};
use std::rc::Rc;

/// Drum machine facade
///
/// Pattern edits go through here so limit violations reach the user as
/// notifications and new steps are auditioned.
pub struct DrumMachine {
    store: Rc<RefCell<PatternStore>>,
    clock: TransportClock,
    router: Rc<SourceRouter>,
    player: PatternScheduler,
    metronome: Metronome,
    library: PatternLibrary,
    notifications: RefCell<NotificationProducer>,
}

impl DrumMachine {
    /// Build a machine whose schedulers poll on the configured interval
    ///
    /// `play` and the metronome's `start` must then run inside a tokio
    /// `LocalSet`.
    pub fn new(
        config: &EngineConfig,
        clock: TransportClock,
        router: SourceRouter,
        visual: Rc<dyn VisualSync>,
        library: PatternLibrary,
    ) -> Result<(Self, NotificationConsumer), ConfigError> {
        Self::with_drive(config, config.scheduler.drive(), clock, router, visual, library)
    }

    /// Build a machine with an explicit poll drive
    ///
    /// The config is validated first, so one built in code gets the same
    /// checks as one loaded from disk.
    pub fn with_drive(
        config: &EngineConfig,
        drive: Drive,
        clock: TransportClock,
        router: SourceRouter,
        visual: Rc<dyn VisualSync>,
        library: PatternLibrary,
    ) -> Result<(Self, NotificationConsumer), ConfigError> {
        config.validate()?;

        let kit = Pattern::default_kit();
        let pattern = Pattern::from_parts(
            config.bpm,
            config.time_signature,
            config.total_measures,
            kit.tracks().to_vec(),
        );
        let store = Rc::new(RefCell::new(PatternStore::new(pattern)));

        router.set_mode(config.sound_source);
        let router = Rc::new(router);
        let sink: Rc<dyn RenderSink> = router.clone();

        let cadence = PatternCadence::new(store.clone(), sink.clone(), visual.clone())
            .with_restart_policy(config.scheduler.on_restart);
        let lookahead = config.scheduler.lookahead();
        let player = Scheduler::new(Rc::new(cadence), clock.clone(), lookahead, drive);
        let metronome = Metronome::new(config.metronome, sink, visual, clock.clone(), lookahead, drive);

        let (tx, rx) = channels::create_notification_channel(config.notification_capacity);

        let machine = Self {
            store,
            clock,
            router,
            player,
            metronome,
            library,
            notifications: RefCell::new(tx),
        };
        Ok((machine, rx))
    }

    /// Read access to the live pattern
    pub fn store(&self) -> Ref<'_, PatternStore> {
        self.store.borrow()
    }

    pub fn player(&self) -> &PatternScheduler {
        &self.player
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    // --- Pattern editing ---

    /// Append a track; an empty name falls back to the instrument id
    pub fn add_track(&self, instrument_id: &str, display_name: &str) -> usize {
        self.store.borrow_mut().add_track(instrument_id, display_name)
    }

    pub fn remove_track(&self, index: usize) -> Result<Track, PatternError> {
        let result = self.store.borrow_mut().remove_track(index);
        self.report(NotificationCategory::Pattern, result)
    }

    /// Set a track's volume and preview it at the new level
    pub fn set_volume(&self, index: usize, level: u8) -> Result<(), PatternError> {
        let result = self.store.borrow_mut().set_volume(index, level);
        self.report(NotificationCategory::Pattern, result)?;
        self.audition(index);
        Ok(())
    }

    /// Flip a step; a step turned on is auditioned once, right now
    pub fn toggle_step(
        &self,
        track_index: usize,
        measure: usize,
        step: usize,
    ) -> Result<bool, PatternError> {
        let result = self
            .store
            .borrow_mut()
            .toggle_step(track_index, measure, step);
        let active = self.report(NotificationCategory::Pattern, result)?;
        if active {
            self.audition(track_index);
        }
        Ok(active)
    }

    pub fn set_time_signature(&self, time_signature: TimeSignature) {
        self.store.borrow_mut().set_time_signature(time_signature);
    }

    pub fn set_bpm(&self, bpm: u32) -> Result<(), PatternError> {
        let result = self.store.borrow_mut().set_bpm(bpm);
        self.report(NotificationCategory::Pattern, result)
    }

    pub fn add_measure(&self) -> Result<usize, PatternError> {
        let result = self.store.borrow_mut().add_measure();
        self.report(NotificationCategory::Pattern, result)
    }

    pub fn remove_measure(&self) -> Result<usize, PatternError> {
        let result = self.store.borrow_mut().remove_measure();
        self.report(NotificationCategory::Pattern, result)
    }

    pub fn view_measure(&self, delta: isize) -> bool {
        self.store.borrow_mut().view_measure(delta)
    }

    pub fn clear_steps(&self) {
        self.store.borrow_mut().clear_steps();
    }

    pub fn sound_source(&self) -> SoundSource {
        self.router.mode()
    }

    pub fn set_sound_source(&self, source: SoundSource) {
        self.router.set_mode(source);
    }

    // --- Transport ---

    /// Start the pattern; a start before the clock is up is queued
    ///
    /// # Panics
    ///
    /// With [`Drive::Interval`] this must be called inside a tokio
    /// `LocalSet`, see [`Scheduler::start`].
    pub fn play(&self) -> SchedulerState {
        let state = self.player.start();
        if state == SchedulerState::Pending {
            self.notify(Notification::info(
                NotificationCategory::Playback,
                "Waiting for audio to start",
            ));
        }
        state
    }

    pub fn stop(&self) {
        self.player.stop();
    }

    pub fn toggle_play(&self) -> SchedulerState {
        self.player.toggle()
    }

    /// Poll both schedulers once (for hosts using [`Drive::Manual`])
    pub fn poll(&self) -> usize {
        self.player.poll() + self.metronome.poll()
    }

    // --- Library ---

    /// Save the current pattern; returns its library id
    pub fn save_pattern(&self, name: &str) -> Result<u64, LibraryError> {
        let result = self.library.save(name, self.store.borrow().pattern());
        let id = self.report(NotificationCategory::Library, result)?;
        self.notify(Notification::info(NotificationCategory::Library, "Saved!"));
        Ok(id)
    }

    pub fn list_patterns(&self) -> Result<Vec<PatternSnapshot>, LibraryError> {
        let result = self.library.list();
        self.report(NotificationCategory::Library, result)
    }

    /// Replace the live pattern with a saved one
    pub fn load_pattern(&self, id: u64) -> Result<(), LibraryError> {
        let result = self
            .library
            .load(id)
            .and_then(|snapshot| snapshot.to_pattern());
        let pattern = self.report(NotificationCategory::Library, result)?;
        self.store.borrow_mut().replace(pattern);
        tracing::info!(id, "Pattern loaded");
        Ok(())
    }

    pub fn delete_pattern(&self, id: u64) -> Result<(), LibraryError> {
        let result = self.library.delete(id);
        self.report(NotificationCategory::Library, result)
    }

    fn audition(&self, track_index: usize) {
        let Some(now) = self.clock.now() else {
            tracing::debug!("Clock not ready, audition skipped");
            return;
        };
        let hit = self
            .store
            .borrow()
            .tracks()
            .get(track_index)
            .map(|t| (t.instrument_id.clone(), t.gain()));
        if let Some((instrument, gain)) = hit {
            if let Err(e) = self.router.render(&instrument, now, gain) {
                tracing::warn!(instrument = %instrument, error = %e, "Audition failed");
                self.notify(Notification::warning(NotificationCategory::Audio, e.to_string()));
            }
        }
    }

    fn report<T, E: std::fmt::Display>(
        &self,
        category: NotificationCategory,
        result: Result<T, E>,
    ) -> Result<T, E> {
        if let Err(e) = &result {
            let notification = match category {
                NotificationCategory::Pattern => Notification::warning(category, e.to_string()),
                _ => Notification::error(category, e.to_string()),
            };
            self.notify(notification);
        }
        result
    }

    fn notify(&self, notification: Notification) {
        channels::notify(&mut self.notifications.borrow_mut(), notification);
    }
}

impl std::fmt::Debug for DrumMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrumMachine")
            .field("player", &self.player)
            .field("metronome", &self.metronome)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
