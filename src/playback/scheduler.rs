//! Live playback scheduling
//!
//! [`Scheduler`] drives a [`ToneEngine`]: it plays a count-in, starts the
//! transport and, as the transport advances, hands the engine the notes of
//! each bar. Timing-critical work stays in the engine; the scheduler only
//! registers one cue per bar and dispatches cues the engine reports as due.
//!
//! ## States
//! - `Uninitialized` - audio has not been started
//! - `Unavailable` - the engine could not start audio; playback is disabled
//! - `Idle` - ready, transport stopped
//! - `Playing` - transport running
//!
//! Loading a song bumps a generation counter, so cues registered for an
//! older song are ignored even if the engine still reports them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::instrument::Sound;
use crate::song::Song;
use super::config::SchedulerConfig;
use super::engine::schedule_song;
use super::types::{NoteEvent, PlaybackData, Voice};

/// Handle of a callback registered with [`ToneEngine::schedule_at`].
pub type CueId = u64;

/// The audio side of playback.
///
/// Engine times are seconds on the audio clock. Transport times are seconds
/// from the start of the song.
pub trait ToneEngine {
    /// Start audio output. May fail, e.g. when no output device exists.
    fn start_audio(&mut self) -> Result<(), EngineError>;

    /// Current audio clock.
    fn now(&self) -> f64;

    /// Register a cue at a transport time.
    fn schedule_at(&mut self, at: f64, cue: CueId);

    /// Forget every registered cue.
    fn cancel_all(&mut self);

    /// Cues whose transport time has come, with that time. A cue is reported
    /// once per transport run.
    fn take_due(&mut self) -> Vec<(CueId, f64)>;

    /// Start the transport at engine time `at`, from transport time `offset`.
    fn transport_start(&mut self, at: f64, offset: f64);

    fn transport_stop(&mut self);

    fn transport_position(&self) -> f64;

    /// Trigger a note and let it ring out.
    fn note_on(&mut self, voice: Voice, pitch: u8, velocity: f32, at: f64);

    /// Trigger a note for a fixed duration.
    fn note_on_for(&mut self, voice: Voice, pitch: u8, velocity: f32, at: f64, duration: f64);

    /// Sounds of the instrument tracks of the loaded song.
    fn set_voices(&mut self, _voices: &[Sound]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Unavailable,
    Idle,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CueKind {
    Metronome,
    Tracks,
}

#[derive(Debug, Clone, Copy)]
struct Cue {
    generation: u64,
    kind: CueKind,
    bar: usize,
}

struct Loaded {
    song: Arc<Song>,
    data: PlaybackData,
    /// Event indices of each bar.
    by_bar: Vec<Vec<usize>>,
}

impl Loaded {
    fn new(song: Arc<Song>, config: &SchedulerConfig) -> Self {
        let data = schedule_song(&song, config);
        let mut by_bar = vec![Vec::new(); data.timeline.bars.len()];
        for (i, event) in data.events.iter().enumerate() {
            if let Some(list) = by_bar.get_mut(event.bar) {
                list.push(i);
            }
        }
        Self { song, data, by_bar }
    }
}

pub struct Scheduler<E: ToneEngine> {
    engine: E,
    config: SchedulerConfig,
    state: SchedulerState,
    loaded: Option<Loaded>,
    generation: u64,
    next_cue: CueId,
    cues: HashMap<CueId, Cue>,
    /// Engine time of transport time zero for the current run.
    origin: f64,
    metronome_muted: bool,
    playback_muted: bool,
}

impl<E: ToneEngine> Scheduler<E> {
    pub fn new(engine: E, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            state: SchedulerState::Uninitialized,
            loaded: None,
            generation: 0,
            next_cue: 0,
            cues: HashMap::new(),
            origin: 0.0,
            metronome_muted: false,
            playback_muted: false,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SchedulerState::Playing
    }

    pub fn song(&self) -> Option<&Arc<Song>> {
        self.loaded.as_ref().map(|l| &l.song)
    }

    pub fn playback_data(&self) -> Option<&PlaybackData> {
        self.loaded.as_ref().map(|l| &l.data)
    }

    /// Start audio. Failure is not fatal: the scheduler becomes
    /// `Unavailable` and a later call retries.
    pub fn init(&mut self) -> SchedulerState {
        match self.state {
            SchedulerState::Idle | SchedulerState::Playing => return self.state,
            SchedulerState::Uninitialized | SchedulerState::Unavailable => {}
        }
        match self.engine.start_audio() {
            Ok(()) => {
                debug!("audio engine started");
                self.state = SchedulerState::Idle;
                self.register_cues();
            }
            Err(e) => {
                warn!("playback disabled: {}", e);
                self.state = SchedulerState::Unavailable;
            }
        }
        self.state
    }

    /// Make `song` the song to play. Loading the song already loaded does
    /// nothing; otherwise playback stops and the old song's cues are dropped.
    pub fn load_song(&mut self, song: Arc<Song>) {
        if let Some(loaded) = &self.loaded {
            if Arc::ptr_eq(&loaded.song, &song) {
                return;
            }
        }
        self.stop();
        self.dispose();
        let loaded = Loaded::new(song, &self.config);
        debug!(
            bars = loaded.data.timeline.bars.len(),
            events = loaded.data.events.len(),
            "song loaded"
        );
        self.loaded = Some(loaded);
        self.register_cues();
    }

    fn dispose(&mut self) {
        self.generation += 1;
        self.cues.clear();
        if self.engine_ready() {
            self.engine.cancel_all();
        }
    }

    fn engine_ready(&self) -> bool {
        matches!(self.state, SchedulerState::Idle | SchedulerState::Playing)
    }

    fn register_cues(&mut self) {
        if !self.engine_ready() {
            return;
        }
        let loaded = match &self.loaded {
            Some(loaded) => loaded,
            None => return,
        };
        self.engine.set_voices(&loaded.data.voices);
        for timing in &loaded.data.timeline.bars {
            for kind in [CueKind::Metronome, CueKind::Tracks] {
                let id = self.next_cue;
                self.next_cue += 1;
                self.cues.insert(
                    id,
                    Cue {
                        generation: self.generation,
                        kind,
                        bar: timing.index,
                    },
                );
                self.engine.schedule_at(timing.start, id);
            }
        }
    }

    /// Start playing from `resume_at_ms` into the song, after a metronome
    /// count-in. Does nothing when already playing.
    pub fn play(&mut self, resume_at_ms: f64) -> Result<(), EngineError> {
        match self.state {
            SchedulerState::Playing => return Ok(()),
            SchedulerState::Uninitialized => return Err(EngineError::NotInitialized),
            SchedulerState::Unavailable => {
                return Err(EngineError::Unavailable("audio could not be started".to_string()))
            }
            SchedulerState::Idle => {}
        }
        let loaded = self.loaded.as_ref().ok_or(EngineError::NoSong)?;
        let duration = loaded.data.duration();
        let offset = (resume_at_ms / 1000.0).clamp(0.0, duration);
        let first = loaded
            .data
            .timeline
            .bar_at(offset)
            .and_then(|i| loaded.data.timeline.bars.get(i))
            .cloned();

        let mut start = self.engine.now() + self.config.lookahead();
        if let Some(bar) = &first {
            let beats = bar.beats.max(1);
            let beat_secs = bar.beat_secs();
            let count = beats * self.config.count_in_bars;
            for beat in 0..count {
                let pitch = if beat % beats == 0 {
                    self.config.metronome_high
                } else {
                    self.config.metronome_low
                };
                let at = start + beat as f64 * beat_secs;
                self.engine
                    .note_on(Voice::Metronome, pitch, self.config.metronome_velocity, at);
            }
            start += count as f64 * beat_secs;
        }

        self.engine.transport_start(start, offset);
        self.origin = start - offset;
        self.state = SchedulerState::Playing;
        info!(offset, "playback started");

        // the bar under the resume point started before the transport did
        if let Some(bar) = first {
            if bar.start < offset {
                self.dispatch_bar(bar.index, Some(offset));
            }
        }
        Ok(())
    }

    /// Stop the transport. Notes already handed to the engine still sound.
    pub fn stop(&mut self) {
        if self.state != SchedulerState::Playing {
            return;
        }
        self.engine.transport_stop();
        self.state = SchedulerState::Idle;
        info!("playback stopped");
    }

    /// Dispatch every cue the engine reports as due. Stops at the song end.
    /// Returns the number of cues dispatched.
    pub fn pump(&mut self) -> usize {
        if !self.is_playing() {
            return 0;
        }
        let mut dispatched = 0;
        for (id, _) in self.engine.take_due() {
            let cue = match self.cues.get(&id) {
                Some(cue) if cue.generation == self.generation => *cue,
                _ => continue,
            };
            match cue.kind {
                CueKind::Metronome => self.dispatch_metronome(cue.bar),
                CueKind::Tracks => self.dispatch_bar(cue.bar, None),
            }
            dispatched += 1;
        }
        let finished = self
            .loaded
            .as_ref()
            .map(|l| self.engine.transport_position() >= l.data.duration())
            .unwrap_or(true);
        if finished {
            self.stop();
        }
        dispatched
    }

    fn bar_events(&self, bar: usize) -> impl Iterator<Item = &NoteEvent> + '_ {
        let loaded = self.loaded.as_ref();
        loaded
            .and_then(|l| l.by_bar.get(bar))
            .into_iter()
            .flatten()
            .filter_map(move |i| loaded.and_then(|l| l.data.events.get(*i)))
    }

    fn dispatch_metronome(&mut self, bar: usize) {
        if self.metronome_muted {
            return;
        }
        let notes: Vec<NoteEvent> = self
            .bar_events(bar)
            .filter(|e| e.voice == Voice::Metronome)
            .cloned()
            .collect();
        self.send(notes);
    }

    fn dispatch_bar(&mut self, bar: usize, from: Option<f64>) {
        let notes: Vec<NoteEvent> = self
            .bar_events(bar)
            .filter(|e| match e.voice {
                Voice::Metronome => from.is_some() && !self.metronome_muted,
                Voice::Track(_) => !self.playback_muted,
            })
            .filter(|e| from.map(|t| e.time >= t).unwrap_or(true))
            .cloned()
            .collect();
        self.send(notes);
    }

    fn send(&mut self, notes: Vec<NoteEvent>) {
        for note in notes {
            self.engine.note_on_for(
                note.voice,
                note.pitch,
                note.velocity,
                self.origin + note.time,
                note.duration,
            );
        }
    }

    /// Mute state is read when a bar is dispatched, so it takes effect from
    /// the next bar.
    pub fn set_metronome_muted(&mut self, muted: bool) {
        self.metronome_muted = muted;
    }

    pub fn set_playback_muted(&mut self, muted: bool) {
        self.playback_muted = muted;
    }

    pub fn metronome_muted(&self) -> bool {
        self.metronome_muted
    }

    pub fn playback_muted(&self) -> bool {
        self.playback_muted
    }

    /// Bar under the transport, while playing.
    pub fn active_bar(&self) -> Option<usize> {
        if !self.is_playing() {
            return None;
        }
        let loaded = self.loaded.as_ref()?;
        loaded.data.timeline.bar_at(self.engine.transport_position())
    }

    pub fn position_ms(&self) -> f64 {
        if !self.is_playing() {
            return 0.0;
        }
        self.engine.transport_position() * 1000.0
    }
}
