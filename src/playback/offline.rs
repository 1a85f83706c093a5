//! A tone engine that makes no sound.
//!
//! [`OfflineEngine`] runs on a virtual clock moved by [`OfflineEngine::advance`]
//! and records every note it is asked to play. Cues become due `lookahead`
//! seconds before their time, like a real engine scheduling ahead of the
//! audio it renders.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::EngineError;
use crate::instrument::Sound;
use super::scheduler::{CueId, ToneEngine};
use super::types::Voice;

/// A note call received by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedNote {
    pub voice: Voice,
    pub pitch: u8,
    pub velocity: f32,
    /// Engine time.
    pub at: f64,
    /// `None` for notes left to ring out.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    at: f64,
    offset: f64,
}

#[derive(Debug, Clone)]
pub struct OfflineEngine {
    clock: f64,
    lookahead: f64,
    fail_start: bool,
    started: bool,
    run: Option<Run>,
    cues: Vec<(f64, CueId)>,
    fired: HashSet<CueId>,
    voices: Vec<Sound>,
    notes: Vec<RecordedNote>,
    transport_starts: usize,
    cancels: usize,
}

impl Default for OfflineEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineEngine {
    pub fn new() -> Self {
        Self {
            clock: 0.0,
            lookahead: 0.1,
            fail_start: false,
            started: false,
            run: None,
            cues: Vec::new(),
            fired: HashSet::new(),
            voices: Vec::new(),
            notes: Vec::new(),
            transport_starts: 0,
            cancels: 0,
        }
    }

    /// An engine whose audio never starts.
    pub fn unavailable() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    pub fn with_lookahead(mut self, secs: f64) -> Self {
        self.lookahead = secs;
        self
    }

    /// Move the clock forward.
    pub fn advance(&mut self, secs: f64) {
        self.clock += secs.max(0.0);
    }

    pub fn notes(&self) -> &[RecordedNote] {
        &self.notes
    }

    pub fn take_notes(&mut self) -> Vec<RecordedNote> {
        std::mem::take(&mut self.notes)
    }

    pub fn voices(&self) -> &[Sound] {
        &self.voices
    }

    pub fn cue_count(&self) -> usize {
        self.cues.len()
    }

    pub fn transport_starts(&self) -> usize {
        self.transport_starts
    }

    pub fn cancels(&self) -> usize {
        self.cancels
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }
}

impl ToneEngine for OfflineEngine {
    fn start_audio(&mut self) -> Result<(), EngineError> {
        if self.fail_start {
            return Err(EngineError::Unavailable("no audio output".to_string()));
        }
        self.started = true;
        Ok(())
    }

    fn now(&self) -> f64 {
        self.clock
    }

    fn schedule_at(&mut self, at: f64, cue: CueId) {
        self.cues.push((at, cue));
    }

    fn cancel_all(&mut self) {
        self.cues.clear();
        self.fired.clear();
        self.cancels += 1;
    }

    fn take_due(&mut self) -> Vec<(CueId, f64)> {
        let run = match self.run {
            Some(run) => run,
            None => return Vec::new(),
        };
        let horizon = self.clock + self.lookahead;
        let mut due: Vec<(CueId, f64)> = self
            .cues
            .iter()
            .filter(|(t, id)| {
                *t >= run.offset && run.at + (t - run.offset) <= horizon && !self.fired.contains(id)
            })
            .map(|(t, id)| (*id, *t))
            .collect();
        due.sort_by(|a, b| a.1.total_cmp(&b.1));
        self.fired.extend(due.iter().map(|(id, _)| *id));
        due
    }

    fn transport_start(&mut self, at: f64, offset: f64) {
        self.run = Some(Run { at, offset });
        self.fired.clear();
        self.transport_starts += 1;
    }

    fn transport_stop(&mut self) {
        self.run = None;
    }

    fn transport_position(&self) -> f64 {
        match self.run {
            Some(run) => run.offset + (self.clock - run.at).max(0.0),
            None => 0.0,
        }
    }

    fn note_on(&mut self, voice: Voice, pitch: u8, velocity: f32, at: f64) {
        self.notes.push(RecordedNote {
            voice,
            pitch,
            velocity,
            at,
            duration: None,
        });
    }

    fn note_on_for(&mut self, voice: Voice, pitch: u8, velocity: f32, at: f64, duration: f64) {
        self.notes.push(RecordedNote {
            voice,
            pitch,
            velocity,
            at,
            duration: Some(duration),
        });
    }

    fn set_voices(&mut self, voices: &[Sound]) {
        self.voices = voices.to_vec();
    }
}
