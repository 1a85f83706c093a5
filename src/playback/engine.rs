//! Note event generation
//!
//! Converts a song into timed note events. Everything here is pure: the same
//! song and settings always produce the same events, so the scheduler can
//! compute a song once and replay it from any position.

use crate::bar::Bar;
use crate::chord::Chord;
use crate::error::SheetError;
use crate::parser::parse;
use crate::pattern::Strum;
use crate::song::Song;
use super::config::SchedulerConfig;
use super::types::{BarTiming, NoteEvent, PlaybackData, Timeline, Voice};

/// Shortest note the engine emits.
const MIN_DURATION: f64 = 0.01;

/// Start time and length of every bar in playing order.
///
/// Bar length comes from the bar's own tempo and time signature, so tempo
/// changes inside a song move every later bar.
pub fn timeline(song: &Song) -> Timeline {
    let mut start = 0.0;
    let bars = song
        .bars()
        .enumerate()
        .map(|(index, bar)| {
            let duration = bar.duration_secs();
            let timing = BarTiming {
                index,
                start,
                duration,
                beats: bar.time.beats,
                tempo: bar.tempo,
            };
            start += duration;
            timing
        })
        .collect();
    Timeline { bars }
}

/// One click per beat, accented on the first.
pub fn metronome_events(timing: &BarTiming, config: &SchedulerConfig) -> Vec<NoteEvent> {
    let beat_secs = timing.beat_secs();
    (0..timing.beats.max(1))
        .map(|beat| NoteEvent {
            voice: Voice::Metronome,
            pitch: if beat == 0 {
                config.metronome_high
            } else {
                config.metronome_low
            },
            velocity: config.metronome_velocity,
            time: timing.start + beat as f64 * beat_secs,
            duration: config.click_secs().min(beat_secs),
            bar: timing.index,
        })
        .collect()
}

/// Bars without a pattern are strummed down once per beat.
fn default_strums(bar: &Bar) -> Vec<Strum> {
    vec![Strum::Down { emphasis: false }; bar.time.beats as usize]
}

/// Chord sounding at each strum slot, starting from the chord carried in
/// from earlier bars. Returns the chord still sounding at the bar end too.
fn active_chords(bar: &Bar, slots: usize, carried: Option<Chord>) -> (Vec<Option<Chord>>, Option<Chord>) {
    let bar_ticks = bar.time.bar_ticks() as f64;
    let starts = bar.onset_ticks();
    let mut onsets = starts.iter().zip(&bar.chords).peekable();
    let mut active = carried;
    let mut per_slot = Vec::with_capacity(slots);
    for slot in 0..slots {
        let tick = slot as f64 * bar_ticks / slots as f64;
        while let Some((start, chord)) = onsets.peek() {
            if **start as f64 > tick {
                break;
            }
            if let Some(chord) = chord {
                active = Some(*chord);
            }
            onsets.next();
        }
        per_slot.push(active);
    }
    for (_, chord) in onsets {
        if let Some(chord) = chord {
            active = Some(*chord);
        }
    }
    (per_slot, active)
}

/// Note events of one instrument track in one bar.
///
/// `carried` is the chord left sounding by the previous bar; it is updated to
/// the chord sounding at the end of this bar, whether or not the track plays.
///
/// # Strum timing
/// - down: strings lowest first, `strum-spread-ms` apart
/// - up: the same, highest string first
/// - arpeggio: strings spread evenly over the strum slot
/// - tremolo: the chord at the slot start, again at half velocity mid-slot
/// - pluck and tab: only the given strings, together
/// - percussion: the chord, short and quiet
/// - pause and rest: nothing
///
/// Notes ring until the next strum that is not a pause, or the bar end.
pub fn bar_events(
    song: &Song,
    bar: &Bar,
    timing: &BarTiming,
    track: usize,
    carried: &mut Option<Chord>,
    config: &SchedulerConfig,
) -> Vec<NoteEvent> {
    let strums = match bar.strums(track) {
        Some(strums) => strums.to_vec(),
        None if bar.is_played_by(track) => default_strums(bar),
        None => Vec::new(),
    };
    let (chords, at_end) = active_chords(bar, strums.len(), *carried);
    *carried = at_end;

    let mut events = Vec::new();
    let instrument = match song.instruments.get(track) {
        Some(instrument) => instrument,
        None => return events,
    };
    if strums.is_empty() {
        return events;
    }
    let lib = instrument.chord_lib();
    let slot_secs = timing.duration / strums.len() as f64;
    let slot_start = |i: usize| timing.start + i as f64 * slot_secs;

    let mut push = |pitch: u8, velocity: f32, time: f64, until: f64| {
        events.push(NoteEvent {
            voice: Voice::Track(track),
            pitch,
            velocity,
            time,
            duration: (until - time).max(MIN_DURATION),
            bar: timing.index,
        });
    };

    for (i, strum) in strums.iter().enumerate() {
        let at = slot_start(i);
        let until = strums[i + 1..]
            .iter()
            .position(|s| *s != Strum::Pause)
            .map(|j| slot_start(i + 1 + j))
            .unwrap_or_else(|| timing.end());
        let velocity = match strum {
            Strum::Down { emphasis: true } | Strum::Up { emphasis: true } => config.accent_velocity,
            _ => config.velocity,
        };

        if let Strum::Tab(frets) = strum {
            for (_, pitch) in lib.sounding_pitches(frets) {
                push(pitch.midi(), velocity, at, until);
            }
            continue;
        }
        if !strum.is_attack() {
            continue;
        }
        let chord = match chords[i] {
            Some(chord) => chord,
            None => continue,
        };
        let pitches = lib.sounding_pitches(&lib.get_frets(&chord));

        match strum {
            Strum::Down { .. } => {
                for (k, (_, pitch)) in pitches.iter().enumerate() {
                    push(pitch.midi(), velocity, at + k as f64 * config.strum_spread(), until);
                }
            }
            Strum::Up { .. } => {
                for (k, (_, pitch)) in pitches.iter().rev().enumerate() {
                    push(pitch.midi(), velocity, at + k as f64 * config.strum_spread(), until);
                }
            }
            Strum::Arpeggio => {
                let step = slot_secs / pitches.len().max(1) as f64;
                for (k, (_, pitch)) in pitches.iter().enumerate() {
                    push(pitch.midi(), velocity, at + k as f64 * step, until);
                }
            }
            Strum::Tremolo => {
                let mid = at + slot_secs / 2.0;
                for (_, pitch) in &pitches {
                    push(pitch.midi(), velocity, at, mid);
                }
                for (_, pitch) in &pitches {
                    push(pitch.midi(), velocity / 2.0, mid, until);
                }
            }
            Strum::Pluck(strings) => {
                for (_, pitch) in pitches.iter().filter(|(s, _)| strings.contains(s)) {
                    push(pitch.midi(), velocity, at, until);
                }
            }
            Strum::Percussion => {
                let end = (at + config.percussion_secs()).min(until);
                for (_, pitch) in &pitches {
                    push(pitch.midi(), config.percussion_velocity, at, end);
                }
            }
            Strum::Pause | Strum::Rest | Strum::Tab(_) => {}
        }
    }
    events
}

/// Every event of a song, metronome included, sorted by time.
pub fn schedule_song(song: &Song, config: &SchedulerConfig) -> PlaybackData {
    let timeline = timeline(song);
    let mut carried: Vec<Option<Chord>> = vec![None; song.instruments.len()];
    let mut events = Vec::new();

    for (bar, timing) in song.bars().zip(&timeline.bars) {
        events.extend(metronome_events(timing, config));
        for (track, carried) in carried.iter_mut().enumerate() {
            events.extend(bar_events(song, bar, timing, track, carried, config));
        }
    }
    events.sort_by(|a, b| a.time.total_cmp(&b.time));

    PlaybackData {
        title: song.title().map(|t| t.trim().to_string()),
        tempo: song.tempo(),
        voices: song.instruments.iter().map(|i| i.sound).collect(),
        timeline,
        events,
    }
}

/// Parse song sheet text and compute its playback data.
pub fn generate_playback_data(source: &str, config: &SchedulerConfig) -> Result<PlaybackData, SheetError> {
    let song = parse(source)?;
    Ok(schedule_song(&song, config))
}
