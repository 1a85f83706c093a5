use std::sync::Arc;

use super::*;
use crate::error::EngineError;
use crate::parser::parse;

const EPS: f64 = 1e-9;

fn data(source: &str) -> PlaybackData {
    generate_playback_data(source, &SchedulerConfig::default()).unwrap()
}

fn track_events(data: &PlaybackData, track: usize) -> Vec<NoteEvent> {
    data.events
        .iter()
        .filter(|e| e.voice == Voice::Track(track))
        .cloned()
        .collect()
}

fn pitches_at(events: &[NoteEvent], from: f64, to: f64) -> Vec<u8> {
    events
        .iter()
        .filter(|e| e.time >= from - EPS && e.time < to - EPS)
        .map(|e| e.pitch)
        .collect()
}

#[test]
fn test_playback_timeline() {
    let data = data("{tempo: 60}\n[C][G]\n{soc}\n{tempo: 120}\n[Am]\n{eoc}");
    let starts: Vec<f64> = data.timeline.bars.iter().map(|b| b.start).collect();
    assert_eq!(starts, vec![0.0, 4.0, 8.0]);
    assert_eq!(data.duration(), 10.0);
    assert_eq!(data.timeline.bars[0].beat_secs(), 1.0);
    assert_eq!(data.timeline.bars[2].beat_secs(), 0.5);

    assert_eq!(data.timeline.bar_at(0.0), Some(0));
    assert_eq!(data.timeline.bar_at(5.0), Some(1));
    assert_eq!(data.timeline.bar_at(9.99), Some(2));
    assert_eq!(data.timeline.bar_at(10.0), None);
}

#[test]
fn test_playback_default_strum() {
    let data = data("[C]");
    let events = track_events(&data, 0);

    // four down strums of the four ukulele strings
    assert_eq!(events.len(), 16);
    let first: Vec<u8> = events[..4].iter().map(|e| e.pitch).collect();
    assert_eq!(first, vec![67, 60, 64, 72]);

    // strings 15ms apart, ringing to the next strum
    assert!((events[1].time - 0.015).abs() < EPS);
    assert!((events[3].time - 0.045).abs() < EPS);
    assert!((events[0].duration - 0.5).abs() < EPS);
    assert!((events[4].time - 0.5).abs() < EPS);
}

#[test]
fn test_playback_up_strum_reverses() {
    let data = data("{pattern: |uuuu|}\n[C]");
    let events = track_events(&data, 0);
    let first: Vec<u8> = events[..4].iter().map(|e| e.pitch).collect();
    assert_eq!(first, vec![72, 64, 60, 67]);
}

#[test]
fn test_playback_bars_before_first_pattern_keep_default_strum() {
    let events = track_events(&data("[C]\n{pattern: |uuuu|}\n[C]"), 0);
    assert_eq!(events.len(), 32);
    // second beat of the first bar is still a down strum
    assert_eq!(pitches_at(&events, 0.5, 0.6), vec![67, 60, 64, 72]);
    assert_eq!(pitches_at(&events, 2.0, 2.1), vec![72, 64, 60, 67]);
}

#[test]
fn test_playback_pause_rings_and_rest_stops() {
    let ringing = track_events(&data("{pattern: |d---|}\n[C]"), 0);
    assert_eq!(ringing.len(), 4);
    // bar is 2s at the default tempo
    assert!((ringing[0].duration - 2.0).abs() < EPS);

    let stopped = track_events(&data("{pattern: |d.d.|}\n[C]"), 0);
    assert_eq!(stopped.len(), 8);
    assert!((stopped[0].duration - 0.5).abs() < EPS);
}

#[test]
fn test_playback_chord_changes_mid_bar() {
    let events = track_events(&data("{pattern: |dudu|}\n[C..][Am..]"), 0);
    assert_eq!(pitches_at(&events, 0.0, 0.1), vec![67, 60, 64, 72]);
    // Am on the third strum
    assert_eq!(pitches_at(&events, 1.0, 1.1), vec![69, 60, 64, 69]);
}

#[test]
fn test_playback_chord_carries_into_next_bar() {
    let data = data("[C][....]");
    let second: Vec<NoteEvent> = track_events(&data, 0)
        .into_iter()
        .filter(|e| e.bar == 1)
        .collect();
    assert_eq!(second.len(), 16);
    assert_eq!(second[0].pitch, 67);
    assert_eq!(second[3].pitch, 72);
}

#[test]
fn test_playback_no_chord_is_silent() {
    let data = data("[....]");
    assert!(track_events(&data, 0).is_empty());
    // the metronome still clicks
    assert_eq!(data.events.len(), 4);
}

#[test]
fn test_playback_arpeggio_and_tremolo() {
    let arpeggio = track_events(&data("{pattern: |a---|}\n[C]"), 0);
    let times: Vec<f64> = arpeggio.iter().map(|e| e.time).collect();
    assert_eq!(times, vec![0.0, 0.125, 0.25, 0.375]);

    let tremolo = track_events(&data("{pattern: |tttt|}\n[C]"), 0);
    assert_eq!(tremolo.len(), 32);
    let second_hit: Vec<&NoteEvent> = tremolo
        .iter()
        .filter(|e| (e.time - 0.25).abs() < EPS)
        .collect();
    assert_eq!(second_hit.len(), 4);
    assert!((second_hit[0].velocity - 0.35).abs() < 1e-6);
    assert!((tremolo[0].duration - 0.25).abs() < EPS);
}

#[test]
fn test_playback_pluck_and_tab() {
    let plucked = track_events(&data("{pattern: |1-3-|}\n[C]"), 0);
    let notes: Vec<(u8, f64)> = plucked.iter().map(|e| (e.pitch, e.time)).collect();
    assert_eq!(notes, vec![(67, 0.0), (64, 1.0)]);

    let tab = track_events(
        &data("{start_of_tab}\n|0-2-|\n|----|\n|----|\n|3---|\n{end_of_tab}\n[C]"),
        0,
    );
    let notes: Vec<(u8, f64)> = tab.iter().map(|e| (e.pitch, e.time)).collect();
    assert_eq!(notes, vec![(70, 0.0), (69, 0.0), (71, 1.0)]);
    assert!((tab[0].duration - 1.0).abs() < EPS);
}

#[test]
fn test_playback_percussion_and_accent() {
    let config = SchedulerConfig::default();
    let chops = track_events(&data("{pattern: |xxxx|}\n[C]"), 0);
    assert!(chops.iter().all(|e| (e.duration - 0.04).abs() < EPS));
    assert!(chops.iter().all(|e| e.velocity == config.percussion_velocity));

    let accented = track_events(&data("{pattern: |Dudu|}\n[C]"), 0);
    assert_eq!(accented[0].velocity, config.accent_velocity);
    assert_eq!(accented[4].velocity, config.velocity);
}

#[test]
fn test_playback_metronome() {
    let data = data("{time: 3/4}\n[C]");
    let clicks: Vec<u8> = data
        .events
        .iter()
        .filter(|e| e.voice == Voice::Metronome)
        .map(|e| e.pitch)
        .collect();
    assert_eq!(clicks, vec![84, 77, 77]);
}

#[test]
fn test_playback_instrument_tracks() {
    let data = data(concat!(
        "{instrument: Uke ukulele}\n",
        "{instrument: Bass bass}\n",
        "{pattern: |dddd|}\n",
        "{pattern-Bass: |1---|}\n",
        "[C]"
    ));
    assert_eq!(data.voices, vec![crate::instrument::Sound::Ukulele, crate::instrument::Sound::Bass]);
    let bass = track_events(&data, 1);
    // open E1 is the lowest chord tone of C on the bass
    assert_eq!(bass.len(), 1);
    assert_eq!(bass[0].pitch, 28);
    assert_eq!(track_events(&data, 0).len(), 16);
}

#[test]
fn test_playback_events_sorted() {
    let data = data("{pattern: |D-du|d-Du|}\n[C][G7][Am][F]");
    assert!(data.events.windows(2).all(|w| w[0].time <= w[1].time));
}

fn scheduler(source: &str) -> (Scheduler<OfflineEngine>, Arc<crate::song::Song>) {
    let song = Arc::new(parse(source).unwrap());
    let mut scheduler = Scheduler::new(OfflineEngine::new(), SchedulerConfig::default());
    assert_eq!(scheduler.init(), SchedulerState::Idle);
    scheduler.load_song(Arc::clone(&song));
    (scheduler, song)
}

fn timed_notes(scheduler: &Scheduler<OfflineEngine>) -> Vec<RecordedNote> {
    scheduler
        .engine()
        .notes()
        .iter()
        .filter(|n| n.duration.is_some())
        .cloned()
        .collect()
}

#[test]
fn test_scheduler_count_in_then_bars() {
    let (mut scheduler, _) = scheduler("[C][G]");
    assert_eq!(scheduler.engine().cue_count(), 4);

    scheduler.play(0.0).unwrap();
    assert!(scheduler.is_playing());

    // one bar of count-in, starting after the lookahead
    let count_in: Vec<(u8, f64)> = scheduler
        .engine()
        .notes()
        .iter()
        .map(|n| (n.pitch, n.at))
        .collect();
    assert_eq!(count_in.len(), 4);
    assert_eq!(count_in[0].0, 84);
    assert!((count_in[3].1 - 1.6).abs() < EPS);

    assert_eq!(scheduler.pump(), 0);

    scheduler.engine_mut().advance(2.05);
    assert_eq!(scheduler.pump(), 2);
    let notes = timed_notes(&scheduler);
    // four clicks and sixteen strings
    assert_eq!(notes.len(), 20);
    assert!(notes.iter().all(|n| n.at >= 2.1 - EPS));
    assert_eq!(scheduler.active_bar(), Some(0));

    scheduler.engine_mut().advance(2.0);
    assert_eq!(scheduler.pump(), 2);
    assert_eq!(scheduler.active_bar(), Some(0));
    scheduler.engine_mut().advance(0.5);
    assert_eq!(scheduler.active_bar(), Some(1));
    assert!((scheduler.position_ms() - 2450.0).abs() < 1e-6);

    scheduler.engine_mut().advance(2.0);
    scheduler.pump();
    assert!(!scheduler.is_playing());
    assert_eq!(scheduler.active_bar(), None);
}

#[test]
fn test_scheduler_play_and_stop_are_idempotent() {
    let (mut scheduler, song) = scheduler("[C]");
    scheduler.play(0.0).unwrap();
    scheduler.play(0.0).unwrap();
    assert_eq!(scheduler.engine().transport_starts(), 1);
    assert_eq!(scheduler.engine().notes().len(), 4);

    scheduler.stop();
    scheduler.stop();
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    // reloading the same song keeps its cues
    let cancels = scheduler.engine().cancels();
    scheduler.load_song(song);
    assert_eq!(scheduler.engine().cancels(), cancels);
    assert_eq!(scheduler.engine().cue_count(), 2);
}

#[test]
fn test_scheduler_new_song_drops_old_cues() {
    let (mut scheduler, _) = scheduler("[C][C]");
    scheduler.play(0.0).unwrap();
    scheduler.engine_mut().advance(2.05);
    scheduler.pump();

    scheduler.load_song(Arc::new(parse("[Am]").unwrap()));
    assert!(!scheduler.is_playing());
    assert_eq!(scheduler.engine().cue_count(), 2);
    scheduler.engine_mut().take_notes();

    scheduler.play(0.0).unwrap();
    scheduler.engine_mut().advance(10.0);
    scheduler.pump();
    let pitches: Vec<u8> = timed_notes(&scheduler)
        .iter()
        .filter(|n| n.voice == Voice::Track(0))
        .map(|n| n.pitch)
        .collect();
    assert_eq!(pitches.len(), 16);
    // nothing from the C bars of the first song
    assert!(!pitches.contains(&72));
}

#[test]
fn test_scheduler_muting() {
    let (mut scheduler, _) = scheduler("[C]");
    scheduler.set_playback_muted(true);
    scheduler.play(0.0).unwrap();
    scheduler.engine_mut().advance(2.05);
    scheduler.pump();
    let notes = timed_notes(&scheduler);
    assert_eq!(notes.len(), 4);
    assert!(notes.iter().all(|n| n.voice == Voice::Metronome));

    let (mut scheduler, _) = scheduler_with_muted_metronome("[C]");
    scheduler.play(0.0).unwrap();
    scheduler.engine_mut().advance(2.05);
    scheduler.pump();
    let notes = timed_notes(&scheduler);
    assert_eq!(notes.len(), 16);
    assert!(notes.iter().all(|n| n.voice == Voice::Track(0)));
    // the count-in is still played
    assert_eq!(scheduler.engine().notes().len(), 20);
}

fn scheduler_with_muted_metronome(source: &str) -> (Scheduler<OfflineEngine>, Arc<crate::song::Song>) {
    let (mut scheduler, song) = scheduler(source);
    scheduler.set_metronome_muted(true);
    assert!(scheduler.metronome_muted());
    (scheduler, song)
}

#[test]
fn test_scheduler_resume_mid_song() {
    let (mut scheduler, _) = scheduler("[C][G]");
    scheduler.play(3000.0).unwrap();

    // second half of bar 2: two clicks and two strums
    let notes = timed_notes(&scheduler);
    assert_eq!(notes.len(), 10);
    let earliest = notes.iter().map(|n| n.at).fold(f64::INFINITY, f64::min);
    assert!((earliest - 2.1).abs() < EPS);

    // bar cues before the resume point never fire
    scheduler.engine_mut().advance(2.05);
    assert_eq!(scheduler.pump(), 0);
}

#[test]
fn test_scheduler_unavailable_engine() {
    let song = Arc::new(parse("[C]").unwrap());
    let mut scheduler = Scheduler::new(OfflineEngine::unavailable(), SchedulerConfig::default());
    assert_eq!(scheduler.init(), SchedulerState::Unavailable);
    scheduler.load_song(song);
    assert!(scheduler.playback_data().is_some());
    assert_eq!(scheduler.engine().cue_count(), 0);
    assert!(matches!(scheduler.play(0.0), Err(EngineError::Unavailable(_))));
}

#[test]
fn test_scheduler_play_needs_init_and_song() {
    let mut scheduler = Scheduler::new(OfflineEngine::new(), SchedulerConfig::default());
    assert_eq!(scheduler.play(0.0), Err(EngineError::NotInitialized));
    scheduler.init();
    assert_eq!(scheduler.play(0.0), Err(EngineError::NoSong));
    assert!(scheduler.engine().is_started());
}

#[test]
fn test_scheduler_voices_reach_engine() {
    let (scheduler, _) = scheduler("{instrument: Low ukulele-low-g}\n[C]");
    assert_eq!(scheduler.engine().voices(), &[crate::instrument::Sound::Ukulele]);
}
