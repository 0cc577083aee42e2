use std::io::Cursor;
use std::sync::Arc;

use daw_engine::{
    decode_audio_data, ArpRate, ArpeggiatorParams, AudioBuffer, AudioClip, AudioEngine, Clip, EngineConfig,
    EngineError, HeadlessHandle, MidiClip, Note, SynthParams, Track,
};

const SR: usize = 48000;

fn engine() -> (AudioEngine, HeadlessHandle) {
    AudioEngine::headless(EngineConfig::default())
}

fn constant_clip(id: u32, value: f32, seconds: f64) -> Clip {
    let frames = (seconds * SR as f64) as usize;
    let buffer = Arc::new(AudioBuffer::from_mono(&vec![value; frames], SR as u32));
    Clip::Audio(AudioClip::new(id, buffer, 0.0, seconds))
}

/// Render in poll-sized chunks, polling in between like the control loop does
fn run(engine: &mut AudioEngine, handle: &HeadlessHandle, frames: usize) -> Vec<f32> {
    let chunk = 1200;
    let mut out = Vec::with_capacity(frames * 2);
    let mut done = 0;
    while done < frames {
        let n = chunk.min(frames - done);
        out.extend(handle.render(n));
        engine.poll();
        done += n;
    }
    out
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

#[test]
fn test_audio_clip_plays_through_track_and_master() {
    let (mut engine, handle) = engine();
    let tracks = vec![Track::new(0).with_clip(constant_clip(0, 0.5, 0.5))];

    engine.on_transport_start(0.0).unwrap();
    engine.schedule_all_clips_from_playhead(&tracks, 0.0);
    assert_eq!(engine.source_count(), 1);

    let out = run(&mut engine, &handle, 4096);
    assert!((out[2000 * 2] - 0.5).abs() < 1e-4);
    assert!((out[2000 * 2 + 1] - 0.5).abs() < 1e-4);

    // sqrt of an RMS of 0.5
    assert!((engine.track_level(0) - 0.5f32.sqrt()).abs() < 1e-3);
    assert!(engine.master_level() > 0.7);
    let (left, right) = engine.track_levels_stereo(0);
    assert!((left - right).abs() < 1e-6);
    assert_eq!(engine.track_level(42), 0.0);
}

#[test]
fn test_clip_ends_and_is_cleaned_up() {
    let (mut engine, handle) = engine();
    let tracks = vec![Track::new(0).with_clip(constant_clip(0, 0.5, 0.05))];

    engine.on_transport_start(0.0).unwrap();
    engine.schedule_all_clips_from_playhead(&tracks, 0.0);
    let out = run(&mut engine, &handle, SR / 4);

    assert_eq!(engine.source_count(), 0);
    assert_eq!(peak(&out[SR / 10 * 2..]), 0.0);
}

#[test]
fn test_solo_silences_other_tracks() {
    let (mut engine, handle) = engine();
    let mut soloed = Track::new(1).with_clip(constant_clip(1, 0.5, 1.0));
    soloed.soloed = true;
    let tracks = vec![Track::new(0).with_clip(constant_clip(0, 0.5, 1.0)), soloed];

    engine.on_transport_start(0.0).unwrap();
    engine.schedule_all_clips_from_playhead(&tracks, 0.0);
    run(&mut engine, &handle, 8192);

    assert_eq!(engine.track_level(0), 0.0);
    assert!(engine.track_level(1) > 0.5);
}

#[test]
fn test_muted_track_is_silent_from_the_first_frame() {
    let (mut engine, handle) = engine();
    let mut muted = Track::new(0).with_clip(constant_clip(0, 0.5, 1.0));
    muted.muted = true;

    engine.on_transport_start(0.0).unwrap();
    engine.schedule_all_clips_from_playhead(&[muted.clone()], 0.0);
    assert_eq!(peak(&handle.render(1024)), 0.0);

    run(&mut engine, &handle, 4096);
    assert_eq!(engine.track_level(0), 0.0);

    // Unmuting fades the track in
    muted.muted = false;
    engine.update_track_gains(&[muted]);
    let out = run(&mut engine, &handle, 4800);
    assert!((out[4000 * 2] - 0.5).abs() < 1e-4);
}

#[test]
fn test_reschedule_while_playing_restarts_metronome_from_playhead() {
    let (mut engine, handle) = engine();
    engine.set_metronome_enabled(true);
    engine.on_transport_start(0.0).unwrap();
    run(&mut engine, &handle, SR);
    assert_eq!(engine.pending_clicks(), 1);

    engine.schedule_all_clips_from_playhead(&[], 10.0);
    engine.poll();
    assert_eq!(engine.pending_clicks(), 1);
    assert!((engine.playhead() - 10.0).abs() < 1e-9);

    let out = run(&mut engine, &handle, SR * 6 / 10);
    // Beat 20 is an accent, at the same level as the very first click
    let first = peak(&out[..480 * 2]);
    assert!(first > 0.01 && first < 0.6);
    assert_eq!(peak(&out[600 * 2..23900 * 2]), 0.0);
    assert!(peak(&out[24000 * 2..24480 * 2]) > 0.01);
}

#[test]
fn test_seek_while_playing_keeps_one_click_per_beat() {
    let (mut engine, handle) = engine();
    engine.set_metronome_enabled(true);
    engine.on_transport_start(0.0).unwrap();
    // 0.4s is a whole number of quanta
    run(&mut engine, &handle, SR * 4 / 10);
    assert_eq!(engine.pending_clicks(), 1);

    engine.on_transport_seek(30.25);
    engine.poll();
    // Next beat is 30.5, a quarter second away and past the lookahead
    assert_eq!(engine.pending_clicks(), 0);

    let out = run(&mut engine, &handle, SR / 2);
    assert_eq!(peak(&out[..11900 * 2]), 0.0);
    let click = peak(&out[12000 * 2..12480 * 2]);
    assert!(click > 0.01 && click < 0.6);
}

#[test]
fn test_arpeggio_is_bounded_by_its_clip() {
    let (mut engine, _handle) = engine();
    let notes = vec![Note::new(0.0, 1e6, 60.0)];
    // Two beats at 120 bpm
    let tracks = vec![Track::new(0).with_clip(Clip::Midi(MidiClip::new(0, 0.0, 1.0, notes)))];
    engine.set_track_arpeggiator(
        0,
        ArpeggiatorParams {
            enabled: true,
            rate: ArpRate::ThirtySecond,
            gate: 1.0,
            ..ArpeggiatorParams::default()
        },
    );

    engine.on_transport_start(0.0).unwrap();
    engine.schedule_all_clips_from_playhead(&tracks, 0.0);
    assert_eq!(engine.note_count(), 16);
}

#[test]
fn test_removed_track_is_torn_down_once() {
    let (mut engine, _handle) = engine();
    engine.warm_up().unwrap();
    let base = engine.node_count();

    engine.update_track_gains(&[Track::new(1), Track::new(2)]);
    let with_two = engine.node_count();
    assert!(with_two > base);

    engine.update_track_gains(&[Track::new(1)]);
    let with_one = engine.node_count();
    assert!(engine.routing().unwrap().track(2).is_none());

    engine.update_track_gains(&[Track::new(1)]);
    assert_eq!(engine.node_count(), with_one);
    assert_eq!(with_two - with_one, with_one - base);
}

#[test]
fn test_stop_clears_sources_and_notes() {
    let (mut engine, handle) = engine();
    let notes = vec![Note::new(0.0, 2.0, 60.0), Note::new(1.0, 2.0, 64.0)];
    let tracks = vec![
        Track::new(0).with_clip(constant_clip(0, 0.5, 2.0)),
        Track::new(1).with_clip(Clip::Midi(MidiClip::new(1, 0.0, 2.0, notes))),
    ];

    engine.on_transport_start(0.0).unwrap();
    engine.schedule_all_clips_from_playhead(&tracks, 0.0);
    assert_eq!(engine.source_count(), 1);
    assert_eq!(engine.note_count(), 2);
    run(&mut engine, &handle, 2048);

    engine.on_transport_stop();
    assert_eq!(engine.source_count(), 0);
    assert_eq!(engine.note_count(), 0);
    assert_eq!(engine.playhead(), 0.0);

    // Nothing left but the routing; the tail after the quantum in flight is silent
    let out = run(&mut engine, &handle, 4096);
    assert_eq!(peak(&out[256 * 2..]), 0.0);
}

#[test]
fn test_synth_change_keeps_notes_continuous() {
    let (mut engine, handle) = engine();
    let tracks = vec![Track::new(0).with_clip(Clip::Midi(MidiClip::new(0, 0.0, 4.0, vec![Note::new(
        0.0, 8.0, 69.0,
    )])))];

    engine.set_track_synth(0, SynthParams::default());
    engine.on_transport_start(0.0).unwrap();
    engine.schedule_all_clips_from_playhead(&tracks, 0.0);
    let out = run(&mut engine, &handle, 4800);
    assert!(peak(&out) > 0.1);

    let before = engine.note_amplitudes(0);
    engine.set_track_synth(
        0,
        SynthParams {
            attack_ms: 500.0,
            release_ms: 1000.0,
            gain: 0.3,
            ..SynthParams::default()
        },
    );
    let after = engine.note_amplitudes(0);

    assert_eq!(before.len(), 1);
    assert!((before[0] - after[0]).abs() < 1e-6);
}

#[test]
fn test_metronome_clicks_on_the_beat() {
    let (mut engine, handle) = engine();
    engine.set_metronome_enabled(true);
    engine.on_transport_start(0.0).unwrap();
    assert_eq!(engine.pending_clicks(), 1);

    let out = run(&mut engine, &handle, SR * 6 / 10);

    assert!(peak(&out[..480 * 2]) > 0.01);
    assert_eq!(peak(&out[600 * 2..23900 * 2]), 0.0);
    assert!(peak(&out[24000 * 2..24480 * 2]) > 0.01);
}

#[test]
fn test_pause_keeps_routing_and_stops_clicks() {
    let (mut engine, handle) = engine();
    engine.set_metronome_enabled(true);
    engine.update_track_gains(&[Track::new(0)]);
    engine.on_transport_start(0.0).unwrap();
    engine.update_track_gains(&[Track::new(0)]);
    run(&mut engine, &handle, 2400);

    engine.on_transport_pause();
    let out = run(&mut engine, &handle, SR);

    assert_eq!(peak(&out[1024 * 2..]), 0.0);
    assert!(engine.routing().unwrap().track(0).is_some());
    assert!((engine.playhead() - 0.05).abs() < 0.01);
}

#[test]
fn test_decode_wav_bytes() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for i in 0..1000 {
            let value = ((i as f32 / 1000.0) * 16384.0) as i16;
            writer.write_sample(value).unwrap();
            writer.write_sample(-value).unwrap();
        }
        writer.finalize().unwrap();
    }

    let buffer = decode_audio_data(&bytes).unwrap();
    assert_eq!(buffer.sample_rate(), 44100);
    assert_eq!(buffer.frames(), 1000);
    let frame = buffer.sample_at(500.0);
    assert!((frame[0] - 0.25).abs() < 1e-3);
    assert!((frame[1] + 0.25).abs() < 1e-3);
}

#[test]
fn test_decode_failure_leaves_engine_alone() {
    let (mut engine, _handle) = engine();
    engine.warm_up().unwrap();
    let nodes = engine.node_count();

    let err = decode_audio_data(&[0u8; 64]).unwrap_err();
    assert!(matches!(err, EngineError::Decode(_)));
    assert!(engine.is_warm());
    assert_eq!(engine.node_count(), nodes);
}
