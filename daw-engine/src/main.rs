use anyhow::Context;
use daw_engine::{
    decode_file, ArpPattern, ArpRate, ArpeggiatorParams, AudioClip, AudioEngine, Clip, EngineConfig,
    MidiClip, Note, SynthParams, Track, Waveform,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Get audio file paths from command line arguments
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <audio_file1> [audio_file2] ...", args[0]);
        eprintln!("Example: {} drums.wav bass.flac", args[0]);
        return Ok(());
    }

    let config = match env::var("DAW_ENGINE_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path).with_context(|| format!("loading config {}", path))?,
        Err(_) => EngineConfig::default(),
    };

    println!("DAW Engine demo\n");

    let mut tracks = Vec::new();
    let mut timeline_end = 0.0f64;
    for (i, path) in args.iter().skip(1).enumerate() {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        match decode_file(path) {
            Ok(buffer) => {
                println!(
                    "  Track {}: {} ({} Hz, {:.2}s)",
                    i,
                    name,
                    buffer.sample_rate(),
                    buffer.duration()
                );
                let duration = buffer.duration();
                timeline_end = timeline_end.max(duration);
                let clip = AudioClip::new(i as u32, Arc::new(buffer), 0.0, duration);
                tracks.push(Track::new(i as u32).with_clip(Clip::Audio(clip)));
            }
            Err(e) => {
                eprintln!("  Skipping {}: {}", name, e);
            }
        }
    }

    // An arpeggiated chord on its own instrument track
    let synth_track = tracks.len() as u32;
    let bars = 4.0;
    let chord = vec![
        Note::new(0.0, bars * 4.0, 57.0),
        Note::new(0.0, bars * 4.0, 60.0),
        Note::new(0.0, bars * 4.0, 64.0),
    ];
    let seconds_per_beat = 60.0 / config.default_bpm;
    let midi = MidiClip::new(synth_track, 0.0, bars * 4.0 * seconds_per_beat, chord);
    timeline_end = timeline_end.max(midi.end());
    let mut synth = Track::new(synth_track).with_clip(Clip::Midi(midi));
    synth.volume = 0.5;
    tracks.push(synth);

    let mut engine = AudioEngine::with_cpal(config);
    engine.set_track_synth(
        synth_track,
        SynthParams {
            waveform: Waveform::Triangle,
            ..SynthParams::default()
        },
    );
    engine.set_track_arpeggiator(
        synth_track,
        ArpeggiatorParams {
            pattern: ArpPattern::UpDown,
            rate: ArpRate::Sixteenth,
            octaves: 2,
            ..ArpeggiatorParams::default()
        },
    );
    engine.set_metronome_enabled(true);
    engine.warm_up().context("starting audio output")?;

    println!("\nTimeline: {:.2}s", timeline_end);
    print_help();

    // Read commands on their own thread so the scheduling loop keeps running
    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut playing = false;
    print!("> ");
    io::stdout().flush()?;

    loop {
        engine.poll();

        if playing && engine.playhead() >= timeline_end {
            engine.on_transport_stop();
            playing = false;
            println!("\rEnd of timeline");
            print!("> ");
            io::stdout().flush()?;
        }

        let Ok(line) = line_rx.recv_timeout(engine.poll_interval()) else {
            continue;
        };
        let input = line.trim();
        let mut words = input.split_whitespace();

        match words.next() {
            None | Some("p") | Some("play") => {
                let playhead = engine.playhead();
                engine.on_transport_start(playhead)?;
                engine.schedule_all_clips_from_playhead(&tracks, playhead);
                playing = true;
                println!("Playing from {:.2}s", playhead);
            }
            Some("pause") => {
                engine.on_transport_pause();
                playing = false;
                println!("Paused at {:.2}s", engine.playhead());
            }
            Some("s") | Some("stop") => {
                engine.on_transport_stop();
                playing = false;
                println!("Stopped");
            }
            Some("seek") => match words.next().and_then(|w| w.parse::<f64>().ok()) {
                Some(seconds) if seconds >= 0.0 => {
                    engine.on_transport_seek(seconds);
                    if playing {
                        engine.schedule_all_clips_from_playhead(&tracks, seconds);
                    }
                    println!("Seeked to {:.2}s", seconds);
                }
                _ => println!("Usage: seek <seconds>"),
            },
            Some("bpm") => match words.next().and_then(|w| w.parse::<f64>().ok()) {
                Some(bpm) => {
                    engine.set_bpm(bpm);
                    if playing {
                        engine.schedule_all_clips_from_playhead(&tracks, engine.playhead());
                    }
                    println!("Tempo {:.1} BPM", engine.bpm());
                }
                None => println!("Usage: bpm <beats per minute>"),
            },
            Some("metro") => {
                let enabled = !engine.metronome_enabled();
                engine.set_metronome_enabled(enabled);
                println!("Metronome {}", if enabled { "on" } else { "off" });
            }
            Some("mute") | Some("solo") | Some("vol") => {
                let command = input.split_whitespace().next().unwrap_or_default();
                let id = words.next().and_then(|w| w.parse::<u32>().ok());
                match id.and_then(|id| tracks.iter_mut().find(|t| t.id == id)) {
                    Some(track) => {
                        match command {
                            "mute" => track.muted = !track.muted,
                            "solo" => track.soloed = !track.soloed,
                            _ => {
                                if let Some(volume) = words.next().and_then(|w| w.parse::<f32>().ok()) {
                                    track.volume = volume.clamp(0.0, 1.0);
                                }
                            }
                        }
                        engine.update_track_gains(&tracks);
                    }
                    None => println!("Unknown track"),
                }
            }
            Some("levels") => {
                for track in &tracks {
                    let (left, right) = engine.track_levels_stereo(track.id);
                    println!("  Track {}: L {:.2} R {:.2}", track.id, left, right);
                }
                println!("  Master: {:.2}", engine.master_level());
            }
            Some("h") | Some("help") => print_help(),
            Some("q") | Some("quit") => {
                println!("Quitting...");
                break;
            }
            Some(other) => println!("Unknown command '{}'. Type 'help' for commands.", other),
        }

        print!("> ");
        io::stdout().flush()?;
    }

    engine.close();
    Ok(())
}

fn print_help() {
    println!("\nCommands:");
    println!("  play (or Enter)   start from the playhead");
    println!("  pause             pause");
    println!("  stop              stop and rewind");
    println!("  seek <seconds>    move the playhead");
    println!("  bpm <value>       change tempo");
    println!("  metro             toggle the metronome");
    println!("  mute <track>      toggle mute");
    println!("  solo <track>      toggle solo");
    println!("  vol <track> <v>   set volume (0..1)");
    println!("  levels            show meter levels");
    println!("  quit              exit\n");
}
