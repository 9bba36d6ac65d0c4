//! Standard MIDI File (SMF) loading.
//!
//! Reads .mid and .midi files into a [`Performance`]. Supports SMF Format 0
//! (single track) and Format 1 (multi-track) files with metrical timing.
//!
//! # Limitations
//!
//! - SysEx and meta events other than tempo and end-of-track are dropped
//! - Format 2 (sequential) and SMPTE timecode files are rejected

use super::{ChannelMessage, EventKind, Performance, TimedEvent};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// Errors that can occur while loading a performance.
#[derive(Debug, thiserror::Error)]
pub enum MidiImportError {
    /// File could not be read
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// MIDI parsing failed
    #[error("MIDI parse error: {0}")]
    ParseError(String),
    /// Unsupported MIDI format or timing
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Checks whether the file at `path` starts with an SMF header chunk.
///
/// Used to filter wildcard matches before any parsing is attempted.
pub fn is_midi_file<P: AsRef<Path>>(path: P) -> bool {
    let mut magic = [0u8; 4];
    match File::open(path.as_ref()) {
        Ok(mut file) => file.read_exact(&mut magic).is_ok() && &magic == b"MThd",
        Err(_) => false,
    }
}

/// Loads a MIDI file from disk.
///
/// # Arguments
///
/// * `path` - Path to the .mid or .midi file
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed, or uses an
/// unsupported format.
pub fn load_performance<P: AsRef<Path>>(path: P) -> Result<Performance, MidiImportError> {
    let path = path.as_ref();
    let data = fs::read(path)?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("performance")
        .to_string();

    parse_performance(name, &data)
}

/// Parses SMF bytes into a performance.
pub fn parse_performance(
    name: impl Into<String>,
    data: &[u8],
) -> Result<Performance, MidiImportError> {
    let smf = Smf::parse(data).map_err(|e| MidiImportError::ParseError(e.to_string()))?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => {
            return Err(MidiImportError::UnsupportedFormat(
                "SMPTE timecode timing not supported".to_string(),
            ))
        }
    };

    if smf.header.format == Format::Sequential {
        return Err(MidiImportError::UnsupportedFormat(
            "Format 2 (sequential) MIDI files not supported".to_string(),
        ));
    }

    let mut events = Vec::new();
    let mut total_ticks: u32 = 0;

    for track in &smf.tracks {
        let mut current_tick: u32 = 0;

        for event in track {
            current_tick = current_tick.saturating_add(event.delta.as_int());

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    let micros_per_beat = tempo.as_int();
                    if micros_per_beat > 0 {
                        events.push(TimedEvent::new(current_tick, EventKind::Tempo(micros_per_beat)));
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    events.push(TimedEvent::new(
                        current_tick,
                        EventKind::Channel {
                            channel: channel.as_int(),
                            message: convert_message(message),
                        },
                    ));
                }
                _ => {} // Ignore SysEx and other meta events
            }
        }

        // A track's end-of-track marker sits at its final delta
        total_ticks = total_ticks.max(current_tick);
    }

    // Performance::new sorts stably, so events at the same tick keep track order
    events.push(TimedEvent::new(total_ticks, EventKind::EndOfTrack));

    Ok(Performance::new(name, ticks_per_beat, events))
}

fn convert_message(message: MidiMessage) -> ChannelMessage {
    match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => ChannelMessage::NoteOff {
            key: key.as_int(),
            velocity: 0,
        },
        MidiMessage::NoteOn { key, vel } => ChannelMessage::NoteOn {
            key: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::NoteOff { key, vel } => ChannelMessage::NoteOff {
            key: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::Aftertouch { key, vel } => ChannelMessage::KeyPressure {
            key: key.as_int(),
            pressure: vel.as_int(),
        },
        MidiMessage::Controller { controller, value } => ChannelMessage::Controller {
            controller: controller.as_int(),
            value: value.as_int(),
        },
        MidiMessage::ProgramChange { program } => ChannelMessage::ProgramChange {
            program: program.as_int(),
        },
        MidiMessage::ChannelAftertouch { vel } => ChannelMessage::ChannelPressure {
            pressure: vel.as_int(),
        },
        MidiMessage::PitchBend { bend } => ChannelMessage::PitchBend {
            value: bend.0.as_int(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::test_smf::{SmfBuilder, SmfEvent};
    use crate::midi::LOOP_MARKER_CONTROLLER;

    #[test]
    fn test_parse_merges_tracks_in_tick_order() {
        let bytes = SmfBuilder::new(480)
            .track(vec![
                (0, SmfEvent::Tempo(600_000)),
                (960, SmfEvent::EndOfTrack),
            ])
            .track(vec![
                (0, SmfEvent::NoteOn(0, 60, 100)),
                (480, SmfEvent::Controller(0, LOOP_MARKER_CONTROLLER, 0)),
                (480, SmfEvent::NoteOff(0, 60)),
                (960, SmfEvent::EndOfTrack),
            ])
            .build();

        let performance = parse_performance("test", &bytes).unwrap();
        assert_eq!(performance.ticks_per_beat(), 480);
        assert_eq!(performance.total_ticks(), 960);

        let ticks: Vec<u32> = performance.events().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![0, 0, 480, 480, 960]);
        assert_eq!(performance.events()[0].kind, EventKind::Tempo(600_000));
        assert!(performance.events()[2].is_controller(LOOP_MARKER_CONTROLLER));
        assert_eq!(performance.events()[4].kind, EventKind::EndOfTrack);
    }

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        let bytes = SmfBuilder::new(96)
            .track(vec![
                (0, SmfEvent::NoteOn(2, 64, 90)),
                (96, SmfEvent::NoteOn(2, 64, 0)),
                (96, SmfEvent::EndOfTrack),
            ])
            .build();

        let performance = parse_performance("test", &bytes).unwrap();
        assert_eq!(
            performance.events()[1].kind,
            EventKind::Channel {
                channel: 2,
                message: ChannelMessage::NoteOff {
                    key: 64,
                    velocity: 0
                }
            }
        );
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let result = parse_performance("bad", b"not a midi file");
        assert!(matches!(result, Err(MidiImportError::ParseError(_))));
    }

    #[test]
    fn test_is_midi_file() {
        let dir = tempfile::tempdir().unwrap();
        let midi_path = dir.path().join("song.mid");
        let text_path = dir.path().join("notes.txt");
        std::fs::write(
            &midi_path,
            SmfBuilder::new(480)
                .track(vec![(0, SmfEvent::EndOfTrack)])
                .build(),
        )
        .unwrap();
        std::fs::write(&text_path, "hello").unwrap();

        assert!(is_midi_file(&midi_path));
        assert!(!is_midi_file(&text_path));
        assert!(!is_midi_file(dir.path().join("missing.mid")));
    }
}
