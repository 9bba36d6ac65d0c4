//! MIDI performance data and playback.
//!
//! This module provides the loaded, immutable representation of a MIDI
//! performance, the sample-clocked sequence player that walks it, and the
//! loop-marker tracker that watches its events.

mod loop_signal;
mod midi_import;
mod player;
#[cfg(test)]
pub(crate) mod test_smf;

pub use loop_signal::{LoopSignalTracker, PendingSeek};
pub use midi_import::{is_midi_file, load_performance, parse_performance, MidiImportError};
pub use player::{EventDisposition, EventVisitor, PassThrough, PlayerStatus, SequencePlayer};

/// Tempo assumed until the performance sets one (120 BPM).
pub const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Controller number used as the in-band "loop here" marker.
pub const LOOP_MARKER_CONTROLLER: u8 = 111;

/// A channel voice message, decoded from the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    NoteOff { key: u8, velocity: u8 },
    NoteOn { key: u8, velocity: u8 },
    KeyPressure { key: u8, pressure: u8 },
    Controller { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelPressure { pressure: u8 },
    /// 14-bit bend value, 8192 is centered.
    PitchBend { value: u16 },
}

impl ChannelMessage {
    /// Returns `(command, data1, data2)` as the synthesizer consumes them.
    pub fn to_raw(self) -> (i32, i32, i32) {
        match self {
            ChannelMessage::NoteOff { key, velocity } => (0x80, key as i32, velocity as i32),
            ChannelMessage::NoteOn { key, velocity } => (0x90, key as i32, velocity as i32),
            ChannelMessage::KeyPressure { key, pressure } => (0xA0, key as i32, pressure as i32),
            ChannelMessage::Controller { controller, value } => {
                (0xB0, controller as i32, value as i32)
            }
            ChannelMessage::ProgramChange { program } => (0xC0, program as i32, 0),
            ChannelMessage::ChannelPressure { pressure } => (0xD0, pressure as i32, 0),
            ChannelMessage::PitchBend { value } => {
                (0xE0, (value & 0x7F) as i32, ((value >> 7) & 0x7F) as i32)
            }
        }
    }

    /// Whether this message starts or stops a note.
    ///
    /// Seeking replays every message before the target except these, so the
    /// channel state (programs, controllers, bend) matches linear playback.
    pub fn is_note(&self) -> bool {
        matches!(
            self,
            ChannelMessage::NoteOn { .. } | ChannelMessage::NoteOff { .. }
        )
    }
}

/// What happens at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Channel { channel: u8, message: ChannelMessage },
    /// Microseconds per quarter note.
    Tempo(u32),
    /// The last event of the performance, always at `total_ticks`.
    EndOfTrack,
}

/// An event at an absolute tick position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: u32,
    pub kind: EventKind,
}

impl TimedEvent {
    pub fn new(tick: u32, kind: EventKind) -> Self {
        Self { tick, kind }
    }

    /// Returns true if this is a control change on `controller`, on any channel.
    pub fn is_controller(&self, controller: u8) -> bool {
        matches!(
            self.kind,
            EventKind::Channel {
                message: ChannelMessage::Controller { controller: c, .. },
                ..
            } if c == controller
        )
    }
}

/// A loaded MIDI sequence.
///
/// Immutable once loaded. Events from every track are merged into a single
/// list ordered by tick; events sharing a tick keep their file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    name: String,
    ticks_per_beat: u16,
    events: Vec<TimedEvent>,
    total_ticks: u32,
}

impl Performance {
    /// Builds a performance from tick-ordered events.
    ///
    /// A terminal `EndOfTrack` is appended at the last tick if the list does
    /// not already end with one.
    pub fn new(name: impl Into<String>, ticks_per_beat: u16, mut events: Vec<TimedEvent>) -> Self {
        events.sort_by_key(|e| e.tick);
        let total_ticks = events.last().map(|e| e.tick).unwrap_or(0);
        events.retain(|e| e.kind != EventKind::EndOfTrack);
        events.push(TimedEvent::new(total_ticks, EventKind::EndOfTrack));

        Self {
            name: name.into(),
            ticks_per_beat: ticks_per_beat.max(1),
            events,
            total_ticks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// The tick of the final event.
    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    /// Returns the tick of the first loop marker, if the performance has one.
    pub fn loop_marker_tick(&self, controller: u8) -> Option<u32> {
        self.events
            .iter()
            .find(|e| e.is_controller(controller))
            .map(|e| e.tick)
    }
}

/// Converts a span of samples to ticks at a fixed tempo.
///
/// # Arguments
///
/// * `samples` - Number of samples elapsed
/// * `micros_per_beat` - Tempo in microseconds per quarter note
/// * `ticks_per_beat` - File resolution
/// * `sample_rate` - Output sample rate in Hz
pub fn samples_to_ticks(
    samples: u64,
    micros_per_beat: u32,
    ticks_per_beat: u16,
    sample_rate: u32,
) -> f64 {
    let seconds = samples as f64 / sample_rate as f64;
    let beats = seconds * 1_000_000.0 / micros_per_beat.max(1) as f64;
    beats * ticks_per_beat as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(tick: u32, controller: u8) -> TimedEvent {
        TimedEvent::new(
            tick,
            EventKind::Channel {
                channel: 3,
                message: ChannelMessage::Controller {
                    controller,
                    value: 0,
                },
            },
        )
    }

    #[test]
    fn test_performance_appends_end_of_track() {
        let performance = Performance::new("song", 480, vec![controller(0, 7), controller(960, 10)]);
        assert_eq!(performance.total_ticks(), 960);
        let last = performance.events().last().unwrap();
        assert_eq!(*last, TimedEvent::new(960, EventKind::EndOfTrack));
        assert_eq!(performance.events().len(), 3);
    }

    #[test]
    fn test_loop_marker_tick() {
        let performance = Performance::new(
            "song",
            480,
            vec![controller(0, 7), controller(480, LOOP_MARKER_CONTROLLER)],
        );
        assert_eq!(performance.loop_marker_tick(LOOP_MARKER_CONTROLLER), Some(480));
        assert_eq!(performance.loop_marker_tick(112), None);
    }

    #[test]
    fn test_pitch_bend_raw_split() {
        let (command, lsb, msb) = ChannelMessage::PitchBend { value: 0x2001 }.to_raw();
        assert_eq!(command, 0xE0);
        assert_eq!(lsb, 0x01);
        assert_eq!(msb, 0x40);
    }

    #[test]
    fn test_samples_to_ticks() {
        // One second at 120 BPM is two beats.
        let ticks = samples_to_ticks(44100, 500_000, 480, 44100);
        assert!((ticks - 960.0).abs() < 1e-9);
    }
}
