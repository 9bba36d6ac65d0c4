//! Builds Standard MIDI File bytes for tests.
//!
//! Events are given at absolute ticks per track and converted to delta
//! times when the file is written. Always produces SMF Format 1.

/// Appends `value` as a variable-length quantity: seven bits per byte,
/// most significant group first, high bit set on all but the last byte.
fn push_vlq(buffer: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    let mut rest = value;
    loop {
        groups[len] = (rest & 0x7F) as u8;
        len += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for (i, group) in groups[..len].iter().rev().enumerate() {
        let continuation = if i + 1 < len { 0x80 } else { 0 };
        buffer.push(group | continuation);
    }
}

/// Events the builder knows how to encode.
#[derive(Debug, Clone, Copy)]
pub enum SmfEvent {
    /// Channel, key, velocity
    NoteOn(u8, u8, u8),
    /// Channel, key
    NoteOff(u8, u8),
    /// Channel, controller, value
    Controller(u8, u8, u8),
    /// Channel, program
    ProgramChange(u8, u8),
    /// Microseconds per quarter note
    Tempo(u32),
    EndOfTrack,
}

fn write_event(event: SmfEvent, buffer: &mut Vec<u8>) {
    match event {
        SmfEvent::NoteOn(channel, key, velocity) => {
            buffer.extend_from_slice(&[0x90 | (channel & 0x0F), key, velocity]);
        }
        SmfEvent::NoteOff(channel, key) => {
            buffer.extend_from_slice(&[0x80 | (channel & 0x0F), key, 0]);
        }
        SmfEvent::Controller(channel, controller, value) => {
            buffer.extend_from_slice(&[0xB0 | (channel & 0x0F), controller, value]);
        }
        SmfEvent::ProgramChange(channel, program) => {
            buffer.extend_from_slice(&[0xC0 | (channel & 0x0F), program]);
        }
        SmfEvent::Tempo(micros) => {
            // Meta event: FF 51 03 tt tt tt
            buffer.extend_from_slice(&[0xFF, 0x51, 0x03]);
            buffer.push((micros >> 16) as u8);
            buffer.push((micros >> 8) as u8);
            buffer.push(micros as u8);
        }
        SmfEvent::EndOfTrack => {
            buffer.extend_from_slice(&[0xFF, 0x2F, 0x00]);
        }
    }
}

/// Collects tracks and serializes them into an SMF byte stream.
pub struct SmfBuilder {
    ticks_per_beat: u16,
    tracks: Vec<Vec<u8>>,
}

impl SmfBuilder {
    pub fn new(ticks_per_beat: u16) -> Self {
        Self {
            ticks_per_beat,
            tracks: Vec::new(),
        }
    }

    /// Adds a track from `(absolute_tick, event)` pairs in tick order.
    pub fn track(mut self, events: Vec<(u32, SmfEvent)>) -> Self {
        let mut data = Vec::new();
        let mut last_tick = 0u32;
        for (tick, event) in events {
            push_vlq(&mut data, tick.saturating_sub(last_tick));
            write_event(event, &mut data);
            last_tick = tick;
        }
        self.tracks.push(data);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(self.tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.ticks_per_beat.to_be_bytes());

        for track in &self.tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(track.len() as u32).to_be_bytes());
            out.extend_from_slice(track);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_times_use_vlq() {
        let cases: [(u32, &[u8]); 4] = [
            (0, &[0x00]),
            (0x40, &[0x40]),
            (0x2000, &[0xC0, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (value, expected) in cases {
            let mut buffer = Vec::new();
            push_vlq(&mut buffer, value);
            assert_eq!(buffer, expected, "value {:#x}", value);
        }
    }

    #[test]
    fn test_header_counts_tracks() {
        let bytes = SmfBuilder::new(96)
            .track(vec![(0, SmfEvent::EndOfTrack)])
            .track(vec![(0, SmfEvent::EndOfTrack)])
            .build();
        assert_eq!(&bytes[..4], b"MThd");
        assert_eq!(&bytes[10..12], &2u16.to_be_bytes());
        assert_eq!(&bytes[12..14], &96u16.to_be_bytes());
    }
}
