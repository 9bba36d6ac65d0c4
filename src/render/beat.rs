//! Quantizing the end of a song to a note boundary.

/// Returns the absolute sample position of the next note boundary after
/// `position`.
///
/// Boundaries are counted from the last tempo change, in notes of length
/// `1 / division` at `micros_per_beat` per quarter note. A position already
/// on a boundary advances to the following one, so the result is always
/// strictly greater than `position`.
///
/// # Arguments
///
/// * `position` - Current sample position
/// * `last_tempo_change` - Sample position of the last tempo change
/// * `micros_per_beat` - Tempo in effect at `position`
/// * `division` - Note division, 4 for quarter notes
/// * `sample_rate` - Output sample rate in Hz
pub fn align_to_division(
    position: u64,
    last_tempo_change: u64,
    micros_per_beat: u32,
    division: u32,
    sample_rate: u32,
) -> u64 {
    let beat_length = sample_rate as f64
        * (4.0 / division.max(1) as f64)
        * (micros_per_beat as f64 / 1_000_000.0);
    if beat_length <= 0.0 {
        return position;
    }

    let since = position.saturating_sub(last_tempo_change) as f64;
    let beats = (since / beat_length).floor() + 1.0;
    let target = last_tempo_change + (beats * beat_length) as u64;
    target.max(position + 1)
}
