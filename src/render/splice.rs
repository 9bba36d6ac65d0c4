//! Joining the end of a rendered song back onto its loop point.
//!
//! Both strategies run after the runoff has been placed in an overlap
//! region, so the first frames they write in normal mode are summed with the
//! decaying tail of the song.

use super::orchestrator::RenderState;
use super::BeatDivision;
use crate::audio::{FrameSource, OverlapAddSink};
use crate::error::RenderError;

/// Frames rendered into an overlap region after the seam, so the loop does
/// not end on a hard cut.
const CUSHION_FRAMES: usize = 64;

/// Frames per discard call while pre-rolling.
const DISCARD_CHUNK: usize = 1024;

/// Replays the start of the loop on top of the runoff.
///
/// The song is rendered again from the beginning on a reset synthesizer and
/// discarded up to the loop point. From there, `overlap_samples` frames are
/// written so they sum onto the runoff, followed by a short cushion. The loop
/// point and the position both move past the summed section so the encoded
/// loop starts right after the seam.
pub(crate) fn render_short_loop<S>(
    state: &mut RenderState,
    source: &mut S,
    sink: &mut OverlapAddSink,
) -> Result<(), RenderError>
where
    S: FrameSource + ?Sized,
{
    let Some(loop_point) = state.loop_point else {
        tracing::debug!("No loop point, skipping short splice");
        return Ok(());
    };

    source.reset_with_new_performance()?;
    source.start_playback()?;

    let block = source.internal_buffer_size() as u64;
    let mut pre_roll = loop_point.saturating_sub(block);
    let mut left = vec![0.0f32; DISCARD_CHUNK];
    let mut right = vec![0.0f32; DISCARD_CHUNK];
    while pre_roll > 0 {
        let count = pre_roll.min(DISCARD_CHUNK as u64) as usize;
        source.render_frames(&mut left[..count], &mut right[..count], &mut state.tracker)?;
        pre_roll -= count as u64;
    }

    source.silence();
    // A loop point of zero is the first frame after start.
    if loop_point >= block {
        source.flush_pipeline(&mut state.tracker)?;
    }

    for _ in 0..state.overlap_samples {
        state.pull_frame(source, sink)?;
    }
    state.flush(sink)?;

    sink.start_overlap_region()?;
    for _ in 0..CUSHION_FRAMES {
        state.pull_frame(source, sink)?;
    }
    state.flush(sink)?;
    sink.end_overlap_region()?;

    state.sample_position += state.overlap_samples;
    state.loop_point = Some(loop_point + state.overlap_samples);
    tracing::debug!(
        "Short splice joined at {}, {} frames overlapped",
        loop_point,
        state.overlap_samples
    );
    Ok(())
}

/// Plays the song a second time from the marker, without resetting the
/// synthesizer, so the loop body carries the state of a real repeat.
///
/// The loop point becomes the position at which the repeat starts.
pub(crate) fn render_double_loop<S>(
    state: &mut RenderState,
    source: &mut S,
    sink: &mut OverlapAddSink,
    end_division: Option<BeatDivision>,
) -> Result<(), RenderError>
where
    S: FrameSource + ?Sized,
{
    let Some(loop_tick) = state.tracker.loop_tick() else {
        tracing::debug!("No loop marker, skipping double splice");
        return Ok(());
    };
    if state.loop_point.is_none() {
        tracing::debug!("Loop marker was never reached, skipping double splice");
        return Ok(());
    }

    // Fires on the first event of the restarted transport.
    state.tracker.arm_seek(loop_tick, u32::MAX);
    state.loop_point = Some(state.sample_position);
    tracing::debug!(
        "Repeating from tick {} at sample {}",
        loop_tick,
        state.sample_position
    );

    source.restart_transport();
    source.start_playback()?;
    state.play_through(source, sink)?;
    source.join()?;

    if let Some(division) = end_division {
        state.align_end(source, sink, division)?;
    }
    state.flush(sink)
}
