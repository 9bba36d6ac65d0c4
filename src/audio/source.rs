//! The frame source contract.
//!
//! A frame source turns a loaded performance into stereo float frames,
//! showing every performance event to a visitor while it renders. Events
//! are dispatched one synthesis block at a time, so an event becomes
//! observable up to `internal_buffer_size()` frames after its position in
//! the performance.

use crate::error::RenderError;
use crate::midi::EventVisitor;

pub trait FrameSource {
    /// Starts the transport. Frames computed ahead for an earlier transport
    /// are dropped without dispatching anything, so the next frame rendered
    /// is the first frame of this transport.
    fn start_playback(&mut self) -> Result<(), RenderError>;

    fn stop_playback(&mut self);

    /// Waits for the transport to finish. Fails if it is still playing.
    fn join(&mut self) -> Result<(), RenderError>;

    fn is_playing(&self) -> bool;

    /// Current tempo in microseconds per quarter note.
    fn tempo(&self) -> u32;

    /// Sounding voices; zero once the synthesizer has gone idle.
    fn active_voice_count(&self) -> usize;

    /// Frames computed ahead of the reported position.
    fn internal_buffer_size(&self) -> usize;

    /// Renders `left.len()` frames. Both slices must be the same length.
    fn render_frames(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        visitor: &mut dyn EventVisitor,
    ) -> Result<(), RenderError>;

    /// Releases every sounding note.
    fn silence(&mut self);

    /// Renders and discards frames up to the end of the next block boundary;
    /// a whole block when already aligned.
    fn flush_pipeline(&mut self, visitor: &mut dyn EventVisitor) -> Result<(), RenderError>;

    /// Replaces the transport with a fresh one at tick zero. Synthesis state
    /// (sounding voices, block position) carries over.
    fn restart_transport(&mut self);

    /// Discards all synthesis state and loads a fresh transport for the
    /// performance, as if the file had just been opened.
    fn reset_with_new_performance(&mut self) -> Result<(), RenderError>;
}
