//! Offline audio path: synthesis, overlap-add and encoding.
//!
//! - [`engine`] drives rustysynth from a sample-clocked player
//! - [`overlap`] sums runoff tails onto later audio
//! - [`encoder`] writes the finished stream as Ogg Vorbis

pub mod encoder;
pub mod engine;
pub mod overlap;
pub mod source;

pub use encoder::{StreamEncoder, VorbisStreamEncoder};
pub use engine::{SongRenderer, SynthesisConfig, SynthesisContext, BLOCK_SIZE, SAMPLE_RATE};
pub use overlap::OverlapAddSink;
pub use source::FrameSource;
