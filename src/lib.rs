//! midiloop - Renders MIDI files to seamlessly looping Ogg Vorbis streams.
//!
//! This library provides the rendering pipeline behind the `midiloop`
//! command: MIDI import, offline synthesis, loop detection and splicing,
//! and Vorbis encoding.

pub mod audio;
pub mod error;
pub mod midi;
pub mod paths;
pub mod render;

// Re-export commonly used types
pub use audio::{SynthesisConfig, SynthesisContext};
pub use error::{ConfigError, RenderError};
pub use midi::{load_performance, Performance};
pub use render::{BeatDivision, LoopMode, RenderOptions, RenderSummary, Renderer};
