//! Error types shared across the renderer.

use crate::midi::MidiImportError;
use std::path::PathBuf;

/// Problems with the renderer's configuration, detected before any file is
/// rendered.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The soundfont at {0} is missing or invalid")]
    InvalidSoundFont(PathBuf),

    #[error("Failed to load the soundfont at {path}: {reason}")]
    SoundFontLoad { path: PathBuf, reason: String },

    #[error("Invalid loop mode '{0}'; expected none, short or double")]
    InvalidLoopMode(String),

    #[error("Invalid beat division {0}; use a power of two beat division from 1 (whole note) to 64")]
    InvalidBeatDivision(String),

    #[error("Invalid Vorbis quality {0}; expected a value from -0.1 to 1.0")]
    InvalidQuality(f32),

    #[error("Output directory {0} does not exist")]
    MissingOutputDirectory(PathBuf),
}

/// Failures while rendering a single file.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("No soundfont is loaded")]
    NoSoundFont,

    #[error("Failed to load MIDI file {path}: {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: MidiImportError,
    },

    #[error("Failed to create synthesizer: {0}")]
    SynthesizerInit(String),

    #[error("Synth encountered an error: {0}")]
    Synthesis(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
