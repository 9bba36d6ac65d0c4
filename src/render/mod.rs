//! Turning a performance into a loop-ready encoded stream.
//!
//! The [`Renderer`] drives a frame source through the primary pass, the
//! optional beat alignment, the runoff and the loop splice, and hands the
//! result to the Vorbis encoder.

mod beat;
mod orchestrator;
mod splice;

pub use beat::align_to_division;
pub use orchestrator::{RenderState, RenderSummary, Renderer, TempoState, WORKING_BUFFER_FRAMES};

use crate::audio::encoder::DEFAULT_QUALITY;
use crate::error::ConfigError;
use crate::midi::LOOP_MARKER_CONTROLLER;
use std::fmt;
use std::str::FromStr;

/// How the rendered stream is made to loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Render once. A loop marker still produces loop comments.
    #[default]
    None,
    /// Splice the loop start onto the end of a single pass.
    Short,
    /// Play the section after the marker a second time.
    Double,
}

impl FromStr for LoopMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(LoopMode::None),
            "short" => Ok(LoopMode::Short),
            "double" => Ok(LoopMode::Double),
            _ => Err(ConfigError::InvalidLoopMode(s.to_string())),
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopMode::None => "none",
            LoopMode::Short => "short",
            LoopMode::Double => "double",
        };
        f.write_str(name)
    }
}

/// A note length to end the song on: 1 is a whole note, 4 a quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatDivision(u32);

impl BeatDivision {
    pub const MAX: u32 = 64;

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for BeatDivision {
    type Error = ConfigError;

    fn try_from(division: u32) -> Result<Self, Self::Error> {
        if division.is_power_of_two() && division <= Self::MAX {
            Ok(BeatDivision(division))
        } else {
            Err(ConfigError::InvalidBeatDivision(division.to_string()))
        }
    }
}

impl FromStr for BeatDivision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let division = s
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidBeatDivision(s.to_string()))?;
        BeatDivision::try_from(division)
    }
}

/// Per-batch render settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub loop_mode: LoopMode,
    pub end_division: Option<BeatDivision>,
    /// Vorbis VBR quality, -0.1 to 1.0.
    pub quality: f32,
    pub loop_controller: u8,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            loop_mode: LoopMode::None,
            end_division: None,
            quality: DEFAULT_QUALITY,
            loop_controller: LOOP_MARKER_CONTROLLER,
        }
    }
}

impl RenderOptions {
    /// Checks values that cannot be expressed in the field types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-0.1..=1.0).contains(&self.quality) {
            return Err(ConfigError::InvalidQuality(self.quality));
        }
        Ok(())
    }
}
