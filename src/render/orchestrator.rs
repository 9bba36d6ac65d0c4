//! The render loop for one file.

use super::beat::align_to_division;
use super::splice;
use super::{BeatDivision, LoopMode, RenderOptions};
use crate::audio::encoder::{StreamEncoder, VorbisStreamEncoder, ENCODER_NAME};
use crate::audio::{FrameSource, OverlapAddSink, SynthesisContext};
use crate::error::{ConfigError, RenderError};
use crate::midi::{load_performance, LoopSignalTracker};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Frames collected before they are handed to the sink.
pub const WORKING_BUFFER_FRAMES: usize = 1024;

/// Runoff longer than this is treated as a voice that never decays.
const MAX_RUNOFF_SECONDS: u32 = 60;

/// Tempo in effect and where it took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoState {
    pub micros_per_beat: u32,
    pub sample_at_last_change: u64,
}

/// Everything the render loop tracks for one file.
#[derive(Debug)]
pub struct RenderState {
    /// Frames emitted since the start of the primary pass.
    pub sample_position: u64,
    pub loop_point: Option<u64>,
    pub tempo: TempoState,
    /// Runoff length, in frames.
    pub overlap_samples: u64,
    pub tracker: LoopSignalTracker,
    sample_rate: u32,
    left: Vec<f32>,
    right: Vec<f32>,
    buffered: usize,
}

impl RenderState {
    pub fn new(tracker: LoopSignalTracker, micros_per_beat: u32, sample_rate: u32) -> Self {
        Self {
            sample_position: 0,
            loop_point: None,
            tempo: TempoState {
                micros_per_beat,
                sample_at_last_change: 0,
            },
            overlap_samples: 0,
            tracker,
            sample_rate,
            left: vec![0.0; WORKING_BUFFER_FRAMES],
            right: vec![0.0; WORKING_BUFFER_FRAMES],
            buffered: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the loop, once a loop point exists.
    pub fn loop_length(&self) -> Option<u64> {
        self.loop_point
            .map(|start| self.sample_position.saturating_sub(start))
    }

    /// Renders one frame into the working buffer, handing the buffer to the
    /// sink when it fills. Does not move the sample position.
    pub(crate) fn pull_frame<S>(
        &mut self,
        source: &mut S,
        sink: &mut OverlapAddSink,
    ) -> Result<(), RenderError>
    where
        S: FrameSource + ?Sized,
    {
        let i = self.buffered;
        source.render_frames(
            &mut self.left[i..i + 1],
            &mut self.right[i..i + 1],
            &mut self.tracker,
        )?;
        self.buffered += 1;
        if self.buffered == WORKING_BUFFER_FRAMES {
            self.flush(sink)?;
        }
        Ok(())
    }

    /// Hands whatever is in the working buffer to the sink.
    pub(crate) fn flush(&mut self, sink: &mut OverlapAddSink) -> Result<(), RenderError> {
        if self.buffered > 0 {
            sink.write_buffers(&self.left[..self.buffered], &self.right[..self.buffered])?;
            self.buffered = 0;
        }
        Ok(())
    }

    /// Pulls frames until the transport stops, latching the loop point and
    /// following tempo changes on the way.
    pub(crate) fn play_through<S>(
        &mut self,
        source: &mut S,
        sink: &mut OverlapAddSink,
    ) -> Result<(), RenderError>
    where
        S: FrameSource + ?Sized,
    {
        let latency = source.internal_buffer_size() as u64;
        while source.is_playing() {
            self.pull_frame(source, sink)?;

            if self.loop_point.is_none() && self.tracker.has_hit_loop_point() {
                let loop_point = self.sample_position.saturating_sub(latency);
                tracing::debug!(
                    "Loop marker seen at sample {}, loop point {}",
                    self.sample_position,
                    loop_point
                );
                self.loop_point = Some(loop_point);
            }

            let tempo = source.tempo();
            if tempo != self.tempo.micros_per_beat {
                tracing::debug!(
                    "Tempo change to {} us per beat at sample {}",
                    tempo,
                    self.sample_position
                );
                self.tempo = TempoState {
                    micros_per_beat: tempo,
                    sample_at_last_change: self.sample_position,
                };
            }

            self.sample_position += 1;
        }
        Ok(())
    }

    /// Renders up to the next `division` boundary, advancing the position.
    pub(crate) fn align_end<S>(
        &mut self,
        source: &mut S,
        sink: &mut OverlapAddSink,
        division: BeatDivision,
    ) -> Result<(), RenderError>
    where
        S: FrameSource + ?Sized,
    {
        let target = align_to_division(
            self.sample_position,
            self.tempo.sample_at_last_change,
            self.tempo.micros_per_beat,
            division.get(),
            self.sample_rate,
        );
        tracing::debug!(
            "Aligning end from sample {} to {} (1/{} notes)",
            self.sample_position,
            target,
            division.get()
        );
        while self.sample_position < target {
            self.pull_frame(source, sink)?;
            self.sample_position += 1;
        }
        Ok(())
    }

    /// Lets sounding voices decay into an overlap region.
    ///
    /// The position does not move; the number of frames rendered becomes
    /// `overlap_samples`.
    pub(crate) fn render_runoff<S>(
        &mut self,
        source: &mut S,
        sink: &mut OverlapAddSink,
        max_frames: u64,
    ) -> Result<(), RenderError>
    where
        S: FrameSource + ?Sized,
    {
        self.flush(sink)?;
        source.silence();
        sink.start_overlap_region()?;

        let mut frames = 0u64;
        while source.active_voice_count() > 0 {
            if frames >= max_frames {
                return Err(RenderError::Synthesis(format!(
                    "{} voices still sounding after {} frames of runoff",
                    source.active_voice_count(),
                    frames
                )));
            }
            self.pull_frame(source, sink)?;
            frames += 1;
        }

        self.flush(sink)?;
        sink.end_overlap_region()?;
        self.overlap_samples = frames;
        tracing::debug!("Runoff lasted {} frames", frames);
        Ok(())
    }
}

/// Outcome of rendering one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub frames: u64,
    pub loop_start: Option<u64>,
    pub loop_length: Option<u64>,
}

impl From<&RenderState> for RenderSummary {
    fn from(state: &RenderState) -> Self {
        Self {
            frames: state.sample_position,
            loop_start: state.loop_point,
            loop_length: state.loop_length(),
        }
    }
}

/// Renders MIDI files to looping Ogg Vorbis streams.
///
/// Cloning is cheap and clones share the loaded sound bank, so a clone can
/// be handed to each worker thread.
#[derive(Clone)]
pub struct Renderer {
    context: SynthesisContext,
    options: RenderOptions,
    max_runoff_seconds: u32,
}

impl Renderer {
    pub fn new(context: SynthesisContext, options: RenderOptions) -> Self {
        Self {
            context,
            options,
            max_runoff_seconds: MAX_RUNOFF_SECONDS,
        }
    }

    pub fn with_max_runoff_seconds(mut self, seconds: u32) -> Self {
        self.max_runoff_seconds = seconds;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn context(&self) -> &SynthesisContext {
        &self.context
    }

    pub fn load_soundfont<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        self.context.load_soundfont(path)
    }

    pub fn has_soundfont(&self) -> bool {
        self.context.has_soundfont()
    }

    fn sample_rate(&self) -> u32 {
        self.context.config().sample_rate
    }

    /// Renders `source_path` to an Ogg Vorbis file at `output_path`.
    ///
    /// The file is written to a `.part` sibling and renamed once complete.
    ///
    /// # Errors
    ///
    /// Returns error if no SoundFont is loaded, the MIDI file cannot be
    /// loaded, synthesis fails, or the output cannot be encoded or written.
    pub fn render_file(
        &self,
        source_path: &Path,
        output_path: &Path,
    ) -> Result<RenderSummary, RenderError> {
        if !self.context.has_soundfont() {
            return Err(RenderError::NoSoundFont);
        }

        tracing::info!("Rendering {}", source_path.display());
        let performance =
            load_performance(source_path).map_err(|source| RenderError::Import {
                path: source_path.to_path_buf(),
                source,
            })?;

        let mut source = self.context.open(Arc::new(performance))?;
        let mut sink = OverlapAddSink::new();
        let state = self.render_song(&mut source, &mut sink)?;
        drop(source);

        let encoder = VorbisStreamEncoder::new(self.sample_rate(), self.options.quality);
        write_stream(sink, &encoder, output_path)?;

        let summary = RenderSummary::from(&state);
        match (summary.loop_start, summary.loop_length) {
            (Some(start), Some(length)) => tracing::info!(
                "Wrote {} ({} frames, loop {} + {})",
                output_path.display(),
                summary.frames,
                start,
                length
            ),
            _ => tracing::info!(
                "Wrote {} ({} frames, no loop)",
                output_path.display(),
                summary.frames
            ),
        }
        Ok(summary)
    }

    /// Runs the full render sequence for one performance into `sink`.
    ///
    /// Loop comments are added to the sink when a loop point was found.
    pub fn render_song<S>(
        &self,
        source: &mut S,
        sink: &mut OverlapAddSink,
    ) -> Result<RenderState, RenderError>
    where
        S: FrameSource + ?Sized,
    {
        let tracker =
            LoopSignalTracker::with_controller(self.options.loop_mode, self.options.loop_controller);
        let mut state = RenderState::new(tracker, source.tempo(), self.sample_rate());
        sink.add_comment("ENCODER", ENCODER_NAME);

        source.start_playback()?;
        state.play_through(source, sink)?;
        source.join()?;

        if let Some(division) = self.options.end_division {
            state.align_end(source, sink, division)?;
        }

        let max_runoff = self.max_runoff_seconds as u64 * self.sample_rate() as u64;
        state.render_runoff(source, sink, max_runoff)?;

        match self.options.loop_mode {
            LoopMode::None => {}
            LoopMode::Short => splice::render_short_loop(&mut state, source, sink)?,
            LoopMode::Double => {
                splice::render_double_loop(&mut state, source, sink, self.options.end_division)?
            }
        }
        source.stop_playback();

        if let (Some(start), Some(length)) = (state.loop_point, state.loop_length()) {
            sink.add_comment("LOOPSTART", start.to_string());
            sink.add_comment("LOOPLENGTH", length.to_string());
        }
        Ok(state)
    }
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn encode_to(
    sink: OverlapAddSink,
    encoder: &dyn StreamEncoder,
    path: &Path,
) -> Result<(), RenderError> {
    let output_error = |source| RenderError::Output {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::new(File::create(path).map_err(output_error)?);
    sink.complete_stream(encoder, |page| writer.write_all(page))?;
    writer.flush().map_err(output_error)
}

/// Encodes `sink` into `output`, leaving no file behind on failure.
pub(crate) fn write_stream(
    sink: OverlapAddSink,
    encoder: &dyn StreamEncoder,
    output: &Path,
) -> Result<(), RenderError> {
    let part = part_path(output);
    if let Err(e) = encode_to(sink, encoder, &part) {
        let _ = fs::remove_file(&part);
        return Err(e);
    }
    fs::rename(&part, output).map_err(|source| RenderError::Output {
        path: output.to_path_buf(),
        source,
    })
}
