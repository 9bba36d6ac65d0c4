//! Offline synthesis engine.
//!
//! Provides the sound bank shared across files ([`SynthesisContext`]) and
//! the per-file frame source ([`SongRenderer`]) that drives a rustysynth
//! synthesizer from a sample-clocked sequence player.

use crate::audio::source::FrameSource;
use crate::error::{ConfigError, RenderError};
use crate::midi::{EventKind, EventVisitor, Performance, SequencePlayer, TimedEvent};
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sample rate for audio synthesis (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

/// Synthesis block size. Events are dispatched once per block.
pub const BLOCK_SIZE: usize = 64;

/// Peak level at or below which a rendered block counts as silent.
pub const SILENCE_THRESHOLD: f32 = 1.0e-5;

/// Consecutive silent blocks after which a backend without a voice count
/// is reported as idle.
pub const QUIET_BLOCKS_BEFORE_IDLE: usize = 8;

/// Synthesis settings shared by every file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub maximum_polyphony: usize,
    /// Off by default; the effect tails would smear the loop seam.
    pub enable_reverb_and_chorus: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            block_size: BLOCK_SIZE,
            maximum_polyphony: 256,
            enable_reverb_and_chorus: false,
        }
    }
}

impl SynthesisConfig {
    fn settings(&self) -> SynthesizerSettings {
        let mut settings = SynthesizerSettings::new(self.sample_rate as i32);
        settings.block_size = self.block_size;
        settings.maximum_polyphony = self.maximum_polyphony;
        settings.enable_reverb_and_chorus = self.enable_reverb_and_chorus;
        settings
    }
}

/// The operations the renderer needs from a synthesizer.
pub trait SynthBackend {
    fn process_midi_message(&mut self, channel: i32, command: i32, data1: i32, data2: i32);
    fn note_off_all(&mut self, immediate: bool);
    fn render(&mut self, left: &mut [f32], right: &mut [f32]);

    /// Number of sounding voices, if the backend can tell.
    ///
    /// Backends returning `None` are judged by their output instead: they
    /// are idle once [`QUIET_BLOCKS_BEFORE_IDLE`] blocks in a row stayed at
    /// or below [`SILENCE_THRESHOLD`].
    fn active_voice_count(&self) -> Option<usize> {
        None
    }

    /// Returns every channel and voice to its initial state.
    fn reset(&mut self);
}

impl SynthBackend for Synthesizer {
    fn process_midi_message(&mut self, channel: i32, command: i32, data1: i32, data2: i32) {
        Synthesizer::process_midi_message(self, channel, command, data1, data2);
    }

    fn note_off_all(&mut self, immediate: bool) {
        Synthesizer::note_off_all(self, immediate);
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        Synthesizer::render(self, left, right);
    }

    // rustysynth does not expose its voice count, so idleness comes from the output.

    fn reset(&mut self) {
        Synthesizer::reset(self);
    }
}

/// Checks for a RIFF file of form type `sfbk`.
pub fn is_soundfont<P: AsRef<Path>>(path: P) -> bool {
    let mut header = [0u8; 12];
    match File::open(path.as_ref()) {
        Ok(mut file) => {
            file.read_exact(&mut header).is_ok() && &header[0..4] == b"RIFF" && &header[8..12] == b"sfbk"
        }
        Err(_) => false,
    }
}

/// Sound bank and synthesis settings reused across files.
///
/// Cloning is cheap; clones share the loaded sound bank.
#[derive(Clone)]
pub struct SynthesisContext {
    config: SynthesisConfig,
    soundfont: Option<Arc<SoundFont>>,
    soundfont_path: Option<PathBuf>,
}

impl SynthesisContext {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            config,
            soundfont: None,
            soundfont_path: None,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Validates and loads a SoundFont, replacing any loaded one.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SoundFont file (.sf2)
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The file is missing or is not a SoundFont
    /// - The SoundFont cannot be parsed
    pub fn load_soundfont<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !is_soundfont(path) {
            return Err(ConfigError::InvalidSoundFont(path.to_path_buf()));
        }

        let mut file = BufReader::new(File::open(path).map_err(|e| ConfigError::SoundFontLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?);
        let soundfont = SoundFont::new(&mut file).map_err(|e| ConfigError::SoundFontLoad {
            path: path.to_path_buf(),
            reason: format!("{:?}", e),
        })?;

        tracing::debug!("Loaded SoundFont {}", path.display());
        self.soundfont = Some(Arc::new(soundfont));
        self.soundfont_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn has_soundfont(&self) -> bool {
        self.soundfont.is_some()
    }

    pub fn soundfont_path(&self) -> Option<&Path> {
        self.soundfont_path.as_deref()
    }

    /// Creates a synthesizer in its initial state.
    pub fn new_synthesizer(&self) -> Result<Synthesizer, RenderError> {
        let soundfont = self.soundfont.as_ref().ok_or(RenderError::NoSoundFont)?;
        Synthesizer::new(soundfont, &self.config.settings())
            .map_err(|e| RenderError::SynthesizerInit(format!("{:?}", e)))
    }

    /// Binds a performance to a fresh synthesizer.
    pub fn open(&self, performance: Arc<Performance>) -> Result<SongRenderer, RenderError> {
        let synth = self.new_synthesizer()?;
        Ok(SongRenderer::new(
            synth,
            performance,
            self.config.sample_rate,
            self.config.block_size,
        ))
    }
}

fn apply_event<S: SynthBackend>(synth: &mut S, event: &TimedEvent) {
    if let EventKind::Channel { channel, message } = event.kind {
        let (command, data1, data2) = message.to_raw();
        synth.process_midi_message(channel as i32, command, data1, data2);
    }
}

/// Frame source for one file: a synthesizer, the performance it plays and
/// the transport walking that performance.
///
/// The synthesizer always renders whole blocks into an internal buffer;
/// frames are served from that buffer and the player dispatches events
/// right before each new block is computed. The player clock therefore
/// starts with the first block rendered after `start_playback`.
pub struct SongRenderer<S: SynthBackend = Synthesizer> {
    synth: S,
    performance: Arc<Performance>,
    player: SequencePlayer,
    sample_rate: u32,
    block_size: usize,
    block_left: Vec<f32>,
    block_right: Vec<f32>,
    /// Frames of the current block already served; `block_size` means empty.
    block_read: usize,
    /// Silent blocks rendered in a row.
    quiet_blocks: usize,
}

impl<S: SynthBackend> SongRenderer<S> {
    pub fn new(synth: S, performance: Arc<Performance>, sample_rate: u32, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            synth,
            player: SequencePlayer::new(Arc::clone(&performance), sample_rate),
            performance,
            sample_rate,
            block_size,
            block_left: vec![0.0; block_size],
            block_right: vec![0.0; block_size],
            block_read: block_size,
            quiet_blocks: 0,
        }
    }

    pub fn performance(&self) -> &Arc<Performance> {
        &self.performance
    }

    pub fn player(&self) -> &SequencePlayer {
        &self.player
    }

    fn render_block(&mut self, visitor: &mut dyn EventVisitor) -> Result<(), RenderError> {
        let synth = &mut self.synth;
        self.player
            .advance(self.block_size as u64, visitor, |event| apply_event(&mut *synth, event));

        self.synth.render(&mut self.block_left, &mut self.block_right);
        if self
            .block_left
            .iter()
            .chain(self.block_right.iter())
            .any(|s| !s.is_finite())
        {
            return Err(RenderError::Synthesis(format!(
                "non-finite sample near tick {}",
                self.player.current_tick()
            )));
        }

        let peak = self
            .block_left
            .iter()
            .chain(self.block_right.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()));
        if peak <= SILENCE_THRESHOLD {
            self.quiet_blocks += 1;
        } else {
            self.quiet_blocks = 0;
        }

        self.block_read = 0;
        Ok(())
    }
}

impl<S: SynthBackend> FrameSource for SongRenderer<S> {
    fn start_playback(&mut self) -> Result<(), RenderError> {
        if !self.player.play() {
            return Err(RenderError::Transport(format!(
                "cannot start playback of {} from state {:?}",
                self.performance.name(),
                self.player.status()
            )));
        }
        // Frames already computed belong to the previous transport.
        self.block_read = self.block_size;
        Ok(())
    }

    fn stop_playback(&mut self) {
        self.player.stop();
    }

    fn join(&mut self) -> Result<(), RenderError> {
        if self.player.is_playing() {
            return Err(RenderError::Transport(
                "cannot join a transport that is still playing".to_string(),
            ));
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    fn tempo(&self) -> u32 {
        self.player.tempo()
    }

    fn active_voice_count(&self) -> usize {
        match self.synth.active_voice_count() {
            Some(count) => count,
            None if self.quiet_blocks >= QUIET_BLOCKS_BEFORE_IDLE => 0,
            None => 1,
        }
    }

    fn internal_buffer_size(&self) -> usize {
        self.block_size
    }

    fn render_frames(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        visitor: &mut dyn EventVisitor,
    ) -> Result<(), RenderError> {
        if left.len() != right.len() {
            return Err(RenderError::Synthesis(format!(
                "channel buffers differ in length ({} vs {})",
                left.len(),
                right.len()
            )));
        }

        let mut written = 0;
        while written < left.len() {
            if self.block_read == self.block_size {
                self.render_block(visitor)?;
            }
            let count = (left.len() - written).min(self.block_size - self.block_read);
            let block = self.block_read..self.block_read + count;
            left[written..written + count].copy_from_slice(&self.block_left[block.clone()]);
            right[written..written + count].copy_from_slice(&self.block_right[block]);
            self.block_read += count;
            written += count;
        }
        Ok(())
    }

    fn silence(&mut self) {
        self.synth.note_off_all(false);
    }

    fn flush_pipeline(&mut self, visitor: &mut dyn EventVisitor) -> Result<(), RenderError> {
        let discard = self.block_size - (self.block_read % self.block_size);
        let mut left = vec![0.0; discard];
        let mut right = vec![0.0; discard];
        self.render_frames(&mut left, &mut right, visitor)
    }

    fn restart_transport(&mut self) {
        self.player.stop();
        self.player = SequencePlayer::new(Arc::clone(&self.performance), self.sample_rate);
    }

    fn reset_with_new_performance(&mut self) -> Result<(), RenderError> {
        self.synth.note_off_all(true);
        self.synth.reset();
        self.block_read = self.block_size;
        self.quiet_blocks = 0;
        self.restart_transport();
        Ok(())
    }
}
