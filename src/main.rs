//! midiloop - Renders MIDI files to looping Ogg Vorbis streams.
//!
//! Every input is rendered with the given SoundFont. When looping is
//! enabled, a control change 111 in the file marks where the loop starts;
//! the output carries `LOOPSTART` and `LOOPLENGTH` comments (in samples) so
//! players can loop it without a gap.
//!
//! # Usage
//!
//! ```bash
//! midiloop -f bank.sf2 song.mid
//! midiloop -f bank.sf2 --loop --end-on-division 4 -d out "music/*/*.mid"
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use midiloop::audio::encoder::DEFAULT_QUALITY;
use midiloop::paths::{collect_inputs, output_path_for};
use midiloop::{
    BeatDivision, ConfigError, LoopMode, RenderOptions, Renderer, SynthesisConfig,
    SynthesisContext,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Command-line options.
#[derive(Parser)]
#[command(
    name = "midiloop",
    version,
    about = "Renders MIDI files to seamlessly looping Ogg Vorbis files."
)]
struct Cli {
    /// MIDI files to render. `*` is expanded in any path component.
    #[arg(required = true)]
    files: Vec<String>,

    /// SoundFont (.sf2) used for every file.
    #[arg(short = 'f', long)]
    soundfont: PathBuf,

    /// Directory to write into. Defaults to next to each input.
    #[arg(short, long)]
    destination: Option<PathBuf>,

    /// Loop from the loop marker. Same as `--loop-mode short`.
    #[arg(long = "loop")]
    looping: bool,

    /// How to build the loop: none, short or double.
    #[arg(long, value_name = "MODE")]
    loop_mode: Option<LoopMode>,

    /// End the song on the next 1/N note boundary (N a power of two up to 64).
    #[arg(long, value_name = "N")]
    end_on_division: Option<BeatDivision>,

    /// Vorbis quality, from -0.1 to 1.0.
    #[arg(long, default_value_t = DEFAULT_QUALITY, allow_negative_numbers = true)]
    quality: f32,

    /// Files rendered in parallel. Defaults to one per core.
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl Cli {
    fn render_options(&self) -> Result<RenderOptions, ConfigError> {
        let loop_mode = match (self.loop_mode, self.looping) {
            (Some(mode), _) => mode,
            (None, true) => LoopMode::Short,
            (None, false) => LoopMode::None,
        };
        let options = RenderOptions {
            loop_mode,
            end_division: self.end_on_division,
            quality: self.quality,
            ..RenderOptions::default()
        };
        options.validate()?;
        Ok(options)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = cli.render_options()?;
    if let Some(dir) = &cli.destination {
        if !dir.is_dir() {
            return Err(ConfigError::MissingOutputDirectory(dir.clone()).into());
        }
    }

    let mut context = SynthesisContext::new(SynthesisConfig::default());
    context
        .load_soundfont(&cli.soundfont)
        .context("Failed to load SoundFont")?;
    let renderer = Renderer::new(context, options);

    let inputs = collect_inputs(&cli.files);
    if inputs.is_empty() {
        bail!("No MIDI files to render");
    }

    let failed = render_all(&renderer, &inputs, cli.destination.as_deref(), cli.jobs)?;
    if failed > 0 {
        bail!("{} of {} files failed to render", failed, inputs.len());
    }
    Ok(())
}

/// Renders one file, reporting any failure. Returns true on success.
fn render_one(renderer: &Renderer, input: &Path, destination: Option<&Path>) -> bool {
    let output = output_path_for(input, destination);
    match renderer.render_file(input, &output) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Failed to render {}: {}", input.display(), e);
            false
        }
    }
}

/// Renders every input on a worker pool and returns the number of failures.
///
/// Each worker renders with its own clone of the renderer; clones share the
/// loaded SoundFont.
fn render_all(
    renderer: &Renderer,
    inputs: &[PathBuf],
    destination: Option<&Path>,
    jobs: Option<usize>,
) -> Result<usize> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("Failed to start worker threads")?;

    let results: Vec<bool> = pool.install(|| {
        inputs
            .par_iter()
            .map_init(
                || renderer.clone(),
                |renderer, input| render_one(renderer, input, destination),
            )
            .collect()
    });

    let failed = results.iter().filter(|ok| !**ok).count();
    tracing::info!(
        "Rendered {} of {} files",
        results.len() - failed,
        results.len()
    );
    Ok(failed)
}
