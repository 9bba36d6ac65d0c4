//! Ogg Vorbis encoding of the finished stream.

use crate::error::RenderError;
use std::io::{self, Write};
use std::num::{NonZeroU32, NonZeroU8};
use vorbis_rs::{VorbisBitrateManagementStrategy, VorbisEncoderBuilder};

/// Value written to the `ENCODER` comment.
pub const ENCODER_NAME: &str = concat!("midiloop ", env!("CARGO_PKG_VERSION"));

/// Default variable-bitrate quality, on the libvorbis -0.1..=1.0 scale.
pub const DEFAULT_QUALITY: f32 = 0.4;

/// Frames handed to the encoder per analysis call.
const WRITE_CHUNK: usize = 1024;

/// Turns committed stereo samples into a compressed byte stream.
pub trait StreamEncoder {
    /// Encodes the whole stream into `out`.
    ///
    /// Header pages, comments included, are written before any audio page.
    fn encode(
        &self,
        left: &[f32],
        right: &[f32],
        comments: &[(String, String)],
        out: &mut dyn Write,
    ) -> Result<(), RenderError>;
}

/// Stereo Ogg Vorbis in quality-based VBR mode.
#[derive(Debug, Clone, Copy)]
pub struct VorbisStreamEncoder {
    sample_rate: u32,
    quality: f32,
}

impl VorbisStreamEncoder {
    pub fn new(sample_rate: u32, quality: f32) -> Self {
        Self {
            sample_rate,
            quality,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }
}

fn encoder_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Encoder(e.to_string())
}

impl StreamEncoder for VorbisStreamEncoder {
    fn encode(
        &self,
        left: &[f32],
        right: &[f32],
        comments: &[(String, String)],
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        if left.len() != right.len() {
            return Err(RenderError::Encoder(
                "channel buffers differ in length".to_string(),
            ));
        }
        let sample_rate = NonZeroU32::new(self.sample_rate)
            .ok_or_else(|| RenderError::Encoder("sample rate must be non-zero".to_string()))?;
        let channels = NonZeroU8::new(2)
            .ok_or_else(|| RenderError::Encoder("invalid channel count".to_string()))?;

        let mut builder =
            VorbisEncoderBuilder::new(sample_rate, channels, out).map_err(encoder_error)?;
        builder.bitrate_management_strategy(VorbisBitrateManagementStrategy::QualityVbr {
            target_quality: self.quality,
        });
        for (tag, value) in comments {
            builder.comment_tag(tag, value);
        }

        let mut encoder = builder.build().map_err(encoder_error)?;
        for (l, r) in left.chunks(WRITE_CHUNK).zip(right.chunks(WRITE_CHUNK)) {
            encoder.encode_audio_block([l, r]).map_err(encoder_error)?;
        }
        encoder.finish().map_err(encoder_error)?;

        tracing::debug!(
            "Encoded {} frames at quality {}",
            left.len(),
            self.quality
        );
        Ok(())
    }
}

/// Adapts a page callback to `Write`.
///
/// Bytes arrive from the encoder one finished page at a time and are
/// forwarded unchanged.
pub struct PageWriter<F> {
    on_page: F,
    written: u64,
}

impl<F> PageWriter<F>
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    pub fn new(on_page: F) -> Self {
        Self {
            on_page,
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<F> Write for PageWriter<F>
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (self.on_page)(buf)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_writer_forwards_bytes() {
        let mut pages: Vec<Vec<u8>> = Vec::new();
        let mut writer = PageWriter::new(|page: &[u8]| {
            pages.push(page.to_vec());
            Ok(())
        });
        writer.write_all(b"abc").unwrap();
        writer.write_all(b"de").unwrap();
        assert_eq!(writer.bytes_written(), 5);
        drop(writer);
        assert_eq!(pages.concat(), b"abcde");
    }

    #[test]
    fn test_page_writer_propagates_errors() {
        let mut writer =
            PageWriter::new(|_: &[u8]| Err(io::Error::new(io::ErrorKind::Other, "disk full")));
        assert!(writer.write_all(b"abc").is_err());
    }

    #[test]
    fn test_vorbis_stream_starts_with_ogg_capture() {
        let left: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.05).sin() * 0.25).collect();
        let right = left.clone();
        let comments = vec![
            ("ENCODER".to_string(), ENCODER_NAME.to_string()),
            ("LOOPSTART".to_string(), "128".to_string()),
        ];

        let mut bytes = Vec::new();
        VorbisStreamEncoder::new(44100, DEFAULT_QUALITY)
            .encode(&left, &right, &comments, &mut bytes)
            .unwrap();

        assert_eq!(&bytes[..4], b"OggS");
        let haystack = String::from_utf8_lossy(&bytes);
        assert!(haystack.contains("LOOPSTART=128"));
    }

    #[test]
    fn test_vorbis_rejects_mismatched_channels() {
        let mut bytes = Vec::new();
        let result = VorbisStreamEncoder::new(44100, DEFAULT_QUALITY).encode(
            &[0.0; 10],
            &[0.0; 9],
            &[],
            &mut bytes,
        );
        assert!(result.is_err());
    }
}
