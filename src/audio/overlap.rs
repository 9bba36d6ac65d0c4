//! Overlap-add accumulation in front of the stream encoder.
//!
//! Buffers written in normal mode are committed to the stream. Buffers
//! written inside an overlap region are held back and summed, sample by
//! sample, onto whatever is written next in normal mode. This is how a
//! runoff tail is blended onto the start of the loop instead of being
//! appended after it.

use crate::audio::encoder::{PageWriter, StreamEncoder};
use crate::error::RenderError;
use std::io;

#[derive(Debug, Default, Clone)]
pub struct OverlapAddSink {
    left: Vec<f32>,
    right: Vec<f32>,
    overlap_left: Vec<f32>,
    overlap_right: Vec<f32>,
    in_overlap: bool,
    comments: Vec<(String, String)>,
}

impl OverlapAddSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one stereo buffer.
    ///
    /// # Errors
    ///
    /// Returns error if the channel buffers differ in length.
    pub fn write_buffers(&mut self, left: &[f32], right: &[f32]) -> Result<(), RenderError> {
        if left.len() != right.len() {
            return Err(RenderError::Encoder(format!(
                "channel buffers differ in length ({} vs {})",
                left.len(),
                right.len()
            )));
        }

        if self.in_overlap {
            self.overlap_left.extend_from_slice(left);
            self.overlap_right.extend_from_slice(right);
            return Ok(());
        }

        let merge = left.len().min(self.overlap_left.len());
        self.left.extend(
            self.overlap_left
                .drain(..merge)
                .zip(&left[..merge])
                .map(|(held, new)| held + new),
        );
        self.right.extend(
            self.overlap_right
                .drain(..merge)
                .zip(&right[..merge])
                .map(|(held, new)| held + new),
        );
        self.left.extend_from_slice(&left[merge..]);
        self.right.extend_from_slice(&right[merge..]);
        Ok(())
    }

    /// Begins holding back written buffers.
    ///
    /// Anything still held from an earlier region is committed first, so
    /// regions never stack.
    pub fn start_overlap_region(&mut self) -> Result<(), RenderError> {
        if self.in_overlap {
            return Err(RenderError::Encoder(
                "overlap region is already open".to_string(),
            ));
        }
        self.commit_overlap();
        self.in_overlap = true;
        Ok(())
    }

    /// Stops holding back buffers; what was held waits for the next write.
    pub fn end_overlap_region(&mut self) -> Result<(), RenderError> {
        if !self.in_overlap {
            return Err(RenderError::Encoder("no overlap region is open".to_string()));
        }
        self.in_overlap = false;
        Ok(())
    }

    pub fn is_in_overlap(&self) -> bool {
        self.in_overlap
    }

    /// Frames held back and not yet summed onto anything.
    pub fn pending_overlap(&self) -> usize {
        self.overlap_left.len()
    }

    pub fn add_comment(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.comments.push((tag.into(), value.into()));
    }

    pub fn comments(&self) -> &[(String, String)] {
        &self.comments
    }

    /// Returns the value of the first comment with `tag`.
    pub fn comment(&self, tag: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Committed left and right samples.
    pub fn committed(&self) -> (&[f32], &[f32]) {
        (&self.left, &self.right)
    }

    fn commit_overlap(&mut self) {
        self.left.append(&mut self.overlap_left);
        self.right.append(&mut self.overlap_right);
    }

    /// Commits anything still held, then encodes the whole stream.
    ///
    /// Header pages come first, followed by audio pages; every finished
    /// page is handed to `on_page` in order. Nothing else reaches storage.
    pub fn complete_stream<E, F>(mut self, encoder: &E, on_page: F) -> Result<(), RenderError>
    where
        E: StreamEncoder + ?Sized,
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        self.in_overlap = false;
        self.commit_overlap();

        let mut pages = PageWriter::new(on_page);
        encoder.encode(&self.left, &self.right, &self.comments, &mut pages)
    }
}
