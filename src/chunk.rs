//! Overlapping fixed-size text chunker.
//!
//! Splits extracted document text into windows of at most `size` characters
//! where each window repeats the last `overlap` characters of its predecessor.
//! Window ends are moved back to a natural boundary when one is available
//! (paragraph break, then line break, then whitespace), otherwise the window
//! is cut mid-word at exactly `size` characters.
//!
//! Dropping the first `overlap` characters of every chunk after the first and
//! concatenating reproduces the input exactly.

use crate::error::{RagError, Result};

/// Chunk window parameters. Sizes are counted in `char`s, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with [`RagError::InvalidConfiguration`] unless `size > 0` and
    /// `overlap < size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk size must be > 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily split `text`. Calling this again (or cloning the iterator)
    /// restarts the sequence from the beginning.
    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            size: self.size,
            overlap: self.overlap,
            start: 0,
            done: text.is_empty(),
        }
    }
}

/// Convenience wrapper: validate parameters and split in one call.
pub fn split(text: &str, size: usize, overlap: usize) -> Result<Chunks<'_>> {
    Ok(Chunker::new(size, overlap)?.split(text))
}

/// Iterator over the chunks of one text. See [`Chunker::split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    size: usize,
    overlap: usize,
    /// Byte offset where the next chunk starts.
    start: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.start..];

        // Byte offset of the first char past the window; none means the
        // remainder fits and this is the last chunk.
        let window_end = match rest.char_indices().nth(self.size) {
            Some((idx, _)) => idx,
            None => {
                self.done = true;
                return Some(rest);
            }
        };

        // A cut must keep more than `overlap` chars or the next window
        // would start where this one did.
        let floor = rest
            .char_indices()
            .nth(self.overlap + 1)
            .map_or(window_end, |(idx, _)| idx);

        let cut = natural_break(&rest[..window_end], floor).unwrap_or(window_end);
        let piece = &rest[..cut];

        let advance_chars = piece.chars().count() - self.overlap;
        let advance = piece
            .char_indices()
            .nth(advance_chars)
            .map_or(piece.len(), |(idx, _)| idx);
        self.start += advance;

        Some(piece)
    }
}

/// Latest natural break in `window` that is at or after `floor`, as a byte
/// offset just past the separator.
fn natural_break(window: &str, floor: usize) -> Option<usize> {
    let at_least = |pos: usize| if pos >= floor { Some(pos) } else { None };

    if let Some(pos) = window.rfind("\n\n").and_then(|idx| at_least(idx + 2)) {
        return Some(pos);
    }
    if let Some(pos) = window.rfind('\n').and_then(|idx| at_least(idx + 1)) {
        return Some(pos);
    }
    window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .and_then(|(idx, c)| at_least(idx + c.len_utf8()))
}
