
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chunk_size: usize,
    /// Number of characters shared by adjacent chunks, must be below `max_chunk_size`
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap_size: 200,
        }
    }
}

impl ChunkingConfig {
    /// Split `text` into owned chunks using this configuration
    #[inline]
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let chunks: Vec<String> = chunk(text, self.max_chunk_size, self.overlap_size)
            .map(str::to_owned)
            .collect();

        debug!(
            "Chunked {} characters into {} chunks (max {}, overlap {})",
            text.chars().count(),
            chunks.len(),
            self.max_chunk_size,
            self.overlap_size
        );

        chunks
    }
}

/// Lazy iterator over the chunks of a text.
///
/// Every chunk holds at most `max_size` characters and each chunk after the
/// first begins with the last `overlap` characters of its predecessor, so
/// dropping those leading characters and concatenating reconstructs the
/// (trimmed) input exactly. Cloning the iterator restarts from its current
/// position.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` as a sentinel
    offsets: Vec<usize>,
    start: usize,
    max_size: usize,
    overlap: usize,
    finished: bool,
}

/// Split `text` into overlapping chunks of at most `max_size` characters.
///
/// Surrounding whitespace is trimmed first. `overlap` is clamped below
/// `max_size` and `max_size` to at least one character.
#[inline]
pub fn chunk(text: &str, max_size: usize, overlap: usize) -> Chunks<'_> {
    let text = text.trim();
    let max_size = max_size.max(1);
    let overlap = overlap.min(max_size - 1);

    let offsets = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();

    Chunks {
        text,
        offsets,
        start: 0,
        max_size,
        overlap,
        finished: text.is_empty(),
    }
}

impl<'a> Chunks<'a> {
    fn char_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn char_at(&self, index: usize) -> Option<char> {
        self.offsets
            .get(index)
            .and_then(|&offset| self.text.get(offset..))
            .and_then(|rest| rest.chars().next())
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        let text: &'a str = self.text;
        &text[self.offsets[start]..self.offsets[end]]
    }

    /// Pick the end of the window starting at `self.start`.
    ///
    /// Candidates lie in the latter half of the window and strictly after
    /// `start + overlap`, so the next window always advances.
    fn find_break(&self, hard_end: usize) -> usize {
        let lowest = (self.start + self.overlap + 1).max(self.start + self.max_size / 2);
        if lowest >= hard_end {
            return hard_end;
        }

        let sentence_end = (lowest..=hard_end).rev().find(|&end| {
            match (self.char_at(end - 1), self.char_at(end)) {
                (Some('\n'), _) => true,
                (Some('.' | '!' | '?'), Some(next)) => next.is_whitespace(),
                _ => false,
            }
        });
        if let Some(end) = sentence_end {
            return end;
        }

        (lowest..=hard_end)
            .rev()
            .find(|&end| self.char_at(end).is_some_and(char::is_whitespace))
            .unwrap_or(hard_end)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let total = self.char_count();
        let hard_end = (self.start + self.max_size).min(total);

        if hard_end == total {
            self.finished = true;
            return Some(self.slice(self.start, total));
        }

        let end = self.find_break(hard_end);
        let piece = self.slice(self.start, end);
        self.start = end - self.overlap;
        Some(piece)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Rebuild the chunked text by dropping each later chunk's leading overlap
#[inline]
pub fn reconstruct<S: AsRef<str>>(chunks: &[S], overlap: usize) -> String {
    let mut text = String::new();
    for (i, piece) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(piece.as_ref());
        } else {
            text.extend(piece.as_ref().chars().skip(overlap));
        }
    }
    text
}
