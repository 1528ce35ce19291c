//! Chunking and duplicate-detection helpers for the RAG pipeline (C7).
//! Spec-only: the teacher has no retrieval subsystem, so this module is
//! grounded directly on SPEC_FULL.md §4.7 rather than on teacher code.

/// Default target chunk size, in bytes, before a boundary is sought.
pub const TARGET_CHUNK_SIZE: usize = 1200;
/// Bounded overlap carried from the end of one chunk into the start of the
/// next, so a query phrase that straddles a chunk boundary is still found.
pub const CHUNK_OVERLAP: usize = 200;

pub const MAX_EMBEDDING_BATCH_SIZE: usize = 100;
pub const EMBEDDING_DIMENSIONS: usize = 1024;

/// A span of source text destined to become one [`crate::models::EmbeddingChunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub byte_offset: usize,
    pub byte_length: usize,
}

/// Split `text` into chunks of roughly `TARGET_CHUNK_SIZE` bytes, preferring
/// to break on a blank line (paragraph boundary) or a code-fence line
/// (```), and otherwise falling back to the nearest whitespace before the
/// target size. Adjacent chunks share up to `CHUNK_OVERLAP` bytes so a
/// match spanning the seam is still retrievable from either chunk.
pub fn chunk_text(text: &str) -> Vec<TextChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let boundaries = boundary_offsets(text);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let ideal_end = (start + TARGET_CHUNK_SIZE).min(text.len());
        let end = if ideal_end >= text.len() {
            text.len()
        } else {
            pick_boundary(&boundaries, start, ideal_end, text)
        };

        let slice = &text[start..end];
        chunks.push(TextChunk {
            text: slice.to_string(),
            byte_offset: start,
            byte_length: slice.len(),
        });

        if end >= text.len() {
            break;
        }
        let next_start = end.saturating_sub(CHUNK_OVERLAP);
        // Ensure forward progress even if overlap would otherwise stall.
        start = if next_start > start { next_start } else { end };
    }

    chunks
}

/// Byte offsets of candidate break points: blank lines and code-fence
/// delimiters, in ascending order.
fn boundary_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut pos = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n').trim();
        if trimmed.is_empty() || trimmed.starts_with("```") {
            offsets.push(pos + line.len());
        }
        pos += line.len();
    }
    offsets
}

/// Choose the boundary closest to, but not past, `ideal_end`, falling back
/// to the nearest preceding whitespace, and finally to `ideal_end` itself.
fn pick_boundary(boundaries: &[usize], start: usize, ideal_end: usize, text: &str) -> usize {
    if let Some(&best) = boundaries
        .iter()
        .filter(|&&b| b > start && b <= ideal_end)
        .last()
    {
        return best;
    }
    match text[start..ideal_end].rfind(char::is_whitespace) {
        Some(rel) if rel > 0 => start + rel + 1,
        _ => ideal_end,
    }
}

/// Whether a candidate new task duplicates existing indexed content closely
/// enough to warrant surfacing it to the caller, per the task-placement
/// hook's `TASK_DUPLICATION_THRESHOLD`.
pub fn exceeds_duplication_threshold(similarity: f32, threshold: f32) -> bool {
    similarity > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("").is_empty());
    }

    #[test]
    fn short_text_yields_one_chunk() {
        let chunks = chunk_text("a short document");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a short document");
        assert_eq!(chunks[0].byte_offset, 0);
    }

    #[test]
    fn long_text_is_split_into_multiple_overlapping_chunks() {
        let paragraph = "word ".repeat(50);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let chunks = chunk_text(&text);
        assert!(chunks.len() >= 2);
        for w in chunks.windows(2) {
            assert!(w[1].byte_offset <= w[0].byte_offset + w[0].byte_length);
        }
    }

    #[test]
    fn chunks_cover_the_whole_input_without_gaps() {
        let text = "line one\nline two\n\nline three\nline four";
        let chunks = chunk_text(text);
        let last = chunks.last().unwrap();
        assert_eq!(last.byte_offset + last.byte_length, text.len());
    }

    #[test]
    fn duplication_threshold_is_strict_greater_than() {
        assert!(!exceeds_duplication_threshold(0.8, 0.8));
        assert!(exceeds_duplication_threshold(0.81, 0.8));
    }
}
