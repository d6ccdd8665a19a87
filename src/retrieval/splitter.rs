//! Divides document content into overlapping chunks bounded by a target
//! character count.

/// One chunk of a document, carrying its character range in the source so
/// the original content can be reconstructed (overlaps removed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct Splitter {
    pub target_size: usize,
    pub overlap: usize,
}

impl Default for Splitter {
    fn default() -> Self {
        Self { target_size: 800, overlap: 100 }
    }
}

impl Splitter {
    pub fn new(target_size: usize, overlap: usize) -> Self {
        assert!(overlap < target_size, "overlap must be smaller than target_size");
        Self { target_size, overlap }
    }

    /// Splits `content` (by character, not byte, so multi-byte UTF-8 text
    /// chunks cleanly) into overlapping [`Chunk`]s.
    pub fn split(&self, content: &str) -> Vec<Chunk> {
        let chars: Vec<char> = content.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        let step = self.target_size - self.overlap;

        while start < chars.len() {
            let end = (start + self.target_size).min(chars.len());
            chunks.push(Chunk { content: chars[start..end].iter().collect(), start, end });
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_content_with_configured_overlap() {
        let splitter = Splitter::new(10, 3);
        let content = "abcdefghijklmnopqrstuvwxyz";
        let chunks = splitter.split(content);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end, "consecutive chunks should overlap");
        }
        assert_eq!(chunks.last().unwrap().end, content.chars().count());
    }

    #[test]
    fn concatenating_chunks_with_overlap_removed_reproduces_source() {
        let splitter = Splitter::new(10, 3);
        let content = "the quick brown fox jumps over the lazy dog";
        let chunks = splitter.split(content);

        let mut reconstructed = String::new();
        for chunk in &chunks {
            let already_covered = reconstructed.chars().count();
            if chunk.start < already_covered {
                let skip = already_covered - chunk.start;
                reconstructed.extend(chunk.content.chars().skip(skip));
            } else {
                reconstructed.push_str(&chunk.content);
            }
        }
        assert_eq!(reconstructed, content);
    }

    #[test]
    fn empty_content_yields_no_chunks() {
        assert!(Splitter::default().split("").is_empty());
    }

    #[test]
    fn content_shorter_than_target_size_yields_one_chunk() {
        let chunks = Splitter::new(100, 10).split("short text");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "short text");
    }
}
