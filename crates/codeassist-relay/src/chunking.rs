/// How a provider's complete (non-streamed) answer is cut into `data` events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkingStrategy {
    /// Pieces of at most `n` characters, in order.
    FixedSize(usize),
    /// The whole answer as a single piece.
    Disabled,
}

/// Chunk size used when nothing else is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

impl Default for ChunkingStrategy {
    fn default() -> Self {
        Self::FixedSize(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkingStrategy {
    /// A zero size disables chunking.
    pub fn fixed_size(n: usize) -> Self {
        if n == 0 { Self::Disabled } else { Self::FixedSize(n) }
    }

    pub fn disabled() -> Self {
        Self::Disabled
    }

    /// Splits `text` into pieces whose concatenation is exactly `text`.
    ///
    /// Sizes count `char`s, so a piece never ends inside a code point.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let size = match *self {
            Self::FixedSize(n) if n > 0 => n,
            _ => return vec![text.to_string()],
        };

        let mut pieces = Vec::with_capacity(text.len() / size + 1);
        let mut start = 0;
        let mut count = 0;
        for (idx, _) in text.char_indices() {
            if count == size {
                pieces.push(text[start..idx].to_string());
                start = idx;
                count = 0;
            }
            count += 1;
        }
        pieces.push(text[start..].to_string());
        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_size_reassembles_exactly() {
        let text = "fn main() { println!(\"hello, world\"); }\n// trailing";
        let pieces = ChunkingStrategy::default().split(text);
        assert!(pieces.iter().all(|p| p.chars().count() <= DEFAULT_CHUNK_SIZE));
        assert_eq!(pieces[0], "fn main() { println!");
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn multibyte_characters_are_never_split() {
        let text = "héllo wörld ✓✓✓";
        let pieces = ChunkingStrategy::fixed_size(4).split(text);
        assert_eq!(pieces, vec!["héll", "o wö", "rld ", "✓✓✓"]);
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let pieces = ChunkingStrategy::fixed_size(3).split("abcdef");
        assert_eq!(pieces, vec!["abc", "def"]);
    }

    #[test]
    fn disabled_and_empty() {
        assert_eq!(ChunkingStrategy::disabled().split("whole"), vec!["whole"]);
        assert_eq!(ChunkingStrategy::fixed_size(0), ChunkingStrategy::Disabled);
        assert!(ChunkingStrategy::default().split("").is_empty());
    }
}
