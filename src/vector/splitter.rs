//! Recursive character text splitter

/// Splits text into chunks no longer than `chunk_size` characters
///
/// Tries paragraph breaks first, then line breaks, then spaces, and falls
/// back to hard character cuts. Consecutive chunks share up to
/// `chunk_overlap` trailing characters of the previous chunk.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks; empty input yields no chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        self.split_pieces(text, 0, &mut pieces);
        self.merge(pieces)
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    /// Break `text` into pieces each at most `chunk_size` long
    fn split_pieces(&self, text: &str, level: usize, out: &mut Vec<String>) {
        if Self::char_len(text) <= self.chunk_size {
            out.push(text.to_string());
            return;
        }

        let Some(sep) = SEPARATORS.get(level) else {
            // No separator left: hard cut by characters
            let chars: Vec<char> = text.chars().collect();
            for chunk in chars.chunks(self.chunk_size) {
                out.push(chunk.iter().collect());
            }
            return;
        };

        let parts: Vec<&str> = text.split(sep).collect();
        if parts.len() == 1 {
            self.split_pieces(text, level + 1, out);
            return;
        }

        let last = parts.len() - 1;
        for (i, part) in parts.into_iter().enumerate() {
            // Keep the separator attached so merged chunks read naturally
            let piece = if i < last {
                format!("{}{}", part, sep)
            } else {
                part.to_string()
            };
            if piece.is_empty() {
                continue;
            }
            self.split_pieces(&piece, level + 1, out);
        }
    }

    /// Greedily merge pieces into chunks, carrying an overlap tail
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            if !current.is_empty()
                && Self::char_len(&current) + Self::char_len(&piece) > self.chunk_size
            {
                let tail = self.overlap_tail(&current);
                chunks.push(std::mem::take(&mut current));
                if Self::char_len(&tail) + Self::char_len(&piece) <= self.chunk_size {
                    current = tail;
                }
            }
            current.push_str(&piece);
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn overlap_tail(&self, chunk: &str) -> String {
        if self.chunk_overlap == 0 {
            return String::new();
        }
        let len = Self::char_len(chunk);
        chunk
            .chars()
            .skip(len.saturating_sub(self.chunk_overlap))
            .collect()
    }
}
