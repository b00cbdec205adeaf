/// Break points tried in order when a window has to be cut early.
const SEPARATORS: &[&str] = &["\n\n", "\n", "。", ". ", " "];

/// A chunk of a page plus its character offset within that page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub start_index: usize,
}

/// Character-window splitter with overlap.
///
/// Windows are measured in chars, not bytes. A window that would cut mid-text
/// is shortened to the last paragraph, line or sentence break found in its
/// second half.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < len {
            let hard_end = (start + self.chunk_size).min(len);
            let end = if hard_end == len {
                len
            } else {
                self.break_point(&chars, start, hard_end)
            };

            let lead = chars[start..end]
                .iter()
                .take_while(|c| c.is_whitespace())
                .count();
            let body: String = chars[start + lead..end].iter().collect();
            let body = body.trim_end();
            if !body.is_empty() {
                chunks.push(TextChunk {
                    text: body.to_string(),
                    start_index: start + lead,
                });
            }

            if end == len {
                break;
            }
            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    fn break_point(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + self.chunk_size / 2;
        for sep in SEPARATORS {
            let sep: Vec<char> = sep.chars().collect();
            if hard_end < floor + sep.len() {
                continue;
            }
            let found = (floor..=hard_end - sep.len())
                .rev()
                .find(|&i| chars[i..i + sep.len()] == sep[..]);
            if let Some(pos) = found {
                return pos + sep.len();
            }
        }
        hard_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = TextSplitter::new(500, 100).split("  a short page  ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a short page");
        assert_eq!(chunks[0].start_index, 2);
    }

    #[test]
    fn test_windows_overlap_without_separators() {
        let text = "abcdefghijklmnopqrstuvwxy";
        let chunks = TextSplitter::new(10, 3).split(text);
        let starts: Vec<usize> = chunks.iter().map(|c| c.start_index).collect();
        assert_eq!(starts, vec![0, 7, 14, 21]);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(chunks[3].text, "vwxy");
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let text = "aaaa bbbb cccc\n\ndddd eeee ffff gggg";
        let chunks = TextSplitter::new(20, 5).split(text);
        assert_eq!(chunks[0].text, "aaaa bbbb cccc");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 20));
        assert!(chunks.last().unwrap().text.ends_with("gggg"));
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let text = "花果山水帘洞美猴王".repeat(10);
        let chunks = TextSplitter::new(30, 5).split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 30));
    }

    #[test]
    fn test_empty_and_blank_text() {
        let splitter = TextSplitter::new(50, 10);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   \n\n  ").is_empty());
    }
}
