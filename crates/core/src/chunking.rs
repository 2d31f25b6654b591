use deunicode::deunicode;

/// How a document's text is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkingStrategy {
    /// Greedily pack blank-line separated paragraphs, seeding each new
    /// chunk with the tail of the previous one.
    Paragraph,
    /// Slice windows of exactly `max_chars`, stepping back `overlap_chars`.
    #[default]
    FixedWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub strategy: ChunkingStrategy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 150,
            strategy: ChunkingStrategy::FixedWindow,
        }
    }
}

impl ChunkingConfig {
    pub fn paragraph() -> Self {
        Self {
            max_chars: 500,
            overlap_chars: 150,
            strategy: ChunkingStrategy::Paragraph,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        match self.strategy {
            ChunkingStrategy::Paragraph => {
                chunk_by_paragraph(text, self.max_chars, self.overlap_chars)
            }
            ChunkingStrategy::FixedWindow => {
                chunk_fixed_window(text, self.max_chars, self.overlap_chars)
            }
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Transliterate to the closest ASCII, collapse whitespace runs and trim.
///
/// Words are folded one at a time: `deunicode` drops control characters
/// such as `\n` and `\t`, which would glue neighbouring words together.
pub fn normalize_text(text: &str) -> String {
    let folded = text
        .split_whitespace()
        .map(deunicode)
        .collect::<Vec<_>>()
        .join(" ");
    normalize_whitespace(&folded)
}

/// [`normalize_text`] applied per paragraph, keeping a blank line between
/// paragraphs so paragraph-aware chunking still sees them.
pub fn normalize_paragraphs(text: &str) -> String {
    split_paragraphs(text)
        .iter()
        .map(|paragraph| normalize_text(paragraph))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Lengths are counted in chars so that accented text is cut where a
/// reader would expect.
pub fn chunk_fixed_window(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let window = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + window).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }

        let stepped_back = end.saturating_sub(overlap_chars);
        start = if stepped_back > start { stepped_back } else { end };
    }

    chunks
}

pub fn chunk_by_paragraph(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0;

    for paragraph in split_paragraphs(text) {
        let paragraph_len = paragraph.chars().count();

        if buffer_len + paragraph_len + 1 <= max_chars {
            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(&paragraph);
        } else {
            // the seed never pushes a paragraph that fits on its own past max_chars
            let seed_len = overlap_chars.min(max_chars.saturating_sub(paragraph_len + 1));
            let seed = tail_chars(&buffer, seed_len);
            if !buffer.is_empty() {
                chunks.push(std::mem::take(&mut buffer));
            }
            buffer = format!("{seed}\n{paragraph}").trim().to_string();
        }

        buffer_len = buffer.chars().count();
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }

    chunks
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut lines, &mut paragraphs);
        } else {
            lines.push(line);
        }
    }
    flush_paragraph(&mut lines, &mut paragraphs);

    paragraphs
}

fn flush_paragraph(lines: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = lines.join("\n").trim().to_string();
    if !paragraph.is_empty() {
        paragraphs.push(paragraph);
    }
    lines.clear();
}

fn tail_chars(text: &str, count: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(count)).collect()
}
