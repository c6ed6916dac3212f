//! Byte offset to line/column lookup.

/// Newline positions of a text, for O(log n) offset → line queries.
#[derive(Debug, Clone)]
pub struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let newlines = text
            .bytes()
            .enumerate()
            .filter_map(|(offset, byte)| (byte == b'\n').then_some(offset))
            .collect();
        Self { newlines }
    }

    /// 1-based line of the byte at `offset`: the number of newlines strictly
    /// before it, plus one.
    pub fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }

    /// Byte offset at which 1-based `line` starts.
    pub fn line_start(&self, line: usize) -> usize {
        match line {
            0 | 1 => 0,
            n => self.newlines.get(n - 2).map_or(usize::MAX, |nl| nl + 1),
        }
    }

    /// 1-based (line, column) of `offset`; the column counts characters.
    pub fn line_col(&self, text: &str, offset: usize) -> (usize, usize) {
        let line = self.line_of(offset);
        let start = self.line_start(line).min(text.len());
        let end = offset.min(text.len());
        let column = text
            .get(start..end)
            .map_or(end - start, |prefix| prefix.chars().count());
        (line, column + 1)
    }

    /// Number of lines in the text.
    pub fn line_count(&self) -> usize {
        self.newlines.len() + 1
    }
}
