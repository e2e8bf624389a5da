//! Line-based pagination of tool output.

/// Page size used when the caller does not ask for one.
pub const DEFAULT_MAX_LINES: usize = 1000;

/// One window of a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// The selected lines joined by `\n`.
    pub text: String,
    /// Line count of the whole text.
    pub total_lines: usize,
    /// Zero-based index of the first selected line.
    pub offset: usize,
    /// Page size that was applied.
    pub max_lines: usize,
    /// Number of lines in this page.
    pub shown: usize,
    /// More lines follow this page.
    pub truncated: bool,
}

impl Page {
    /// `[Showing lines a-b of N total lines. ...]` when the page is partial.
    pub fn header(&self) -> Option<String> {
        self.truncated.then(|| {
            format!(
                "[Showing lines {}-{} of {} total lines. Use offset parameter to view more.]",
                self.offset + 1,
                self.offset + self.shown,
                self.total_lines
            )
        })
    }
}

/// Select `max_lines` lines of `text` starting at line `offset`.
///
/// `max_lines == 0` means [`DEFAULT_MAX_LINES`]. An offset at or past the
/// end yields an empty page.
pub fn paginate(text: &str, offset: usize, max_lines: usize) -> Page {
    let max_lines = if max_lines == 0 { DEFAULT_MAX_LINES } else { max_lines };
    let lines: Vec<&str> = text.split('\n').collect();
    let total_lines = lines.len();

    let (selected, truncated) = if offset < total_lines {
        let end = offset.saturating_add(max_lines).min(total_lines);
        (&lines[offset..end], end < total_lines)
    } else {
        (&lines[..0], false)
    };

    Page {
        text: selected.join("\n"),
        total_lines,
        offset,
        max_lines,
        shown: selected.len(),
        truncated,
    }
}
