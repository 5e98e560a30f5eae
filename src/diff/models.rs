use serde::{Deserialize, Serialize};

/// Change summary for a slice of a unified diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffStats {
    /// Counts stats directly over the given lines.
    ///
    /// `diff --git ` lines count as files; `+`/`-` lines count as insertions and
    /// deletions, except the `+++`/`---` file headers.
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut stats = Self::default();
        for line in lines {
            if line.starts_with("diff --git ") {
                stats.files_changed += 1;
            } else if line.starts_with('+') && !line.starts_with("+++") {
                stats.insertions += 1;
            } else if line.starts_with('-') && !line.starts_with("---") {
                stats.deletions += 1;
            }
        }
        stats
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_lines(text.lines())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedHunk {
    /// 1-based position of the hunk inside its file.
    pub hunk_index: usize,
    pub header: String,
    /// Hunk body, header line included.
    pub lines: Vec<String>,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
}

impl ParsedHunk {
    pub fn insertions(&self) -> usize {
        DiffStats::from_lines(self.lines.iter().map(String::as_str)).insertions
    }

    pub fn deletions(&self) -> usize {
        DiffStats::from_lines(self.lines.iter().map(String::as_str)).deletions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    pub file_path: String,
    /// Every line of the file section, `diff --git` header included.
    pub lines: Vec<String>,
    /// Lines before the first hunk header.
    pub header_lines: Vec<String>,
    pub hunks: Vec<ParsedHunk>,
}

impl ParsedFile {
    pub fn hunk(&self, hunk_index: usize) -> Option<&ParsedHunk> {
        self.hunks.iter().find(|h| h.hunk_index == hunk_index)
    }

    pub fn stats(&self) -> DiffStats {
        DiffStats::from_lines(self.lines.iter().map(String::as_str))
    }

    pub fn insertions(&self) -> usize {
        self.stats().insertions
    }

    pub fn deletions(&self) -> usize {
        self.stats().deletions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_skip_file_headers() {
        let text = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1,2 +1,2 @@\n-old\n+new\n context";
        let stats = DiffStats::from_text(text);
        assert_eq!(
            stats,
            DiffStats {
                files_changed: 1,
                insertions: 1,
                deletions: 1,
            }
        );
    }

    #[test]
    fn stats_of_empty_text_are_zero() {
        assert_eq!(DiffStats::from_text(""), DiffStats::default());
    }
}
