use super::models::{ParsedFile, ParsedHunk};
use once_cell::sync::Lazy;
use regex::Regex;

const FILE_HEADER_PREFIX: &str = "diff --git ";
const HUNK_HEADER_PREFIX: &str = "@@ ";
const DEV_NULL: &str = "/dev/null";

static HUNK_HEADER_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^@@\s+-(\d+)(?:,(\d+))?\s+\+(\d+)(?:,(\d+))?\s+@@").ok());

/// A unified diff together with its per-file breakdown.
///
/// The text is kept CRLF-normalized so scoped slices and stats are computed
/// over the same lines the parser saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPatch {
    text: String,
    files: Vec<ParsedFile>,
}

impl ParsedPatch {
    pub fn parse(patch: &str) -> Self {
        let text = normalize_line_endings(patch);
        let files = parse_normalized(&text);
        Self { text, files }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn files(&self) -> &[ParsedFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Looks up a file by its repo-relative path. A query still carrying a
    /// git `a/` or `b/` prefix matches only when the exact path does not.
    pub fn file(&self, path: &str) -> Option<&ParsedFile> {
        let exact = path.trim();
        if exact.is_empty() {
            return None;
        }
        self.files
            .iter()
            .find(|f| f.file_path == exact)
            .or_else(|| {
                let stripped = normalize_diff_path(exact);
                self.files.iter().find(|f| f.file_path == stripped)
            })
    }
}

/// Splits a unified diff into per-file sections and per-file hunks.
pub fn parse_patch_files(patch: &str) -> Vec<ParsedFile> {
    parse_normalized(&normalize_line_endings(patch))
}

/// Trims a diff path and strips one leading `a/` or `b/` segment.
pub fn normalize_diff_path(path: &str) -> String {
    let trimmed = path.trim();
    trimmed
        .strip_prefix("a/")
        .or_else(|| trimmed.strip_prefix("b/"))
        .unwrap_or(trimmed)
        .to_string()
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}

fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    // A terminating newline does not start another line.
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

fn parse_normalized(text: &str) -> Vec<ParsedFile> {
    let mut sections: Vec<Vec<&str>> = Vec::new();

    for line in split_lines(text) {
        if line.starts_with(FILE_HEADER_PREFIX) {
            sections.push(vec![line]);
        } else if let Some(section) = sections.last_mut() {
            section.push(line);
        }
        // Anything before the first `diff --git` line (mail headers, commit
        // messages) belongs to no file.
    }

    sections
        .iter()
        .map(|section| parse_file_section(section))
        .collect()
}

fn parse_file_section(lines: &[&str]) -> ParsedFile {
    let hunk_starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.starts_with(HUNK_HEADER_PREFIX))
        .map(|(index, _)| index)
        .collect();

    let header_end = hunk_starts.first().copied().unwrap_or(lines.len());
    let header_lines = &lines[..header_end];

    let hunks = hunk_starts
        .iter()
        .enumerate()
        .map(|(ordinal, &start)| {
            let end = hunk_starts.get(ordinal + 1).copied().unwrap_or(lines.len());
            build_hunk(ordinal + 1, &lines[start..end])
        })
        .collect();

    ParsedFile {
        file_path: resolve_file_path(header_lines),
        lines: to_owned_lines(lines),
        header_lines: to_owned_lines(header_lines),
        hunks,
    }
}

fn build_hunk(hunk_index: usize, lines: &[&str]) -> ParsedHunk {
    let header = lines.first().copied().unwrap_or_default();
    let (old_start, old_count, new_start, new_count) = parse_hunk_ranges(header);

    ParsedHunk {
        hunk_index,
        header: header.to_string(),
        lines: to_owned_lines(lines),
        old_start,
        old_count,
        new_start,
        new_count,
    }
}

/// Parses `@@ -a,b +c,d @@`; an omitted count means 1, a malformed header yields zeros.
fn parse_hunk_ranges(header: &str) -> (u32, u32, u32, u32) {
    let Some(caps) = HUNK_HEADER_RE.as_ref().and_then(|re| re.captures(header)) else {
        return (0, 0, 0, 0);
    };
    let number = |index: usize, default: u32| {
        caps.get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(default)
    };
    (number(1, 0), number(2, 1), number(3, 0), number(4, 1))
}

/// Picks the post-image path unless the file was deleted, then falls back to
/// rename metadata and finally the `diff --git` line itself.
fn resolve_file_path(header_lines: &[&str]) -> String {
    let header_path = |prefix: &str| {
        header_lines
            .iter()
            .find_map(|line| line.strip_prefix(prefix))
            .map(clean_header_path)
            .filter(|path| !path.is_empty() && path != DEV_NULL)
    };

    header_path("+++ ")
        .or_else(|| header_path("--- "))
        .or_else(|| header_path("rename to "))
        .or_else(|| header_path("copy to "))
        .or_else(|| {
            header_lines
                .first()
                .and_then(|line| line.strip_prefix(FILE_HEADER_PREFIX))
                .and_then(git_header_path)
        })
        .map(|path| normalize_diff_path(&path))
        .unwrap_or_default()
}

fn clean_header_path(raw: &str) -> String {
    // `+++ b/file\t2024-01-01 ...` carries a timestamp after a tab.
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}

fn git_header_path(rest: &str) -> Option<String> {
    let rest = rest.trim();
    match rest.rfind(" b/") {
        Some(pos) => Some(rest[pos + 1..].to_string()),
        None => rest.split_whitespace().last().map(str::to_string),
    }
}

fn to_owned_lines(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}
