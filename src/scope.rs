use crate::diff::{DiffStats, ParsedPatch};
use serde::{Deserialize, Serialize};

/// The portion of a diff submitted to a review run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReviewScope {
    #[default]
    Full,
    File {
        #[serde(rename = "filePath")]
        file_path: String,
    },
    Hunk {
        #[serde(rename = "filePath")]
        file_path: String,
        #[serde(rename = "hunkIndex")]
        hunk_index: usize,
    },
}

impl ReviewScope {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File {
            file_path: path.into(),
        }
    }

    pub fn hunk(path: impl Into<String>, hunk_index: usize) -> Self {
        Self::Hunk {
            file_path: path.into(),
            hunk_index,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            Self::Full => None,
            Self::File { file_path } | Self::Hunk { file_path, .. } => Some(file_path),
        }
    }
}

/// A diff slice recomputed for one scope. Never cached across diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedDiffResult {
    pub diff: String,
    #[serde(flatten)]
    pub stats: DiffStats,
}

impl ScopedDiffResult {
    fn from_diff(diff: String) -> Option<Self> {
        if diff.is_empty() {
            return None;
        }
        let stats = DiffStats::from_text(&diff);
        Some(Self { diff, stats })
    }
}

impl ParsedPatch {
    /// Whether the file or hunk a scope refers to is present in this patch.
    pub fn contains_scope(&self, scope: &ReviewScope) -> bool {
        match scope {
            ReviewScope::Full => true,
            ReviewScope::File { file_path } => self.file(file_path).is_some(),
            ReviewScope::Hunk {
                file_path,
                hunk_index,
            } => self
                .file(file_path)
                .is_some_and(|file| file.hunk(*hunk_index).is_some()),
        }
    }

    /// Rewrites the scope's path to the one this patch records for the file.
    pub fn resolve_scope(&self, scope: &ReviewScope) -> Option<ReviewScope> {
        match scope {
            ReviewScope::Full => Some(ReviewScope::Full),
            ReviewScope::File { file_path } => {
                self.file(file_path).map(|file| ReviewScope::file(&file.file_path))
            }
            ReviewScope::Hunk {
                file_path,
                hunk_index,
            } => self
                .file(file_path)
                .filter(|file| file.hunk(*hunk_index).is_some())
                .map(|file| ReviewScope::hunk(&file.file_path, *hunk_index)),
        }
    }

    pub fn scoped_diff(&self, scope: &ReviewScope) -> Option<ScopedDiffResult> {
        let diff = match scope {
            ReviewScope::Full => self.text().trim().to_string(),
            ReviewScope::File { file_path } => {
                let file = self.file(file_path)?;
                file.lines.join("\n").trim().to_string()
            }
            ReviewScope::Hunk {
                file_path,
                hunk_index,
            } => {
                let file = self.file(file_path)?;
                let hunk = file.hunk(*hunk_index)?;
                file.header_lines
                    .iter()
                    .chain(&hunk.lines)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join("\n")
                    .trim()
                    .to_string()
            }
        };
        ScopedDiffResult::from_diff(diff)
    }
}

pub fn scope_exists_in_patch(scope: &ReviewScope, patch: &str) -> bool {
    match scope {
        ReviewScope::Full => true,
        _ => ParsedPatch::parse(patch).contains_scope(scope),
    }
}

/// Extracts the part of `patch` covered by `scope`, with stats counted over
/// exactly that slice.
pub fn build_scoped_diff(patch: &str, scope: &ReviewScope) -> Option<ScopedDiffResult> {
    ParsedPatch::parse(patch).scoped_diff(scope)
}

/// Returns `scope` when the patch still contains it, otherwise the full scope.
pub fn reconcile_scope(scope: &ReviewScope, patch: &ParsedPatch) -> ReviewScope {
    if patch.contains_scope(scope) {
        scope.clone()
    } else {
        ReviewScope::Full
    }
}

/// Trims the path of a scope; blank paths fall back to `Full` and a zero
/// hunk index widens to the whole file. Paths are repo-relative already, so
/// a leading `a/` or `b/` directory is kept.
pub fn sanitize_review_scope(scope: ReviewScope) -> ReviewScope {
    match scope {
        ReviewScope::Full => ReviewScope::Full,
        ReviewScope::File { file_path } => {
            let file_path = file_path.trim().to_string();
            if file_path.is_empty() {
                ReviewScope::Full
            } else {
                ReviewScope::File { file_path }
            }
        }
        ReviewScope::Hunk {
            file_path,
            hunk_index,
        } => {
            let file_path = file_path.trim().to_string();
            match (file_path.is_empty(), hunk_index) {
                (true, _) => ReviewScope::Full,
                (false, 0) => ReviewScope::File { file_path },
                (false, _) => ReviewScope::Hunk {
                    file_path,
                    hunk_index,
                },
            }
        }
    }
}

pub fn review_scope_label(scope: &ReviewScope) -> String {
    match scope {
        ReviewScope::Full => "Full diff".to_string(),
        ReviewScope::File { file_path } => file_path.clone(),
        ReviewScope::Hunk {
            file_path,
            hunk_index,
        } => format!("{file_path} · hunk {hunk_index}"),
    }
}

/// Instruction line telling the reviewer which part of the diff to focus on.
pub fn review_scope_context(scope: &ReviewScope) -> String {
    match scope {
        ReviewScope::Full => "Review the entire diff.".to_string(),
        ReviewScope::File { file_path } => {
            format!("Review only the changes to `{file_path}`.")
        }
        ReviewScope::Hunk {
            file_path,
            hunk_index,
        } => format!("Review only hunk {hunk_index} of `{file_path}`."),
    }
}
