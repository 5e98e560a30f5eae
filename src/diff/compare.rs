use similar::TextDiff;

const CONTEXT_RADIUS: usize = 3;

/// Builds a `diff --git` section describing the change from `old` to `new`.
///
/// An empty `old` is treated as a new file and an empty `new` as a deletion.
/// Returns `None` when both revisions are identical.
pub fn build_file_patch(path: &str, old: &str, new: &str) -> Option<String> {
    let path = super::normalize_diff_path(path);
    let diff = TextDiff::from_lines(old, new);

    let (old_header, new_header) = match (old.is_empty(), new.is_empty()) {
        (true, _) => ("/dev/null".to_string(), format!("b/{path}")),
        (_, true) => (format!("a/{path}"), "/dev/null".to_string()),
        _ => (format!("a/{path}"), format!("b/{path}")),
    };

    let body = diff
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(&old_header, &new_header)
        .to_string();

    if body.is_empty() {
        return None;
    }

    let mut patch = format!("diff --git a/{path} b/{path}\n");
    if old.is_empty() {
        patch.push_str("new file mode 100644\n");
    } else if new.is_empty() {
        patch.push_str("deleted file mode 100644\n");
    }
    patch.push_str(&body);
    Some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_patch_files;

    #[test]
    fn identical_content_has_no_patch() {
        assert!(build_file_patch("a.txt", "same\n", "same\n").is_none());
    }

    #[test]
    fn modified_file_round_trips_through_parser() {
        let old = "line 1\nline 2\nline 3\nline 4\nline 5\n";
        let new = "line 1\nline 2 modified\nline 3\nnew line\nline 4\nline 5\n";

        let patch = build_file_patch("src/notes.txt", old, new).unwrap();
        let files = parse_patch_files(&patch);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_path, "src/notes.txt");
        assert_eq!(files[0].hunks.len(), 1);
        assert_eq!(files[0].insertions(), 2);
        assert_eq!(files[0].deletions(), 1);
    }

    #[test]
    fn new_and_deleted_files_get_mode_lines() {
        let added = build_file_patch("fresh.rs", "", "fn main() {}\n").unwrap();
        assert!(added.contains("new file mode 100644"));
        assert!(added.contains("--- /dev/null"));
        assert_eq!(parse_patch_files(&added)[0].file_path, "fresh.rs");

        let removed = build_file_patch("old.rs", "fn main() {}\n", "").unwrap();
        assert!(removed.contains("deleted file mode 100644"));
        assert!(removed.contains("+++ /dev/null"));
        assert_eq!(parse_patch_files(&removed)[0].file_path, "old.rs");
    }
}
