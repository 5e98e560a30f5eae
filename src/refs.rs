use std::collections::HashSet;

/// De-duplicates ref names case-insensitively.
///
/// Entries are trimmed, blanks and `None` are dropped, and the first spelling
/// of each ref wins.
pub fn dedupe_ref_targets<I, S>(refs: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    refs.into_iter()
        .flatten()
        .filter_map(|r| {
            let trimmed = r.as_ref().trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_case_insensitively_keeping_first() {
        let refs = [
            Some(" main "),
            Some("MAIN"),
            Some("feature/a"),
            Some(""),
            None,
            Some("Feature/A"),
        ];
        assert_eq!(dedupe_ref_targets(refs), vec!["main", "feature/a"]);
    }

    #[test]
    fn accepts_owned_strings() {
        let refs = vec![Some("Dev".to_string()), Some("dev".to_string())];
        assert_eq!(dedupe_ref_targets(refs), vec!["Dev"]);
    }
}
