//! Pure helpers for virtual paths and keyword search input.
//!
//! Virtual paths are slash-delimited; folder paths carry a trailing `/`,
//! file paths do not. Nothing here touches the database or the remote store.

/// A free-text search split into required and excluded terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyword {
    /// Terms every matching path must contain.
    pub plus: Vec<String>,
    /// Terms no matching path may contain (entered as `-term`).
    pub minus: Vec<String>,
}

/// Split free-text search input into required and excluded substrings.
///
/// Terms are whitespace-separated; a leading `-` marks an excluded term.
/// A bare `-` is ignored.
pub fn parse_keyword(text: &str) -> Keyword {
    let mut keyword = Keyword::default();
    for term in text.split_whitespace() {
        if let Some(stripped) = term.strip_prefix('-') {
            if !stripped.is_empty() {
                keyword.minus.push(stripped.to_string());
            }
        } else {
            keyword.plus.push(term.to_string());
        }
    }
    keyword
}

/// Build a SQL `LIKE` pattern for `fragment`.
///
/// `anchored` pins the match to the start of the column (prefix match);
/// unanchored patterns match the fragment anywhere. Wildcard characters in
/// the fragment are escaped; queries must use `ESCAPE '\'`.
pub fn like_pattern(fragment: &str, anchored: bool) -> String {
    let escaped = escape_like(fragment);
    if anchored {
        format!("{escaped}%")
    } else {
        format!("%{escaped}%")
    }
}

fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Parent directory of a virtual path, without trailing slash.
/// Root-level objects yield the empty string.
pub fn dirname_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..pos].to_string(),
        None => String::new(),
    }
}

/// Final segment of a virtual path; a folder's trailing slash is stripped.
pub fn basename_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => trimmed[pos + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Join a parent dirname and a child segment into a full virtual path.
/// `dirname` is empty for root-level objects.
pub fn join_path(dirname: &str, segment: &str) -> String {
    if dirname.is_empty() {
        segment.to_string()
    } else {
        format!("{dirname}/{segment}")
    }
}

/// The folder-record path of a dirname (`photos/2025` -> `photos/2025/`).
pub fn folder_path(dirname: &str) -> String {
    format!("{dirname}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keyword_splits_plus_and_minus() {
        let kw = parse_keyword("report -draft 2025 -tmp");
        assert_eq!(kw.plus, vec!["report", "2025"]);
        assert_eq!(kw.minus, vec!["draft", "tmp"]);
    }

    #[test]
    fn parse_keyword_ignores_bare_dash_and_blank() {
        assert_eq!(parse_keyword("  "), Keyword::default());
        let kw = parse_keyword("- a");
        assert_eq!(kw.plus, vec!["a"]);
        assert!(kw.minus.is_empty());
    }

    #[test]
    fn parse_keyword_is_deterministic() {
        assert_eq!(parse_keyword("a -b c"), parse_keyword("a -b c"));
    }

    #[test]
    fn like_pattern_anchoring() {
        assert_eq!(like_pattern("photos/", true), "photos/%");
        assert_eq!(like_pattern("cat", false), "%cat%");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%_done", true), "100\\%\\_done%");
    }

    #[test]
    fn dirname_and_basename_of_files() {
        assert_eq!(dirname_of("a/b/c.txt"), "a/b");
        assert_eq!(basename_of("a/b/c.txt"), "c.txt");
        assert_eq!(dirname_of("c.txt"), "");
        assert_eq!(basename_of("c.txt"), "c.txt");
    }

    #[test]
    fn dirname_and_basename_of_folders() {
        assert_eq!(dirname_of("a/b/"), "a");
        assert_eq!(basename_of("a/b/"), "b");
        assert_eq!(dirname_of("a/"), "");
        assert_eq!(basename_of("a/"), "a");
    }

    #[test]
    fn join_path_handles_root() {
        assert_eq!(join_path("", "x.txt"), "x.txt");
        assert_eq!(join_path("a/b", "x.txt"), "a/b/x.txt");
        assert_eq!(folder_path("a/b"), "a/b/");
    }
}
