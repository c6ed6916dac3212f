//! Fuzzy module names.
//!
//! File names often hold characters that cannot appear in a module name.
//! Underscores in a requested name act as wildcards: `__` matches any run of
//! characters and `_` matches one character, so `data_2` finds `data-2.ipynb`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::Pattern;

/// The glob pattern for a fuzzy name.
///
/// Runs of more than two underscores collapse to two, then `__` becomes `*`
/// and `_` becomes `?`. Other glob metacharacters are escaped.
pub fn fuzzy_query(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch == '_' && collapsed.ends_with("__") {
            continue;
        }
        collapsed.push(ch);
    }

    let mut query = String::with_capacity(collapsed.len());
    let mut rest = collapsed.as_str();
    while let Some(ch) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("__") {
            query.push('*');
            rest = after;
        } else if ch == '_' {
            query.push('?');
            rest = &rest[1..];
        } else {
            query.push_str(&Pattern::escape(ch.encode_utf8(&mut [0; 4])));
            rest = &rest[ch.len_utf8()..];
        }
    }
    query
}

/// Files in `dir` matching `name` exactly or fuzzily, for every extension.
///
/// The result is sorted and free of duplicates.
pub fn fuzzy_file_search<S: AsRef<str>>(dir: &Path, name: &str, extensions: &[S]) -> Vec<PathBuf> {
    let prefix = Pattern::escape(&dir.to_string_lossy());
    let exact = Pattern::escape(name);
    let fuzzy = name.contains('_').then(|| fuzzy_query(name));

    let mut results = BTreeSet::new();
    for ext in extensions {
        let ext = Pattern::escape(ext.as_ref());
        let patterns = std::iter::once(&exact).chain(fuzzy.as_ref());
        for stem in patterns {
            let pattern = format!("{prefix}/{stem}{ext}");
            match glob::glob(&pattern) {
                Ok(paths) => results.extend(paths.filter_map(Result::ok).filter(|p| p.is_file())),
                Err(e) => tracing::debug!("Skipping fuzzy pattern {}: {}", pattern, e),
            }
        }
    }

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_fuzzy_query() {
        assert_eq!(fuzzy_query("data_2"), "data?2");
        assert_eq!(fuzzy_query("a__b"), "a*b");
        assert_eq!(fuzzy_query("a___b"), "a*b");
        assert_eq!(fuzzy_query("a_____b_c"), "a*b?c");
        assert_eq!(fuzzy_query("plain"), "plain");
        assert_eq!(fuzzy_query("odd[1]"), "odd[[]1[]]");
    }

    #[test]
    fn test_fuzzy_file_search() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["data-2.ipynb", "data 2.ipynb", "data_2.txt", "data-22.ipynb"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        fs::create_dir(dir.path().join("data.2.ipynb")).unwrap();

        let found = fuzzy_file_search(dir.path(), "data_2", &[".ipynb"]);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["data 2.ipynb", "data-2.ipynb"]);

        let found = fuzzy_file_search(dir.path(), "data__", &[".ipynb"]);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_directory_is_escaped() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nb[s]");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a-b.ipynb"), "{}").unwrap();

        let found = fuzzy_file_search(&dir, "a_b", &[".ipynb"]);
        assert_eq!(found, [dir.join("a-b.ipynb")]);
    }
}
