use glob::{MatchOptions, Pattern};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::error::GraphError;

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Files matched by one source pattern, plus the directories that were
/// searched to find them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobMatch {
    /// Root-relative, `/`-separated, sorted and deduplicated.
    pub files: Vec<String>,
    /// Root-relative directories whose listing decided the result.
    pub dirs: Vec<String>,
}

/// Expand `pattern` (relative to `module_dir`) into existing regular files,
/// dropping anything matched by one of `excludes`.
///
/// A pattern matching nothing is not an error. A malformed pattern, or one
/// that cannot be evaluated, fails with the offending pattern attached.
pub fn resolve(
    root: &Path,
    module_dir: &str,
    pattern: &str,
    excludes: &[String],
) -> Result<GlobMatch, GraphError> {
    let base = module_base(root, module_dir);
    let prefix = Pattern::escape(&base.to_string_lossy());

    let mut exclude_patterns = Vec::with_capacity(excludes.len());
    for ex in excludes {
        let p = Pattern::new(&format!("{prefix}/{ex}")).map_err(|e| GraphError::pattern(ex, e))?;
        exclude_patterns.push(p);
    }

    let walker = glob::glob_with(&format!("{prefix}/{pattern}"), MATCH)
        .map_err(|e| GraphError::pattern(pattern, e))?;

    let mut files = BTreeSet::new();
    let mut dirs = searched_dirs(root, &base, pattern)?;

    for entry in walker {
        let path = entry.map_err(|e| GraphError::pattern(pattern, e))?;
        if !path.is_file() {
            continue;
        }
        if exclude_patterns.iter().any(|ex| ex.matches_path_with(&path, MATCH)) {
            continue;
        }
        if let Some(parent) = path.parent() {
            dirs.insert(relative(root, parent));
        }
        files.insert(relative(root, &path));
    }

    Ok(GlobMatch {
        files: files.into_iter().collect(),
        dirs: dirs.into_iter().collect(),
    })
}

/// Directories whose listing can change what `pattern` matches: the literal
/// prefix, every directory a wildcard component can descend into, and with
/// `**` the whole subtree.
fn searched_dirs(root: &Path, base: &Path, pattern: &str) -> Result<BTreeSet<String>, GraphError> {
    let components: Vec<&str> = pattern.split('/').collect();
    let dir_components = &components[..components.len().saturating_sub(1)];
    let literal = dir_components
        .iter()
        .take_while(|c| !is_wildcard(c))
        .count();

    let start = dir_components[..literal]
        .iter()
        .fold(base.to_path_buf(), |p, c| p.join(c));
    let rest = &dir_components[literal..];

    let mut found = Vec::new();
    if start.is_dir() {
        found.push(start.clone());
    }

    if rest.contains(&"**") {
        for entry in WalkDir::new(&start).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                found.push(entry.into_path());
            }
        }
    } else if !rest.is_empty() {
        let prefix = Pattern::escape(&start.to_string_lossy());
        for depth in 1..=rest.len() {
            let dir_pattern = format!("{prefix}/{}", rest[..depth].join("/"));
            let walker = glob::glob_with(&dir_pattern, MATCH)
                .map_err(|e| GraphError::pattern(pattern, e))?;
            found.extend(walker.filter_map(|e| e.ok()).filter(|p| p.is_dir()));
        }
    }

    Ok(found
        .iter()
        .map(|p| relative(root, p))
        .filter(|d| !d.contains(|c: char| c == '\n' || c == '\r'))
        .collect())
}

fn is_wildcard(component: &str) -> bool {
    component.contains(|c: char| matches!(c, '*' | '?' | '['))
}

fn module_base(root: &Path, module_dir: &str) -> PathBuf {
    if module_dir.is_empty() || module_dir == "." {
        root.to_path_buf()
    } else {
        root.join(module_dir)
    }
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let s = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if s.is_empty() {
        ".".to_string()
    } else {
        s
    }
}

/// Join a root-relative directory and a name the way build files expect
/// (`.` collapses away).
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for f in files {
            let p = tmp.path().join(f);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "package main\n").unwrap();
        }
        tmp
    }

    #[test]
    fn matches_relative_to_module_dir() {
        let tmp = tree(&["cmd/app/main.go", "cmd/app/util.go", "other/main.go"]);

        let m = resolve(tmp.path(), "cmd/app", "*.go", &[]).unwrap();
        assert_eq!(m.files, vec!["cmd/app/main.go", "cmd/app/util.go"]);
        assert_eq!(m.dirs, vec!["cmd/app"]);
    }

    #[test]
    fn exclusions_are_applied() {
        let tmp = tree(&["main.go", "util.go", "util_test.go"]);

        let m = resolve(tmp.path(), ".", "*.go", &["*_test.go".to_string()]).unwrap();
        assert_eq!(m.files, vec!["main.go", "util.go"]);
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let tmp = tree(&["main.go", "pkg/lib.go", "pkg/deep/more.go"]);

        let shallow = resolve(tmp.path(), ".", "*.go", &[]).unwrap();
        assert_eq!(shallow.files, vec!["main.go"]);

        let deep = resolve(tmp.path(), ".", "**/*.go", &[]).unwrap();
        assert_eq!(deep.files, vec!["main.go", "pkg/deep/more.go", "pkg/lib.go"]);
        assert!(deep.dirs.contains(&"pkg/deep".to_string()));
    }

    #[test]
    fn recursive_patterns_watch_empty_subdirectories() {
        let tmp = tree(&["main.go", "docs/readme.txt"]);
        fs::create_dir_all(tmp.path().join("pkg/empty")).unwrap();

        let m = resolve(tmp.path(), ".", "**/*.go", &[]).unwrap();
        assert_eq!(m.files, vec!["main.go"]);
        assert_eq!(m.dirs, vec![".", "docs", "pkg", "pkg/empty"]);
    }

    #[test]
    fn wildcard_directories_are_watched() {
        let tmp = tree(&["cmd/a/main.go", "cmd/b/readme.txt"]);

        let m = resolve(tmp.path(), ".", "cmd/*/*.go", &[]).unwrap();
        assert_eq!(m.files, vec!["cmd/a/main.go"]);
        assert_eq!(m.dirs, vec!["cmd", "cmd/a", "cmd/b"]);
    }

    #[test]
    fn missing_directories_are_not_watched() {
        let tmp = tree(&["main.go"]);

        let m = resolve(tmp.path(), ".", "gen/*.go", &[]).unwrap();
        assert!(m.files.is_empty());
        assert!(m.dirs.is_empty());
    }

    #[test]
    fn zero_matches_is_not_an_error() {
        let tmp = tree(&["main.go"]);

        let m = resolve(tmp.path(), ".", "*.rs", &[]).unwrap();
        assert!(m.files.is_empty());

        let missing_dir = resolve(tmp.path(), "nope", "*.go", &[]).unwrap();
        assert!(missing_dir.files.is_empty());
    }

    #[test]
    fn directories_are_not_returned() {
        let tmp = tree(&["main.go", "assets.go/inner.txt"]);

        let m = resolve(tmp.path(), ".", "*.go", &[]).unwrap();
        assert_eq!(m.files, vec!["main.go"]);
    }

    #[test]
    fn malformed_pattern_carries_the_pattern() {
        let tmp = tree(&["main.go"]);

        let err = resolve(tmp.path(), ".", "***.go", &[]).unwrap_err();
        match err {
            GraphError::PatternResolution { pattern, .. } => assert_eq!(pattern, "***.go"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_exclusion_carries_the_exclusion() {
        let tmp = tree(&["main.go"]);

        let err = resolve(tmp.path(), ".", "*.go", &["[".to_string()]).unwrap_err();
        match err {
            GraphError::PatternResolution { pattern, .. } => assert_eq!(pattern, "["),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn join_collapses_root_dir() {
        assert_eq!(join(".", "vendor"), "vendor");
        assert_eq!(join("", "go.mod"), "go.mod");
        assert_eq!(join("cmd/app/", "vendor"), "cmd/app/vendor");
    }
}
