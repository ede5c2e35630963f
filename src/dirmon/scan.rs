//! Directory scanning for dirmon entries.
//!
//! `each` walks the entry's glob pattern and yields only the files that pass
//! every policy gate. Policy failures are never raised: the file is skipped
//! with a logged error and iteration continues, so one bad file cannot stall
//! the scan.

use std::io;
use std::path::PathBuf;

use glob::MatchOptions;
use tracing::{error, info_span, warn};

use crate::engine::Engine;

use super::archive::DEFAULT_ARCHIVE_DIRECTORY;
use super::entry::DirmonEntry;

impl DirmonEntry {
    /// Yields the resolved path of every scannable file matching `pattern`.
    ///
    /// Matching is case-insensitive; `**` recursion and `{a,b}` alternations
    /// are supported (alternations are expanded before matching). A yielded
    /// path is guaranteed to be:
    ///
    /// - a regular file (directories are skipped),
    /// - canonically resolved (symlinks and `..` removed),
    /// - outside any archive directory,
    /// - under a whitelisted prefix when the whitelist is non-empty, and
    /// - writable, so it can be moved after the upload job is enqueued.
    pub fn each<F: FnMut(PathBuf)>(&self, engine: &Engine, mut f: F) {
        let _span = info_span!("scan", dirmon_entry = %self.name).entered();
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        for pattern in expand_braces(&self.pattern) {
            let paths = match glob::glob_with(&pattern, options) {
                Ok(paths) => paths,
                Err(e) => {
                    error!(pattern = %pattern, error = %e, "invalid glob pattern");
                    continue;
                }
            };

            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(error = %e, "unreadable path during scan");
                        continue;
                    }
                };
                if path.is_dir() {
                    continue;
                }

                let resolved = match std::fs::canonicalize(&path) {
                    Ok(resolved) => resolved,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        warn!(path = %path.display(), "file vanished during scan");
                        continue;
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "cannot resolve path");
                        continue;
                    }
                };
                let resolved_str = resolved.to_string_lossy();

                // Never re-discover files we archived ourselves.
                if resolved_str.contains(DEFAULT_ARCHIVE_DIRECTORY) {
                    continue;
                }

                let whitelist = engine.whitelist_paths();
                if !whitelist.is_empty()
                    && !whitelist.iter().any(|prefix| resolved_str.starts_with(prefix.as_str()))
                {
                    error!(
                        path = %resolved.display(),
                        "path is not under a whitelisted prefix, skipping"
                    );
                    continue;
                }

                if !is_writable(&resolved) {
                    error!(
                        path = %resolved.display(),
                        "file is not writable and could not be archived, skipping"
                    );
                    continue;
                }

                f(resolved);
            }
        }
    }
}

/// Probes write access by opening for append; the file is not modified.
fn is_writable(path: &std::path::Path) -> bool {
    std::fs::OpenOptions::new().append(true).open(path).is_ok()
}

/// Expands the first `{a,b,...}` alternation group and recurses, producing
/// one plain glob pattern per combination. The matcher itself has no brace
/// syntax.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    // Find the matching close, allowing nested groups.
    let mut depth = 0usize;
    let mut close = None;
    for (offset, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + offset);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        // Unbalanced brace; treat literally.
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let body = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    // Split alternatives on commas at depth zero only.
    let mut alternatives = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                alternatives.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    alternatives.push(&body[start..]);

    alternatives
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryStore::new())).unwrap()
    }

    fn entry(pattern: &str) -> DirmonEntry {
        DirmonEntry::new("scan-test", pattern, "import_job", "archive")
    }

    fn collect(entry: &DirmonEntry, engine: &Engine) -> Vec<PathBuf> {
        let mut found = Vec::new();
        entry.each(engine, |p| found.push(p));
        found.sort();
        found
    }

    mod expand_braces {
        use super::*;

        #[test]
        fn plain_pattern_passes_through() {
            assert_eq!(expand_braces("/in/*.csv"), vec!["/in/*.csv"]);
        }

        #[test]
        fn single_group_expands() {
            assert_eq!(
                expand_braces("/in/*.{csv,psv}"),
                vec!["/in/*.csv", "/in/*.psv"]
            );
        }

        #[test]
        fn multiple_groups_expand_combinatorially() {
            assert_eq!(
                expand_braces("{a,b}/{x,y}"),
                vec!["a/x", "a/y", "b/x", "b/y"]
            );
        }

        #[test]
        fn unbalanced_brace_is_literal() {
            assert_eq!(expand_braces("/in/{*.csv"), vec!["/in/{*.csv"]);
        }
    }

    mod each {
        use super::*;

        #[test]
        fn yields_matching_files_and_skips_directories() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("a.csv"), b"x").unwrap();
            std::fs::write(dir.path().join("b.txt"), b"x").unwrap();
            std::fs::create_dir(dir.path().join("sub.csv")).unwrap();

            let engine = engine();
            let entry = entry(&format!("{}/*.csv", dir.path().display()));
            let found = collect(&entry, &engine);

            assert_eq!(found.len(), 1);
            assert!(found[0].ends_with("a.csv"));
        }

        #[test]
        fn matching_is_case_insensitive() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("REPORT.CSV"), b"x").unwrap();

            let engine = engine();
            let entry = entry(&format!("{}/*.csv", dir.path().display()));
            assert_eq!(collect(&entry, &engine).len(), 1);
        }

        #[test]
        fn brace_alternation_matches_both_extensions() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("a.csv"), b"x").unwrap();
            std::fs::write(dir.path().join("b.psv"), b"x").unwrap();
            std::fs::write(dir.path().join("c.txt"), b"x").unwrap();

            let engine = engine();
            let entry = entry(&format!("{}/*.{{csv,psv}}", dir.path().display()));
            assert_eq!(collect(&entry, &engine).len(), 2);
        }

        #[test]
        fn recursive_glob_descends() {
            let dir = tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("x/y")).unwrap();
            std::fs::write(dir.path().join("x/y/deep.csv"), b"x").unwrap();

            let engine = engine();
            let entry = entry(&format!("{}/**/*.csv", dir.path().display()));
            assert_eq!(collect(&entry, &engine).len(), 1);
        }

        #[test]
        fn files_under_archive_directories_are_skipped() {
            let dir = tempdir().unwrap();
            std::fs::create_dir(dir.path().join("archive")).unwrap();
            std::fs::write(dir.path().join("archive/old.csv"), b"x").unwrap();
            std::fs::write(dir.path().join("new.csv"), b"x").unwrap();

            let engine = engine();
            let entry = entry(&format!("{}/**/*.csv", dir.path().display()));
            let found = collect(&entry, &engine);
            assert_eq!(found.len(), 1);
            assert!(found[0].ends_with("new.csv"));
        }

        #[test]
        fn non_whitelisted_paths_are_rejected() {
            let safe = tempdir().unwrap();
            let other = tempdir().unwrap();
            std::fs::write(other.path().join("x.csv"), b"x").unwrap();

            let engine = engine();
            engine.add_whitelist_path(safe.path()).unwrap();

            let entry = entry(&format!("{}/*.csv", other.path().display()));
            assert!(collect(&entry, &engine).is_empty());
        }

        #[test]
        fn whitelisted_prefix_admits_files() {
            let safe = tempdir().unwrap();
            std::fs::write(safe.path().join("x.csv"), b"x").unwrap();

            let engine = engine();
            engine.add_whitelist_path(safe.path()).unwrap();

            let entry = entry(&format!("{}/*.csv", safe.path().display()));
            assert_eq!(collect(&entry, &engine).len(), 1);
        }

        #[cfg(unix)]
        #[test]
        fn unwritable_files_are_rejected() {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempdir().unwrap();
            let path = dir.path().join("locked.csv");
            std::fs::write(&path, b"x").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o444)).unwrap();

            // Root bypasses permission bits; nothing to assert in that case.
            if std::fs::OpenOptions::new().append(true).open(&path).is_ok() {
                return;
            }

            let engine = engine();
            let entry = entry(&format!("{}/*.csv", dir.path().display()));
            assert!(collect(&entry, &engine).is_empty());
        }
    }
}
