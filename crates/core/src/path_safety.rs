// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relative-path normalization shared by the archive extractor and the
//! broadcast file-event applier. Both trust a path string from outside the
//! process (an archive entry name, a broadcast payload) and must refuse to
//! write outside the workspace root.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("path escapes workspace root: {0}")]
pub struct PathTraversal(pub String);

/// Normalizes `raw` against `root`, rejecting any component that would climb
/// above it (`..`), any absolute path, and any embedded root prefix.
pub fn normalize_relative(root: &Path, raw: &str) -> Result<PathBuf, PathTraversal> {
    let mut out = root.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(PathTraversal(raw.to_string()));
                }
                out.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathTraversal(raw.to_string()));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_nested_relative_path() {
        let root = Path::new("/workspace/proj");
        let resolved = normalize_relative(root, "src/main.ts").unwrap();
        assert_eq!(resolved, Path::new("/workspace/proj/src/main.ts"));
    }

    #[test]
    fn rejects_parent_escape() {
        let root = Path::new("/workspace/proj");
        let err = normalize_relative(root, "../../etc/passwd").unwrap_err();
        assert_eq!(err, PathTraversal("../../etc/passwd".to_string()));
    }

    #[test]
    fn rejects_absolute_path() {
        let root = Path::new("/workspace/proj");
        let err = normalize_relative(root, "/etc/passwd").unwrap_err();
        assert_eq!(err, PathTraversal("/etc/passwd".to_string()));
    }

    #[test]
    fn dot_segments_do_not_consume_depth() {
        let root = Path::new("/workspace/proj");
        let resolved = normalize_relative(root, "./a/./b").unwrap();
        assert_eq!(resolved, Path::new("/workspace/proj/a/b"));
    }

    #[test]
    fn climb_back_within_bounds_is_allowed() {
        let root = Path::new("/workspace/proj");
        let resolved = normalize_relative(root, "a/../b").unwrap();
        assert_eq!(resolved, Path::new("/workspace/proj/b"));
    }

    proptest! {
        /// Any path built purely from normal segments (no `..`, no leading
        /// `/`) resolves somewhere under `root` — it never escapes.
        #[test]
        fn normal_segments_never_escape_root(segments in prop::collection::vec("[a-zA-Z0-9_.]{1,12}", 1..6)) {
            let root = Path::new("/workspace/proj");
            let raw = segments.join("/");
            let resolved = normalize_relative(root, &raw).unwrap();
            prop_assert!(resolved.starts_with(root));
        }

        /// Any path with strictly more `..` segments than preceding normal
        /// segments is rejected as a traversal, regardless of what those
        /// segments are named.
        #[test]
        fn excess_parent_segments_are_always_rejected(
            normal in prop::collection::vec("[a-zA-Z0-9_]{1,8}", 0..4),
            extra_climbs in 1usize..4,
        ) {
            let root = Path::new("/workspace/proj");
            let mut parts = normal.clone();
            for _ in 0..(normal.len() + extra_climbs) {
                parts.push("..".to_string());
            }
            let raw = parts.join("/");
            prop_assert!(normalize_relative(root, &raw).is_err());
        }
    }
}
