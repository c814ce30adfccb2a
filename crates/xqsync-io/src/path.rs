//! Mapping between document identifiers and filesystem paths

use std::path::{Component, Path, PathBuf};
use xqsync_types::{Error, Result};

/// Place `uri` under `root`.
///
/// A leading `/` is ignored and empty segments are skipped. `.` and `..`
/// segments, or an identifier with no segments at all, are malformed.
pub fn resolve_uri(root: &Path, uri: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut segments = 0;

    for segment in uri.split('/') {
        match segment {
            "" => {}
            "." | ".." => {
                return Err(Error::malformed(
                    uri,
                    "relative path segments are not allowed",
                ))
            }
            segment => {
                path.push(segment);
                segments += 1;
            }
        }
    }

    if segments == 0 {
        return Err(Error::malformed(uri, "identifier names no file"));
    }
    Ok(path)
}

/// `path` relative to `root`, components joined with `/`.
///
/// Returns `None` when `path` is not under `root`.
pub fn relative_uri(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        // root is the file itself
        return path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("a.xml", "a.xml")]
    #[case("/a.xml", "a.xml")]
    #[case("/dir/sub/a b.xml", "dir/sub/a b.xml")]
    #[case("dir//a.xml", "dir/a.xml")]
    fn test_resolve(#[case] uri: &str, #[case] expected: &str) {
        let root = Path::new("/out");
        assert_eq!(resolve_uri(root, uri).unwrap(), root.join(expected));
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case("../escape.xml")]
    #[case("/a/../../b.xml")]
    #[case("./a.xml")]
    fn test_resolve_rejects(#[case] uri: &str) {
        let error = resolve_uri(Path::new("/out"), uri).unwrap_err();
        assert!(!error.is_fatal());
        assert!(matches!(error, Error::MalformedDocument { .. }));
    }

    #[test]
    fn test_relative_uri() {
        let root = Path::new("/data/in");
        assert_eq!(
            relative_uri(root, Path::new("/data/in/x/y.xml")),
            Some("x/y.xml".to_string())
        );
        assert_eq!(relative_uri(root, Path::new("/elsewhere/y.xml")), None);
        assert_eq!(
            relative_uri(Path::new("/data/in/only.xml"), Path::new("/data/in/only.xml")),
            Some("only.xml".to_string())
        );
    }

    proptest! {
        #[test]
        fn test_resolved_paths_stay_under_root(uri in "[a-z./ ]{0,24}") {
            let root = Path::new("/root/out");
            if let Ok(path) = resolve_uri(root, &uri) {
                prop_assert!(path.starts_with(root));
                prop_assert!(path != root);
                prop_assert!(!path
                    .components()
                    .any(|c| matches!(c, Component::ParentDir | Component::CurDir)));
            }
        }
    }
}
