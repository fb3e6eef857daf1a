use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use tracing::warn;

use crate::{
    card::{CardMeta, content_hash},
    error::{Error, Result},
};

/// File extensions that hold cards.
const CARD_EXTENSIONS: &[&str] = &["md", "html", "htm"];

/// Always skipped, on top of hidden entries.
const DEFAULT_EXCLUDES: &[&str] = &["**/node_modules/**"];

/// A card file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFile {
    /// Card path: `/` followed by the path relative to the root, with `/`
    /// separators.
    pub path: String,
    pub absolute_path: PathBuf,
    /// SHA-256 of the file content.
    pub hash: String,
}

impl CardFile {
    pub fn meta(&self) -> CardMeta {
        CardMeta::new(self.path.clone(), self.hash.clone())
    }
}

fn build_excludes(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES
        .iter()
        .copied()
        .chain(patterns.iter().map(String::as_str))
    {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::Config(format!("invalid exclude pattern '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid exclude patterns: {e}")))
}

/// Find every card file under `root` and fingerprint its content.
///
/// Hidden files and directories, `node_modules`, and anything matching one of
/// `excludes` (globs over the root-relative path) are skipped. Files that
/// cannot be read as UTF-8 are skipped with a warning. Results are sorted by
/// card path.
pub fn discover_cards(root: &Path, excludes: &[String]) -> Result<Vec<CardFile>> {
    let root = root.canonicalize()?;
    let excludes = build_excludes(excludes)?;

    let mut found = Vec::new();
    walk_dir(&root, &root, &excludes, &mut found)?;
    found.sort();

    let cards = found
        .par_iter()
        .filter_map(|(relative, absolute)| {
            let content = match std::fs::read_to_string(absolute) {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %absolute.display(), error = %e, "skipping unreadable card");
                    return None;
                }
            };
            Some(CardFile {
                path: format!("/{relative}"),
                absolute_path: absolute.clone(),
                hash: content_hash(&content),
            })
        })
        .collect();
    Ok(cards)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    excludes: &GlobSet,
    found: &mut Vec<(String, PathBuf)>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let relative = relative_card_path(root, &path);
        if excludes.is_match(&relative) {
            continue;
        }

        // Follows symlinks; symlinked directories are not descended into.
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(root, &path, excludes, found)?;
        } else if path.is_file() && is_card(&path) {
            found.push((relative, path));
        }
    }
    Ok(())
}

fn relative_card_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_card(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CARD_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_paths(cards: &[CardFile]) -> Vec<&str> {
        cards.iter().map(|c| c.path.as_str()).collect()
    }

    #[test]
    fn discovers_markdown_and_html() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("page.html"), "<h1>Hi</h1>").unwrap();
        std::fs::write(tmp.path().join("image.png"), "binary").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "plain").unwrap();

        let cards = discover_cards(tmp.path(), &[]).unwrap();
        assert_eq!(card_paths(&cards), ["/note.md", "/page.html"]);
        assert_eq!(cards[0].hash, content_hash("# Hello"));
    }

    #[test]
    fn skips_hidden_and_node_modules() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/config.md"), "x").unwrap();
        std::fs::write(tmp.path().join(".hidden.md"), "x").unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg/node_modules/dep")).unwrap();
        std::fs::write(tmp.path().join("pkg/node_modules/dep/README.md"), "x").unwrap();
        std::fs::write(tmp.path().join("pkg/README.md"), "x").unwrap();

        let cards = discover_cards(tmp.path(), &[]).unwrap();
        assert_eq!(card_paths(&cards), ["/pkg/README.md"]);
    }

    #[test]
    fn user_excludes_apply_to_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("out")).unwrap();
        std::fs::write(tmp.path().join("out/built.html"), "x").unwrap();
        std::fs::write(tmp.path().join("keep.md"), "x").unwrap();
        std::fs::write(tmp.path().join("draft.md"), "x").unwrap();

        let excludes = vec!["out/**".to_string(), "draft.md".to_string()];
        let cards = discover_cards(tmp.path(), &excludes).unwrap();
        assert_eq!(card_paths(&cards), ["/keep.md"]);
    }

    #[test]
    fn invalid_exclude_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_cards(tmp.path(), &["a[".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn nested_paths_use_forward_slashes_and_sort() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("b/c")).unwrap();
        std::fs::write(tmp.path().join("b/c/deep.md"), "x").unwrap();
        std::fs::write(tmp.path().join("a.md"), "x").unwrap();
        std::fs::write(tmp.path().join("z.htm"), "x").unwrap();

        let cards = discover_cards(tmp.path(), &[]).unwrap();
        assert_eq!(card_paths(&cards), ["/a.md", "/b/c/deep.md", "/z.htm"]);
        assert_eq!(cards[1].meta().path, "/b/c/deep.md");
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_cards(tmp.path(), &[]).unwrap().is_empty());
    }
}
