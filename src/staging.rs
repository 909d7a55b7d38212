//! Staging area paths and promotion of staged files to the output directory

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Logical name of the input notebook's staging path
pub const INPUT: &str = "input";
/// Logical name of the archive produced by the archiving manager
pub const ARCHIVE: &str = "tar.gz";

/// Map from logical names (`"input"`, each output format, `"tar.gz"`) to
/// absolute staging locations
///
/// Supplied at construction and never mutated by the managers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingPaths {
    paths: HashMap<String, PathBuf>,
}

impl StagingPaths {
    /// Build from a name -> path map
    pub fn new(paths: HashMap<String, PathBuf>) -> Self {
        Self { paths }
    }

    /// Path registered under `name`
    pub fn get(&self, name: &str) -> Result<&Path> {
        self.paths
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::MissingStagingPath(name.to_string()))
    }

    /// Path of the input notebook
    pub fn input(&self) -> Result<&Path> {
        self.get(INPUT)
    }

    /// Directory holding the input notebook; every staged artifact lives under it
    pub fn staging_dir(&self) -> Result<&Path> {
        let input = self.input()?;
        input.parent().ok_or_else(|| Error::InvalidPath {
            path: input.to_path_buf(),
            reason: "input path has no parent directory".to_string(),
        })
    }

    /// The first of `formats` whose staging path is `path`, if any
    ///
    /// Only requested output formats are considered, in request order, so a
    /// path shared with the input or with another name resolves the same way
    /// every time.
    pub fn format_for<'a>(&self, path: &Path, formats: &'a [String]) -> Option<&'a str> {
        formats
            .iter()
            .find(|format| self.paths.get(format.as_str()).is_some_and(|p| p == path))
            .map(String::as_str)
    }
}

impl<K: Into<String>, P: Into<PathBuf>> FromIterator<(K, P)> for StagingPaths {
    fn from_iter<I: IntoIterator<Item = (K, P)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }
}

/// A file copied out of the staging tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    /// Where the file was staged
    pub source: PathBuf,
    /// Copy location, relative to the base directory
    pub relative_path: String,
}

/// Copy every file under `source_dir` into `destination_dir`, keeping relative paths
///
/// Returns the copies with paths relative to `base_dir`, in walk order.
/// `destination_dir` must lie under `base_dir`.
pub fn copy_directory(
    source_dir: &Path,
    destination_dir: &Path,
    base_dir: &Path,
) -> Result<Vec<CopiedFile>> {
    let relative_destination =
        destination_dir
            .strip_prefix(base_dir)
            .map_err(|_| Error::InvalidPath {
                path: destination_dir.to_path_buf(),
                reason: format!("not under root directory {}", base_dir.display()),
            })?;

    // Collect first so copies landing inside the source tree are not revisited
    let mut sources = Vec::new();
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to walk {}: {}",
                source_dir.display(),
                e
            )))
        })?;
        if entry.file_type().is_file() {
            sources.push(entry.into_path());
        }
    }

    let mut copied = Vec::with_capacity(sources.len());
    for source in sources {
        let relative = source
            .strip_prefix(source_dir)
            .map_err(|_| Error::InvalidPath {
                path: source.clone(),
                reason: "outside staging directory".to_string(),
            })?
            .to_path_buf();
        let target = destination_dir.join(&relative);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source, &target)?;

        copied.push(CopiedFile {
            source,
            relative_path: relative_destination.join(&relative).to_string_lossy().into_owned(),
        });
    }

    tracing::debug!(
        source = ?source_dir,
        destination = ?destination_dir,
        count = copied.len(),
        "copied staged files"
    );

    Ok(copied)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_name_is_an_error() {
        let paths: StagingPaths = [("input", "/staging/j1/nb.ipynb")].into_iter().collect();

        assert_eq!(
            paths.input().unwrap(),
            Path::new("/staging/j1/nb.ipynb")
        );
        assert_eq!(paths.staging_dir().unwrap(), Path::new("/staging/j1"));
        assert!(matches!(
            paths.get("html"),
            Err(Error::MissingStagingPath(ref name)) if name == "html"
        ));
    }

    #[test]
    fn format_for_finds_requested_format() {
        let paths: StagingPaths = [
            ("input", "/staging/j1/nb.ipynb"),
            ("html", "/staging/j1/nb.html"),
            ("pdf", "/staging/j1/nb.pdf"),
        ]
        .into_iter()
        .collect();
        let formats = vec!["html".to_string()];

        assert_eq!(paths.format_for(Path::new("/staging/j1/nb.html"), &formats), Some("html"));
        assert_eq!(paths.format_for(Path::new("/staging/j1/nb.pdf"), &formats), None);
        assert_eq!(paths.format_for(Path::new("/staging/j1/other.txt"), &formats), None);
    }

    #[test]
    fn format_for_ignores_input_sharing_a_path() {
        let paths: StagingPaths = [
            ("input", "/staging/j1/nb.ipynb"),
            ("ipynb", "/staging/j1/nb.ipynb"),
            ("notebook", "/staging/j1/nb.ipynb"),
        ]
        .into_iter()
        .collect();
        let path = Path::new("/staging/j1/nb.ipynb");

        let formats = vec!["ipynb".to_string(), "notebook".to_string()];
        assert_eq!(paths.format_for(path, &formats), Some("ipynb"));

        let formats = vec!["notebook".to_string(), "ipynb".to_string()];
        assert_eq!(paths.format_for(path, &formats), Some("notebook"));

        assert_eq!(paths.format_for(path, &[]), None);
    }

    #[test]
    fn copy_directory_preserves_relative_paths() {
        let root = tempdir().unwrap();
        let staging = root.path().join("staging");
        let output = root.path().join("jobs").join("j1");
        std::fs::create_dir_all(staging.join("nested")).unwrap();
        std::fs::write(staging.join("a.txt"), "a").unwrap();
        std::fs::write(staging.join("nested").join("b.txt"), "b").unwrap();

        let copied = copy_directory(&staging, &output, root.path()).unwrap();

        let relative: Vec<_> = copied.iter().map(|c| c.relative_path.as_str()).collect();
        assert_eq!(relative, vec!["jobs/j1/a.txt", "jobs/j1/nested/b.txt"]);
        assert_eq!(
            std::fs::read_to_string(output.join("nested").join("b.txt")).unwrap(),
            "b"
        );
        assert_eq!(copied[0].source, staging.join("a.txt"));
    }

    #[test]
    fn copy_directory_requires_destination_under_base() {
        let root = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "a").unwrap();

        let err = copy_directory(root.path(), elsewhere.path(), root.path().join("x").as_path())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }
}
