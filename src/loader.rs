//! File identities and lazy surface loading.
//!
//! A [`FileCollection`] is an ordered list of paths plus the [`Loader`] that
//! turns a path into a [`Surface`]. Nothing is read when the collection is
//! built: each [`FileRef`] only opens its file when a worker calls
//! [`FileRef::open`], which consumes the reference.

use crate::error::{BatchError, Result};
use crate::pipeline::error::FileError;
use crate::surface::{HeightMap, Surface};
use anyhow::{bail, Context};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Produces a surface from a file identity.
///
/// Implementations are shared by every worker, so they must be `Sync`; each
/// call must return an independent surface.
#[cfg_attr(test, mockall::automock)]
pub trait Loader: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn Surface>>;
}

/// Loader backed by a closure.
pub struct FnLoader<F>(pub F);

impl<F> Loader for FnLoader<F>
where
    F: Fn(&Path) -> anyhow::Result<Box<dyn Surface>> + Send + Sync,
{
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn Surface>> {
        (self.0)(path)
    }
}

/// Display name of a file: its file name including extension.
pub fn file_identity(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One file of a batch, not yet loaded.
pub struct FileRef {
    index: usize,
    path: PathBuf,
    name: String,
    loader: Arc<dyn Loader>,
}

impl FileRef {
    /// Position in the collection's enumeration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the surface. Consumes the reference so a file is opened at most once.
    pub fn open(self) -> std::result::Result<Box<dyn Surface>, FileError> {
        self.loader.load(&self.path).map_err(|e| FileError::Load {
            file: self.name,
            cause: format!("{:#}", e),
        })
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRef")
            .field("index", &self.index)
            .field("path", &self.path)
            .finish()
    }
}

/// Ordered set of files to process, plus how to load them.
#[derive(Clone)]
pub struct FileCollection {
    paths: Vec<PathBuf>,
    loader: Arc<dyn Loader>,
}

impl FileCollection {
    pub fn new<I, P>(paths: I, loader: Arc<dyn Loader>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            loader,
        }
    }

    /// All files in `dir` whose extension matches one of `extensions`
    /// (case-insensitive), sorted by path so enumeration order is stable.
    pub fn from_dir(
        dir: impl AsRef<Path>,
        extensions: &[&str],
        loader: Arc<dyn Loader>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            BatchError::Io(e).with_context(format!("Failed to list {:?}", dir))
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
            if path.is_file() && matches {
                paths.push(path);
            }
        }
        paths.sort();
        tracing::debug!("Found {} files in {:?}", paths.len(), dir);
        Ok(Self { paths, loader })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// File identities in enumeration order.
    pub fn names(&self) -> Vec<String> {
        self.paths.iter().map(|p| file_identity(p)).collect()
    }

    /// Lazy references in enumeration order.
    pub fn refs(&self) -> impl Iterator<Item = FileRef> + '_ {
        self.paths.iter().enumerate().map(|(index, path)| FileRef {
            index,
            path: path.clone(),
            name: file_identity(path),
            loader: Arc::clone(&self.loader),
        })
    }
}

impl fmt::Debug for FileCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCollection")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

/// Reads plain-text height grids into [`HeightMap`]s.
///
/// Format: one row of whitespace-separated heights per line. Lines starting
/// with `#` are comments; `# step_x: <value>` and `# step_y: <value>` set the
/// point spacing (default 1.0). `nan` marks a non-measured point.
#[derive(Debug, Clone)]
pub struct AsciiGridLoader {
    pub extensions: Vec<String>,
    pub default_step: f64,
}

impl Default for AsciiGridLoader {
    fn default() -> Self {
        Self {
            extensions: vec!["asc".to_string(), "txt".to_string()],
            default_step: 1.0,
        }
    }
}

impl AsciiGridLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, content: &str) -> anyhow::Result<HeightMap> {
        let mut step_x = self.default_step;
        let mut step_y = self.default_step;
        let mut rows: Vec<Vec<f64>> = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if let Some((key, value)) = comment.split_once(':') {
                    let target = match key.trim() {
                        "step_x" => Some(&mut step_x),
                        "step_y" => Some(&mut step_y),
                        _ => None,
                    };
                    if let Some(target) = target {
                        *target = value.trim().parse().with_context(|| {
                            format!("invalid {} on line {}", key.trim(), line_no + 1)
                        })?;
                    }
                }
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|tok| tok.parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("non-numeric value on line {}", line_no + 1))?;
            if let Some(first) = rows.first() {
                if first.len() != row.len() {
                    bail!(
                        "line {} has {} values, expected {}",
                        line_no + 1,
                        row.len(),
                        first.len()
                    );
                }
            }
            rows.push(row);
        }

        if rows.is_empty() {
            bail!("file contains no height data");
        }
        HeightMap::from_rows(rows, step_x, step_y).map_err(anyhow::Error::from)
    }
}

impl Loader for AsciiGridLoader {
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn Surface>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)) {
            bail!("unsupported file format '.{}'", ext);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Ok(Box::new(self.parse(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_with_header() {
        let loader = AsciiGridLoader::new();
        let map = loader
            .parse("# step_x: 0.5\n# step_y: 0.25\n1 2 3\n4 5 6\n")
            .unwrap();
        assert_eq!((map.nx(), map.ny()), (3, 2));
        assert_eq!(map.step_x(), 0.5);
        assert_eq!(map.step_y(), 0.25);
        assert_eq!(map.get(2, 1), 6.0);
    }

    #[test]
    fn test_parse_rejects_ragged_and_empty() {
        let loader = AsciiGridLoader::new();
        assert!(loader.parse("1 2 3\n4 5\n").is_err());
        assert!(loader.parse("# only a comment\n").is_err());
        assert!(loader.parse("1 two 3\n").is_err());
    }

    #[test]
    fn test_parse_nan_is_nonmeasured() {
        let map = AsciiGridLoader::new().parse("1 nan\n3 4\n").unwrap();
        assert_eq!(map.nonmeasured_count(), 1);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.vk4");
        std::fs::write(&path, "1 2\n3 4\n").unwrap();
        let err = AsciiGridLoader::new().load(&path).err().unwrap();
        assert!(err.to_string().contains("unsupported file format"));
    }

    #[test]
    fn test_from_dir_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.asc", "a.ASC", "c.txt", "notes.md"] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            writeln!(f, "1 2").unwrap();
        }
        let files =
            FileCollection::from_dir(dir.path(), &["asc"], Arc::new(AsciiGridLoader::new()))
                .unwrap();
        assert_eq!(files.names(), vec!["a.ASC", "b.asc"]);
    }

    #[test]
    fn test_file_ref_open_is_lazy_and_single_shot() {
        let mut mock = MockLoader::new();
        mock.expect_load()
            .times(1)
            .returning(|_| Ok(Box::new(HeightMap::new(vec![1.0; 4], 2, 2, 1.0, 1.0).unwrap())));
        let files = FileCollection::new(["x/one.asc"], Arc::new(mock));
        let file = files.refs().next().unwrap();
        assert_eq!(file.name(), "one.asc");
        assert_eq!(file.index(), 0);
        assert!(file.open().is_ok());
    }

    #[test]
    fn test_open_maps_loader_failure() {
        let loader = FnLoader(|_: &Path| -> anyhow::Result<Box<dyn Surface>> {
            Err(anyhow::anyhow!("corrupt header"))
        });
        let files = FileCollection::new(["bad.asc"], Arc::new(loader));
        let err = files.refs().next().unwrap().open().err().unwrap();
        assert_eq!(
            err,
            FileError::Load {
                file: "bad.asc".into(),
                cause: "corrupt header".into()
            }
        );
    }
}
