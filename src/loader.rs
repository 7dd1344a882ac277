use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;
use parking_lot::Mutex;

use crate::mesh::Mesh;
use crate::obj::load_obj_from_str;

/// Reads asset files relative to a root directory, caching their bytes.
#[derive(Debug)]
pub struct AssetLoader {
    root: PathBuf,
    cache: Mutex<HashMap<PathBuf, Arc<[u8]>>>,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// File contents, read from disk only the first time a path is requested.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Arc<[u8]>> {
        let resolved = self.resolve(path);
        if let Some(bytes) = self.cache.lock().get(&resolved) {
            return Ok(Arc::clone(bytes));
        }
        let bytes: Arc<[u8]> = fs::read(&resolved)
            .with_context(|| format!("failed to read asset {}", resolved.display()))?
            .into();
        debug!("loaded {} ({} bytes)", resolved.display(), bytes.len());
        self.cache.lock().insert(resolved, Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Loads and parses an OBJ mesh.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Mesh> {
        let path = path.as_ref();
        let bytes = self.read(path)?;
        let text = std::str::from_utf8(&bytes)
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        load_obj_from_str(text).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn cached_files(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    #[test]
    fn files_are_read_once() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TRIANGLE.as_bytes()).unwrap();
        let loader = AssetLoader::new(".");
        let first = loader.load(file.path()).unwrap();
        std::fs::write(file.path(), b"garbage").unwrap();
        let second = loader.load(file.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.cached_files(), 1);
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tri.obj"), TRIANGLE).unwrap();
        let loader = AssetLoader::new(dir.path());
        assert_eq!(loader.load("tri.obj").unwrap().triangle_count(), 1);
    }

    #[test]
    fn missing_file_reports_path() {
        let loader = AssetLoader::new("/nonexistent");
        let err = loader.load("missing.obj").unwrap_err();
        assert!(format!("{err:#}").contains("missing.obj"));
    }
}
