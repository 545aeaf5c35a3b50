//! In-memory test doubles shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::ports::{Clock, FileSystem};

/// In-memory filesystem for exercising stores without touching disk.
///
/// Clones share the same tree, so a test can hand one clone to a
/// `ServiceContext` and inspect the files through another.
#[derive(Clone, Default)]
pub(crate) struct MemFs {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MemFs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_files(files: &[(&str, &str)]) -> Self {
        let fs = Self::new();
        {
            let mut map = fs.files.lock().unwrap();
            for (path, contents) in files {
                map.insert(PathBuf::from(path), (*contents).to_string());
            }
        }
        fs
    }

    /// Current contents of `path`, if present.
    pub(crate) fn read(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Every file in the tree with its contents.
    pub(crate) fn dump(&self) -> HashMap<PathBuf, String> {
        self.files.lock().unwrap().clone()
    }

    /// Makes every later write to `path` fail.
    pub(crate) fn fail_writes_to(&self, path: &str) {
        self.failing.lock().unwrap().insert(PathBuf::from(path));
    }
}

impl FileSystem for MemFs {
    fn read_to_string(&self, path: &Path) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let files = self.files.lock().unwrap();
        files.get(path).cloned().ok_or_else(|| format!("File not found: {}", path.display()).into())
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(format!("injected write failure: {}", path.display()).into());
        }
        let mut files = self.files.lock().unwrap();
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        // Exact file, or a directory some file lives under.
        files.contains_key(path) || files.keys().any(|k| k.starts_with(path) && k != path)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
        let files = self.files.lock().unwrap();
        let mut names: Vec<String> = files
            .keys()
            .filter(|k| k.parent() == Some(path))
            .filter_map(|k| k.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn remove(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut files = self.files.lock().unwrap();
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| format!("File not found: {}", path.display()).into())
    }
}

/// Clock frozen at one instant.
pub(crate) struct FixedClock(pub(crate) DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
