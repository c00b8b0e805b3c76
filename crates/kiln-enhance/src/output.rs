//! Destinations for finished classes. Each class may be written once.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use kiln_types::ClassName;
use parking_lot::Mutex;

use crate::error::EnhanceError;

pub trait ClassOutput: Send + Sync {
    fn write(&self, name: &ClassName, bytes: &[u8]) -> Result<(), EnhanceError>;
}

/// Keeps written classes in memory.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    classes: Mutex<BTreeMap<ClassName, Vec<u8>>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.classes.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<ClassName> {
        self.classes.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.classes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.lock().is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<ClassName, Vec<u8>> {
        self.classes.into_inner()
    }
}

impl ClassOutput for MemoryOutput {
    fn write(&self, name: &ClassName, bytes: &[u8]) -> Result<(), EnhanceError> {
        let mut classes = self.classes.lock();
        if classes.contains_key(name) {
            return Err(EnhanceError::DuplicateOutput {
                class: name.clone(),
            });
        }
        classes.insert(name.clone(), bytes.to_vec());
        Ok(())
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `<root>/<internal name>.class`, replacing files atomically.
#[derive(Debug)]
pub struct DirectoryOutput {
    root: PathBuf,
    written: Mutex<BTreeSet<ClassName>>,
}

impl DirectoryOutput {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &ClassName) -> PathBuf {
        self.root.join(format!("{}.class", name.internal_name()))
    }
}

impl ClassOutput for DirectoryOutput {
    fn write(&self, name: &ClassName, bytes: &[u8]) -> Result<(), EnhanceError> {
        if !self.written.lock().insert(name.clone()) {
            return Err(EnhanceError::DuplicateOutput {
                class: name.clone(),
            });
        }
        let path = self.path_of(name);
        write_atomic(&path, bytes).map_err(|source| {
            // A failed write may be retried.
            self.written.lock().remove(name);
            EnhanceError::Io { path, source }
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent directory"))?;
    fs::create_dir_all(parent)?;

    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.{}.{counter}.tmp", std::process::id()));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
