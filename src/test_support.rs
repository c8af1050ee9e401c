//! Fixtures for unit tests: real directory trees whose alignment files are
//! served by a [`MemorySource`].

use crate::catalog::Catalog;
use crate::config::DatasetSpec;
use crate::formats::{AlignmentSource, MemoryFile, MemorySource};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) struct Fixture {
    dir: TempDir,
    pub source: MemorySource,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            source: MemorySource::default(),
        }
    }

    /// Canonical root of the tree, matching the paths the catalog sees
    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    /// Create an empty file at `relative`.
    pub fn touch(&self, relative: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"").unwrap();
        path
    }

    /// Create a file at `relative` whose contents are `file`.
    pub fn add(&mut self, relative: &str, file: MemoryFile) -> PathBuf {
        let path = self.touch(relative);
        self.source.insert(path.clone(), file);
        path
    }

    pub fn shared_source(&self) -> Arc<dyn AlignmentSource> {
        Arc::new(self.source.clone())
    }

    pub fn specs(&self, datasets: &[(&str, &str)]) -> Vec<DatasetSpec> {
        datasets
            .iter()
            .map(|(id, directory)| DatasetSpec {
                id: id.to_string(),
                directory: self.root().join(directory),
            })
            .collect()
    }

    pub fn catalog(&self, datasets: &[(&str, &str)], page_size: usize) -> Catalog {
        Catalog::build(&self.specs(datasets), self.shared_source(), page_size).unwrap()
    }
}
