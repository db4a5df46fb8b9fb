//! Consumed interface to debug-file retrieval.
//!
//! The index only needs a readable local path per binary; whether that comes
//! from a literal path, a cache, or a symbol server is opaque behind the
//! trait.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub trait FileRetriever {
    fn check_exists(&self, path: &Path) -> bool;

    /// Resolves a binary (or split-debug file) to a local path, keyed by
    /// build-id and a hint path.
    fn retrieve(&self, build_id: &str, path: &Path) -> Result<PathBuf>;
}

/// Retriever for files already on disk; the build-id is informational.
#[derive(Debug, Default)]
pub struct LocalFileRetriever;

impl FileRetriever for LocalFileRetriever {
    fn check_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn retrieve(&self, _build_id: &str, path: &Path) -> Result<PathBuf> {
        if self.check_exists(path) {
            Ok(path.to_path_buf())
        } else {
            Err(Error::NotFound(format!(
                "no local file at {}",
                path.display()
            )))
        }
    }
}

/// Build-id keyed retriever over a fixed module map, for tests.
#[derive(Debug, Default)]
pub struct MockFileRetriever {
    modules: HashMap<String, PathBuf>,
}

impl MockFileRetriever {
    pub fn new(modules: HashMap<String, PathBuf>) -> MockFileRetriever {
        MockFileRetriever { modules }
    }
}

impl FileRetriever for MockFileRetriever {
    fn check_exists(&self, path: &Path) -> bool {
        self.modules.values().any(|p| p == path)
    }

    fn retrieve(&self, build_id: &str, _path: &Path) -> Result<PathBuf> {
        self.modules
            .get(build_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no module for build id {build_id}")))
    }
}
