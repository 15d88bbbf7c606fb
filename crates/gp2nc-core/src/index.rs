use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::date::Bucket;

/// Which resolver produced an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Sidecar,
    Embedded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub bucket: Bucket,
    pub origin: Origin,
}

/// A file to transfer and the folder it belongs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub path: PathBuf,
    pub bucket: Bucket,
}

/// Authoritative local path -> bucket mapping for one run.
#[derive(Debug, Default)]
pub struct PathIndex {
    entries: HashMap<PathBuf, IndexEntry>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sidecar-resolved bucket. Later sidecars naming the same media win.
    /// Returns the bucket that was replaced, if any.
    pub fn insert_sidecar(&mut self, path: PathBuf, bucket: Bucket) -> Option<Bucket> {
        self.entries
            .insert(
                path,
                IndexEntry {
                    bucket,
                    origin: Origin::Sidecar,
                },
            )
            .map(|previous| previous.bucket)
    }

    /// Record an embedded-metadata bucket unless the path is already indexed.
    /// Returns `false` (and keeps the existing entry) on conflict.
    pub fn insert_embedded(&mut self, path: PathBuf, bucket: Bucket) -> bool {
        if self.entries.contains_key(&path) {
            return false;
        }
        self.entries.insert(
            path,
            IndexEntry {
                bucket,
                origin: Origin::Embedded,
            },
        );
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &IndexEntry)> {
        self.entries.iter()
    }

    /// Rewrite every sentinel-year bucket (`0001/MM`) to `2000/MM`.
    /// Returns the number of entries rewritten.
    pub fn normalize_sentinels(&mut self) -> usize {
        let mut rewritten = 0;
        for entry in self.entries.values_mut() {
            if entry.bucket.is_sentinel() {
                entry.bucket = entry.bucket.normalized();
                rewritten += 1;
            }
        }
        rewritten
    }

    /// Distinct buckets, i.e. the remote folders the upload phase needs.
    pub fn buckets(&self) -> BTreeSet<Bucket> {
        self.entries.values().map(|entry| entry.bucket).collect()
    }

    pub fn upload_jobs(&self) -> Vec<UploadJob> {
        self.entries
            .iter()
            .map(|(path, entry)| UploadJob {
                path: path.clone(),
                bucket: entry.bucket,
            })
            .collect()
    }
}
