use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Files found under the source root, split by role.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Takeout JSON sidecars
    pub sidecars: Vec<PathBuf>,
    /// Everything that is not JSON
    pub media: Vec<PathBuf>,
    /// `.json` files that failed the sidecar name test
    pub ignored_json: usize,
}

/// Sidecars are named like `IMG_0001.jpg.supplemental-metadata.json`: exactly three dots.
/// Other JSON files (album metadata, print orders, ...) are ignored.
pub fn is_sidecar_name(file_name: &str) -> bool {
    file_name.matches('.').count() == 3
}

/// Recursively walk `root` and classify every regular file.
/// Any walk error is fatal. Paths are absolute when `root` is.
pub fn scan_directory(root: &Path) -> Result<ScanResult> {
    let mut result = ScanResult::default();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| Error::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if is_sidecar_name(name) {
                result.sidecars.push(path);
            } else {
                debug!(path = %path.display(), "ignoring non-sidecar JSON file");
                result.ignored_json += 1;
            }
        } else {
            result.media.push(path);
        }
    }

    Ok(result)
}
