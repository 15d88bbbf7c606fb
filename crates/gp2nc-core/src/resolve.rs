//! Date resolution: JSON sidecars first, embedded metadata for whatever is left.

use std::fs;
use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::date::exif::read_embedded_dates;
use crate::date::json::SidecarMetadata;
use crate::date::Bucket;
use crate::index::PathIndex;

/// OS artifacts that are never media.
const DENYLISTED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".localized"];

/// Why a file contributed nothing to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Sidecar could not be read from disk
    Unreadable,
    /// Neither `photoTakenTime` nor `creationTime` parsed
    NoTimestamp,
    /// Sidecar has a date but names no media file
    MissingTitle,
    /// OS artifact such as `.DS_Store`
    Denylisted,
    /// Vanished or not a regular file
    NotRegularFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarOutcome {
    Resolved { media: PathBuf, bucket: Bucket },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// Embedded metadata carried a usable date
    Embedded(Bucket),
    /// Metadata unreadable or dateless; filed under `0001/01`
    Sentinel,
    Skipped(SkipReason),
}

/// Counts from both resolution passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub sidecars_resolved: u64,
    /// Sidecars that replaced an earlier sidecar's bucket for the same media
    pub sidecar_overrides: u64,
    pub embedded_resolved: u64,
    pub embedded_sentinel: u64,
    /// Embedded results dropped because the path was already indexed
    pub conflicts: u64,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

impl ResolutionReport {
    pub fn skipped_count(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|(_, r)| *r == reason).count()
    }
}

/// Resolve one sidecar to its media path and bucket.
/// Malformed JSON is treated as an empty document rather than an error.
pub fn resolve_sidecar(sidecar: &Path) -> SidecarOutcome {
    let bytes = match fs::read(sidecar) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %sidecar.display(), error = %err, "failed to read sidecar");
            return SidecarOutcome::Skipped(SkipReason::Unreadable);
        }
    };

    let meta = SidecarMetadata::parse(&bytes).unwrap_or_else(|err| {
        warn!(path = %sidecar.display(), error = %err, "malformed sidecar JSON, treating as empty");
        SidecarMetadata::default()
    });

    let Some(bucket) = meta.bucket() else {
        debug!(path = %sidecar.display(), "sidecar has no usable timestamp");
        return SidecarOutcome::Skipped(SkipReason::NoTimestamp);
    };
    if meta.title.is_empty() {
        debug!(path = %sidecar.display(), "sidecar has no title");
        return SidecarOutcome::Skipped(SkipReason::MissingTitle);
    }

    let dir = sidecar.parent().unwrap_or_else(|| Path::new(""));
    SidecarOutcome::Resolved {
        media: join_title(dir, &meta.title),
        bucket,
    }
}

/// Join a sidecar title onto its directory, resolving `.` and `..` lexically
/// so the result matches the path the directory walk reports. A title can
/// never replace the directory, even when it starts with a separator.
pub fn join_title(dir: &Path, title: &str) -> PathBuf {
    let mut path = PathBuf::new();
    let title_parts = Path::new(title)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)));
    for component in dir.components().chain(title_parts) {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match path.components().next_back() {
                Some(Component::Normal(_)) => {
                    path.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => path.push(".."),
            },
            other => path.push(other),
        }
    }
    path
}

/// Index every sidecar's media. Duplicate targets: the last sidecar processed wins.
pub fn resolve_sidecars(sidecars: &[PathBuf], index: &mut PathIndex, report: &mut ResolutionReport) {
    for sidecar in sidecars {
        match resolve_sidecar(sidecar) {
            SidecarOutcome::Resolved { media, bucket } => {
                if let Some(previous) = index.insert_sidecar(media.clone(), bucket) {
                    debug!(
                        path = %media.display(),
                        %previous,
                        %bucket,
                        "sidecar overrides earlier sidecar"
                    );
                    report.sidecar_overrides += 1;
                }
                report.sidecars_resolved += 1;
            }
            SidecarOutcome::Skipped(reason) => report.skipped.push((sidecar.clone(), reason)),
        }
    }
}

pub fn is_os_artifact(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    DENYLISTED_NAMES.contains(&name) || name.starts_with("._")
}

/// Date a media file from its embedded metadata. Never fails: anything
/// unreadable ends up in the sentinel bucket.
pub fn resolve_embedded(path: &Path) -> FallbackOutcome {
    if is_os_artifact(path) {
        return FallbackOutcome::Skipped(SkipReason::Denylisted);
    }
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return FallbackOutcome::Skipped(SkipReason::NotRegularFile),
    }

    match read_embedded_dates(path) {
        Ok(dates) => {
            if dates.created.is_none() && dates.original.is_some() {
                debug!(path = %path.display(), "no creation timestamp, using original timestamp");
            }
            let bucket = dates.bucket();
            if bucket.is_sentinel() {
                warn!(path = %path.display(), "no embedded date, using {}", Bucket::SENTINEL);
                FallbackOutcome::Sentinel
            } else {
                FallbackOutcome::Embedded(bucket)
            }
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "cannot read embedded metadata, using {}",
                Bucket::SENTINEL
            );
            FallbackOutcome::Sentinel
        }
    }
}

/// Index media that no sidecar claimed, reading metadata in parallel.
/// The index is only touched from the calling thread.
pub fn resolve_fallback(media: &[PathBuf], index: &mut PathIndex, report: &mut ResolutionReport) {
    let candidates: Vec<&PathBuf> = media.iter().filter(|path| !index.contains(path)).collect();

    let outcomes: Vec<(PathBuf, FallbackOutcome)> = candidates
        .par_iter()
        .map(|path| ((*path).clone(), resolve_embedded(path)))
        .collect();

    for (path, outcome) in outcomes {
        let bucket = match outcome {
            FallbackOutcome::Embedded(bucket) => {
                report.embedded_resolved += 1;
                bucket
            }
            FallbackOutcome::Sentinel => {
                report.embedded_sentinel += 1;
                Bucket::SENTINEL
            }
            FallbackOutcome::Skipped(reason) => {
                report.skipped.push((path, reason));
                continue;
            }
        };
        if !index.insert_embedded(path.clone(), bucket) {
            warn!(path = %path.display(), "media file already indexed, keeping existing bucket");
            report.conflicts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::exif::jpeg_with_date_original;
    use crate::index::Origin;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn write_sidecar(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_resolve_sidecar_uses_title() {
        let dir = tempdir().unwrap();
        let sidecar = write_sidecar(
            dir.path(),
            "whatever.jpg.supplemental-metadata.json",
            r#"{"title": "IMG_0001.jpg", "photoTakenTime": {"timestamp": "2019-07-14T10:20:30Z"}}"#,
        );
        assert_eq!(
            resolve_sidecar(&sidecar),
            SidecarOutcome::Resolved {
                media: dir.path().join("IMG_0001.jpg"),
                bucket: Bucket::parse("2019/07").unwrap(),
            }
        );
    }

    #[test]
    fn test_join_title_is_lexically_clean() {
        assert_eq!(join_title(Path::new("/t/album"), "../IMG.jpg"), PathBuf::from("/t/IMG.jpg"));
        assert_eq!(join_title(Path::new("/t/album"), "./a/../b.jpg"), PathBuf::from("/t/album/b.jpg"));
        assert_eq!(join_title(Path::new("/t/album"), "/etc/x.jpg"), PathBuf::from("/t/album/etc/x.jpg"));
        assert_eq!(join_title(Path::new("/t"), "../../x.jpg"), PathBuf::from("/x.jpg"));
        assert_eq!(join_title(Path::new("album"), "../../x.jpg"), PathBuf::from("../x.jpg"));
    }

    #[test]
    fn test_parent_relative_title_is_indexed_once() {
        let dir = tempdir().unwrap();
        let root = std::path::absolute(dir.path()).unwrap();
        let album = root.join("album");
        fs::create_dir_all(&album).unwrap();
        let photo = root.join("IMG.jpg");
        fs::write(&photo, b"no exif here").unwrap();
        let sidecar = write_sidecar(
            &album,
            "IMG.jpg.supplemental-metadata.json",
            r#"{"title": "../IMG.jpg", "photoTakenTime": {"timestamp": "1563099630"}}"#,
        );

        let mut index = PathIndex::new();
        let mut report = ResolutionReport::default();
        resolve_sidecars(&[sidecar], &mut index, &mut report);
        resolve_fallback(&[photo.clone()], &mut index, &mut report);

        assert_eq!(index.len(), 1);
        let entry = index.get(&photo).unwrap();
        assert_eq!(entry.origin, Origin::Sidecar);
        assert_eq!(entry.bucket.to_string(), "2019/07");
        assert_eq!(report.embedded_sentinel, 0);
    }

    #[test]
    fn test_resolve_sidecar_falls_back_to_creation_time() {
        let dir = tempdir().unwrap();
        let sidecar = write_sidecar(
            dir.path(),
            "a.jpg.supplemental-metadata.json",
            r#"{"title": "a.jpg", "photoTakenTime": {"timestamp": "garbage"},
                "creationTime": {"timestamp": "1614556800"}}"#,
        );
        let SidecarOutcome::Resolved { bucket, .. } = resolve_sidecar(&sidecar) else {
            panic!("expected a resolved sidecar");
        };
        assert_eq!(bucket.to_string(), "2021/03");
    }

    #[test]
    fn test_malformed_and_dateless_sidecars_are_skipped() {
        let dir = tempdir().unwrap();
        let bad = write_sidecar(dir.path(), "a.jpg.supplemental-metadata.json", "{ nope");
        let dateless = write_sidecar(dir.path(), "b.jpg.supplemental-metadata.json", r#"{"title": "b.jpg"}"#);
        let untitled = write_sidecar(
            dir.path(),
            "c.jpg.supplemental-metadata.json",
            r#"{"photoTakenTime": {"timestamp": "1614556800"}}"#,
        );

        let mut index = PathIndex::new();
        let mut report = ResolutionReport::default();
        resolve_sidecars(&[bad, dateless, untitled], &mut index, &mut report);

        assert!(index.is_empty());
        assert_eq!(report.sidecars_resolved, 0);
        assert_eq!(report.skipped_count(SkipReason::NoTimestamp), 2);
        assert_eq!(report.skipped_count(SkipReason::MissingTitle), 1);
    }

    #[test]
    fn test_duplicate_sidecar_targets_last_wins() {
        let dir = tempdir().unwrap();
        let first = write_sidecar(
            dir.path(),
            "a.jpg.supplemental-metadata.json",
            r#"{"title": "a.jpg", "photoTakenTime": {"timestamp": "2019-01-01T00:00:00Z"}}"#,
        );
        let second = write_sidecar(
            dir.path(),
            "a.jpg.supplemental-metad(1).json",
            r#"{"title": "a.jpg", "photoTakenTime": {"timestamp": "2020-02-01T00:00:00Z"}}"#,
        );

        let mut index = PathIndex::new();
        let mut report = ResolutionReport::default();
        resolve_sidecars(&[first, second], &mut index, &mut report);

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(&dir.path().join("a.jpg")).unwrap().bucket.to_string(),
            "2020/02"
        );
        assert_eq!(report.sidecar_overrides, 1);
    }

    #[test]
    fn test_resolve_embedded_outcomes() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("orphan.jpg");
        fs::write(&photo, jpeg_with_date_original("2016:11:05 08:00:00")).unwrap();
        let junk = dir.path().join("notes.txt");
        fs::write(&junk, b"not media").unwrap();
        let ds_store = dir.path().join(".DS_Store");
        fs::write(&ds_store, b"\0\0\0\x01Bud1").unwrap();

        assert_eq!(
            resolve_embedded(&photo),
            FallbackOutcome::Embedded(Bucket::parse("2016/11").unwrap())
        );
        assert_eq!(resolve_embedded(&junk), FallbackOutcome::Sentinel);
        assert_eq!(
            resolve_embedded(&ds_store),
            FallbackOutcome::Skipped(SkipReason::Denylisted)
        );
        assert_eq!(
            resolve_embedded(&dir.path().join("gone.jpg")),
            FallbackOutcome::Skipped(SkipReason::NotRegularFile)
        );
    }

    #[test]
    fn test_fallback_only_touches_unindexed_media() {
        let dir = tempdir().unwrap();
        let claimed = dir.path().join("claimed.jpg");
        let orphan = dir.path().join("orphan.jpg");
        let broken = dir.path().join("broken.jpg");
        fs::write(&claimed, jpeg_with_date_original("2001:01:01 00:00:00")).unwrap();
        fs::write(&orphan, jpeg_with_date_original("2016:11:05 08:00:00")).unwrap();
        fs::write(&broken, b"truncated").unwrap();

        let mut index = PathIndex::new();
        index.insert_sidecar(claimed.clone(), Bucket::parse("2019/07").unwrap());
        let mut report = ResolutionReport::default();
        resolve_fallback(&[claimed.clone(), orphan.clone(), broken.clone()], &mut index, &mut report);

        assert_eq!(index.len(), 3);
        let claimed_entry = index.get(&claimed).unwrap();
        assert_eq!(claimed_entry.origin, Origin::Sidecar);
        assert_eq!(claimed_entry.bucket.to_string(), "2019/07");
        assert_eq!(index.get(&orphan).unwrap().bucket.to_string(), "2016/11");
        assert_eq!(index.get(&broken).unwrap().bucket, Bucket::SENTINEL);
        assert_eq!(report.embedded_resolved, 1);
        assert_eq!(report.embedded_sentinel, 1);
        assert_eq!(report.conflicts, 0);

        let embedded: HashSet<_> = index
            .iter()
            .filter(|(_, e)| e.origin == Origin::Embedded)
            .map(|(p, _)| p.clone())
            .collect();
        assert_eq!(embedded, HashSet::from([orphan, broken]));
    }
}
