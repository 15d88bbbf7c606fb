use std::collections::BTreeSet;
use std::thread;

use crossbeam_channel::unbounded;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::date::Bucket;
use crate::pool::WorkerPool;
use crate::remote::Remote;
use crate::ProgressCallback;

/// How the server answered a collection request that counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentStatus {
    Created,
    AlreadyExists,
}

/// MKCOL on an existing collection answers 405 (or 204 on some servers);
/// both are treated as success.
pub fn classify_collection_status(status: StatusCode) -> Option<SegmentStatus> {
    match status {
        StatusCode::CREATED | StatusCode::OK => Some(SegmentStatus::Created),
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NO_CONTENT => Some(SegmentStatus::AlreadyExists),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOutcome {
    Provisioned {
        bucket: Bucket,
        segments: Vec<(String, SegmentStatus)>,
    },
    /// Stopped at `segment`; deeper segments were not attempted.
    Failed {
        bucket: Bucket,
        segment: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub buckets_total: u64,
    pub buckets_provisioned: u64,
    pub segments_created: u64,
    pub segments_existing: u64,
    pub failed_buckets: Vec<String>,
}

impl ProvisionReport {
    fn record(&mut self, outcome: &BucketOutcome) {
        match outcome {
            BucketOutcome::Provisioned { segments, .. } => {
                self.buckets_provisioned += 1;
                for (_, status) in segments {
                    match status {
                        SegmentStatus::Created => self.segments_created += 1,
                        SegmentStatus::AlreadyExists => self.segments_existing += 1,
                    }
                }
            }
            BucketOutcome::Failed { bucket, .. } => self.failed_buckets.push(bucket.to_string()),
        }
    }
}

/// Create every folder segment of one bucket, parent first.
pub fn provision_bucket(remote: &dyn Remote, bucket: Bucket) -> BucketOutcome {
    let mut segments = Vec::new();
    for segment in bucket.segments() {
        let failure = match remote.create_collection(&segment) {
            Ok(status) => match classify_collection_status(status) {
                Some(segment_status) => {
                    if segment_status == SegmentStatus::Created {
                        info!(folder = %segment, "created folder");
                    } else {
                        debug!(folder = %segment, %status, "folder already exists");
                    }
                    segments.push((segment, segment_status));
                    continue;
                }
                None => format!("unexpected status {}", status),
            },
            Err(err) => err.to_string(),
        };
        warn!(%bucket, folder = %segment, reason = %failure, "failed to create folder");
        return BucketOutcome::Failed {
            bucket,
            segment,
            reason: failure,
        };
    }
    BucketOutcome::Provisioned { bucket, segments }
}

/// Provision all buckets on a pool of `parallelism` workers. Returns only once
/// every bucket has succeeded or failed.
pub fn provision_directories(
    remote: &dyn Remote,
    buckets: &BTreeSet<Bucket>,
    parallelism: usize,
    progress: &ProgressCallback<'_>,
) -> ProvisionReport {
    let total = buckets.len() as u64;
    let mut report = ProvisionReport {
        buckets_total: total,
        ..Default::default()
    };
    info!(buckets = total, workers = parallelism, "creating remote folders");

    let (results_tx, results) = unbounded::<BucketOutcome>();
    thread::scope(|s| {
        let pool = WorkerPool::spawn(s, parallelism, move |bucket: Bucket| {
            let _ = results_tx.send(provision_bucket(remote, bucket));
        });
        for bucket in buckets {
            pool.submit(*bucket);
        }
        let joiner = s.spawn(move || pool.join());

        for (done, outcome) in results.iter().enumerate() {
            report.record(&outcome);
            let bucket = match &outcome {
                BucketOutcome::Provisioned { bucket, .. } | BucketOutcome::Failed { bucket, .. } => bucket,
            };
            progress("provision", done as u64 + 1, total, &bucket.to_string());
        }
        let _ = joiner.join();
    });

    info!(
        provisioned = report.buckets_provisioned,
        failed = report.failed_buckets.len(),
        "remote folders ready"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::ScriptedRemote;
    use std::sync::Mutex;

    fn bucket(s: &str) -> Bucket {
        Bucket::parse(s).unwrap()
    }

    fn no_progress(_: &str, _: u64, _: u64, _: &str) {}

    #[test]
    fn test_classify_collection_status() {
        assert_eq!(classify_collection_status(StatusCode::CREATED), Some(SegmentStatus::Created));
        assert_eq!(classify_collection_status(StatusCode::OK), Some(SegmentStatus::Created));
        assert_eq!(
            classify_collection_status(StatusCode::METHOD_NOT_ALLOWED),
            Some(SegmentStatus::AlreadyExists)
        );
        assert_eq!(
            classify_collection_status(StatusCode::NO_CONTENT),
            Some(SegmentStatus::AlreadyExists)
        );
        assert_eq!(classify_collection_status(StatusCode::CONFLICT), None);
        assert_eq!(classify_collection_status(StatusCode::UNAUTHORIZED), None);
    }

    #[test]
    fn test_parent_created_before_child() {
        let remote = ScriptedRemote::new();
        let outcome = provision_bucket(&remote, bucket("2024/01"));
        assert_eq!(remote.mkcols(), vec!["2024".to_string(), "2024/01".to_string()]);
        assert_eq!(
            outcome,
            BucketOutcome::Provisioned {
                bucket: bucket("2024/01"),
                segments: vec![
                    ("2024".to_string(), SegmentStatus::Created),
                    ("2024/01".to_string(), SegmentStatus::Created),
                ],
            }
        );
    }

    #[test]
    fn test_shared_year_created_once() {
        let remote = ScriptedRemote::new();
        let buckets = BTreeSet::from([bucket("2024/01"), bucket("2024/02")]);
        let report = provision_directories(&remote, &buckets, 4, &no_progress);

        assert_eq!(report.buckets_provisioned, 2);
        assert!(report.failed_buckets.is_empty());
        // "2024" is requested twice; only the first request is an actual create.
        assert_eq!(report.segments_created, 3);
        assert_eq!(report.segments_existing, 1);
        assert_eq!(remote.mkcols().iter().filter(|p| *p == "2024").count(), 2);
    }

    #[test]
    fn test_failed_bucket_does_not_block_others() {
        let remote = ScriptedRemote::new();
        remote.script_mkcol("2023", &[StatusCode::INTERNAL_SERVER_ERROR]);
        let buckets = BTreeSet::from([bucket("2023/05"), bucket("2024/01")]);

        let report = provision_directories(&remote, &buckets, 2, &no_progress);

        assert_eq!(report.buckets_total, 2);
        assert_eq!(report.buckets_provisioned, 1);
        assert_eq!(report.failed_buckets, vec!["2023/05".to_string()]);
        let mkcols = remote.mkcols();
        assert!(!mkcols.contains(&"2023/05".to_string()));
        assert!(mkcols.contains(&"2024/01".to_string()));
    }

    #[test]
    fn test_progress_per_bucket() {
        let remote = ScriptedRemote::new();
        let buckets = BTreeSet::from([bucket("2020/01"), bucket("2021/06"), bucket("2000/12")]);
        let seen = Mutex::new(Vec::new());
        let progress = |stage: &str, current: u64, total: u64, _: &str| {
            seen.lock().unwrap().push((stage.to_string(), current, total));
        };

        provision_directories(&remote, &buckets, 2, &progress);

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last().unwrap(), &("provision".to_string(), 3, 3));
    }
}
