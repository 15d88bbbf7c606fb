use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::index::UploadJob;
use crate::pool::WorkerPool;
use crate::remote::Remote;
use crate::ProgressCallback;

/// Per-file retry behaviour for transient server answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Worth retrying: 404 while a fresh folder propagates, 504 from a proxy
    Transient,
    Fatal,
}

pub fn classify_upload_status(status: StatusCode) -> StatusClass {
    match status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => StatusClass::Success,
        StatusCode::NOT_FOUND | StatusCode::GATEWAY_TIMEOUT => StatusClass::Transient,
        _ => StatusClass::Fatal,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFailure {
    /// Non-retryable status
    Rejected(StatusCode),
    /// Still transient after the last attempt
    RetriesExhausted(StatusCode),
    /// No status at all: unreadable local file or connection failure
    Transport(String),
    /// Local name is empty or not valid UTF-8, so it has no remote name
    InvalidName,
}

impl std::fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(status) => write!(f, "rejected with {}", status),
            Self::RetriesExhausted(status) => write!(f, "gave up after retries, last status {}", status),
            Self::Transport(reason) => write!(f, "{}", reason),
            Self::InvalidName => write!(f, "file name is empty or not valid UTF-8"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub job: UploadJob,
    pub retries: u32,
    pub result: Result<StatusCode, UploadFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    /// One unit per finished job, successful or not
    pub progress_units: u64,
    pub failures: Vec<(PathBuf, String)>,
}

impl UploadReport {
    fn record(&mut self, outcome: &UploadOutcome) {
        self.retries += u64::from(outcome.retries);
        self.progress_units += 1;
        match &outcome.result {
            Ok(_) => self.succeeded += 1,
            Err(failure) => {
                self.failed += 1;
                self.failures.push((outcome.job.path.clone(), failure.to_string()));
            }
        }
    }
}

/// Name shown in progress messages; lossy for names that cannot be uploaded.
fn display_name(job: &UploadJob) -> String {
    job.path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Remote file name for a job, if it has a usable one.
fn remote_name(job: &UploadJob) -> Option<&str> {
    job.path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}

/// Transfer one file to `{bucket}/{file name}`, retrying transient statuses.
pub fn upload_one(remote: &dyn Remote, job: UploadJob, retry: &RetryPolicy) -> UploadOutcome {
    let Some(name) = remote_name(&job).map(str::to_owned) else {
        warn!(path = %job.path.display(), "file name cannot be used remotely, skipping upload");
        return UploadOutcome {
            job,
            retries: 0,
            result: Err(UploadFailure::InvalidName),
        };
    };
    let dir = job.bucket.to_string();
    let max_attempts = retry.max_attempts.max(1);
    let mut retries = 0;

    let result = loop {
        let attempt = retries + 1;
        let status = match remote.put_file(&dir, &name, &job.path) {
            Ok(status) => status,
            Err(err) => break Err(UploadFailure::Transport(err.to_string())),
        };

        match classify_upload_status(status) {
            StatusClass::Success => {
                debug!(path = %job.path.display(), %status, attempt, "uploaded");
                break Ok(status);
            }
            StatusClass::Transient if attempt < max_attempts => {
                warn!(
                    path = %job.path.display(),
                    remote = %format!("{}/{}", dir, name),
                    %status,
                    attempt,
                    "transient upload failure, retrying"
                );
                retries += 1;
                thread::sleep(retry.delay);
            }
            StatusClass::Transient => break Err(UploadFailure::RetriesExhausted(status)),
            StatusClass::Fatal => break Err(UploadFailure::Rejected(status)),
        }
    };

    if let Err(failure) = &result {
        warn!(path = %job.path.display(), %failure, "upload failed");
    }
    UploadOutcome { job, retries, result }
}

/// Upload every job on a pool of `parallelism` workers.
///
/// Workers report each finished job over a bounded channel to this thread,
/// which owns all counters and drives `progress`. The channel closes only
/// after the last worker has exited, so no outcome is lost.
pub fn upload_all(
    remote: &dyn Remote,
    jobs: Vec<UploadJob>,
    parallelism: usize,
    retry: &RetryPolicy,
    progress: &ProgressCallback<'_>,
) -> UploadReport {
    let total = jobs.len() as u64;
    let mut report = UploadReport {
        total,
        ..Default::default()
    };
    info!(files = total, workers = parallelism, "uploading media files");

    let (progress_tx, outcomes) = bounded::<UploadOutcome>(parallelism.max(1));
    thread::scope(|s| {
        let pool = WorkerPool::spawn(s, parallelism, move |job: UploadJob| {
            let _ = progress_tx.send(upload_one(remote, job, retry));
        });
        for job in jobs {
            pool.submit(job);
        }
        let joiner = s.spawn(move || pool.join());

        for outcome in outcomes.iter() {
            report.record(&outcome);
            progress("upload", report.progress_units, total, &display_name(&outcome.job));
        }

        if joiner.join().unwrap_or_default() > 0 {
            error!(
                finished = report.progress_units,
                total, "upload workers died, some files were not attempted"
            );
        }
    });

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        retries = report.retries,
        "upload finished"
    );
    report
}
