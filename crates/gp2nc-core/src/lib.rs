pub mod date;
pub mod error;
pub mod index;
pub mod pool;
pub mod provision;
pub mod remote;
pub mod resolve;
pub mod scan;
pub mod upload;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

pub use error::{Error, Result};
pub use index::PathIndex;
pub use remote::{Remote, RemoteConfig, WebDavClient};
pub use upload::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Root of the extracted Takeout tree
    pub source_root: PathBuf,
    pub remote: RemoteConfig,
    /// Worker count for both the folder and the upload phase
    pub parallelism: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl RunOptions {
    /// Checks that must pass before anything touches the disk or the network.
    pub fn validate(&self) -> Result<()> {
        if self.source_root.as_os_str().is_empty() {
            return Err(Error::Config("source directory is required".into()));
        }
        if self.remote.base_url.is_empty() {
            return Err(Error::Config("remote URL is required".into()));
        }
        if self.remote.username.is_empty() {
            return Err(Error::Config("remote username is required".into()));
        }
        if self.remote.password.is_empty() {
            return Err(Error::Config("remote password is required".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::Config("parallelism must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Type alias for progress callback: stage, current, total, message.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub sidecars: u64,
    pub media: u64,
    pub ignored_json: u64,
}

/// Everything one run learned and did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub scan: ScanSummary,
    pub resolution: resolve::ResolutionReport,
    /// Media files in the final index
    pub indexed: u64,
    /// Sentinel buckets moved to the placeholder year
    pub normalized: u64,
    pub provision: provision::ProvisionReport,
    pub upload: upload::UploadReport,
}

/// State owned by a single run. Built by the resolution phases, then only
/// read by provisioning and upload.
#[derive(Debug, Default)]
pub struct PipelineState {
    pub index: PathIndex,
    pub scan: ScanSummary,
    pub resolution: resolve::ResolutionReport,
    pub normalized: u64,
}

impl PipelineState {
    /// Scan `root`, resolve sidecars, date the remaining media from embedded
    /// metadata, then move sentinel buckets to the placeholder year.
    pub fn resolve(root: &Path) -> Result<Self> {
        let root = std::path::absolute(root)?;
        let scan = scan::scan_directory(&root)?;
        info!(
            root = %root.display(),
            sidecars = scan.sidecars.len(),
            media = scan.media.len(),
            "scanned source directory"
        );

        let mut state = PipelineState {
            scan: ScanSummary {
                sidecars: scan.sidecars.len() as u64,
                media: scan.media.len() as u64,
                ignored_json: scan.ignored_json as u64,
            },
            ..Default::default()
        };

        resolve::resolve_sidecars(&scan.sidecars, &mut state.index, &mut state.resolution);
        resolve::resolve_fallback(&scan.media, &mut state.index, &mut state.resolution);
        state.normalized = state.index.normalize_sentinels() as u64;

        info!(
            indexed = state.index.len(),
            from_sidecars = state.resolution.sidecars_resolved,
            from_metadata = state.resolution.embedded_resolved,
            undated = state.normalized,
            skipped = state.resolution.skipped.len(),
            "resolved media dates"
        );
        Ok(state)
    }
}

/// Run the full pipeline against the WebDAV server in `options`.
pub fn run(options: &RunOptions, progress: &ProgressCallback<'_>) -> Result<RunReport> {
    options.validate()?;
    let client = WebDavClient::new(&options.remote)?;
    run_with_remote(options, &client, progress)
}

/// Run the full pipeline against any [`Remote`].
///
/// Folder provisioning finishes completely, failures included, before the
/// first upload starts.
pub fn run_with_remote(
    options: &RunOptions,
    remote: &dyn Remote,
    progress: &ProgressCallback<'_>,
) -> Result<RunReport> {
    options.validate()?;
    let state = PipelineState::resolve(&options.source_root)?;

    let provision =
        provision::provision_directories(remote, &state.index.buckets(), options.parallelism, progress);
    let upload = upload::upload_all(
        remote,
        state.index.upload_jobs(),
        options.parallelism,
        &options.retry,
        progress,
    );

    Ok(RunReport {
        scan: state.scan,
        indexed: state.index.len() as u64,
        resolution: state.resolution,
        normalized: state.normalized,
        provision,
        upload,
    })
}
