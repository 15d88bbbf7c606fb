use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gp2nc",
    version,
    about = "Upload a Google Photos Takeout export to Nextcloud, sorted into YYYY/MM folders"
)]
struct Cli {
    /// WebDAV URL of the destination folder
    #[arg(long, env = "NEXTCLOUD_URL")]
    url: String,

    /// Nextcloud user name
    #[arg(long, env = "NEXTCLOUD_USER")]
    user: String,

    /// Nextcloud password or app password
    #[arg(long, env = "NEXTCLOUD_PASSWORD", hide_env_values = true)]
    password: String,

    /// Extracted Takeout directory
    #[arg(long, env = "PHOTOS_DIR")]
    photos_dir: PathBuf,

    /// Concurrent folder creations and uploads
    #[arg(long, env = "PARALLEL_UPLOADS", default_value_t = 1)]
    parallel: usize,

    /// Accept self-signed or otherwise unverifiable TLS certificates
    #[arg(long, env = "NEXTCLOUD_ACCEPT_INVALID_CERTS", default_value_t = true, action = ArgAction::Set)]
    accept_invalid_certs: bool,

    /// Attempts per file when the server answers 404 or 504
    #[arg(long, default_value_t = 3)]
    retry_attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = 2)]
    retry_delay_secs: u64,
}

/// One progress bar per pipeline stage, replaced when the stage changes.
#[derive(Default)]
struct StageBars {
    current: Mutex<Option<(String, ProgressBar)>>,
}

impl StageBars {
    fn update(&self, stage: &str, current: u64, total: u64, message: &str) {
        let Ok(mut slot) = self.current.lock() else {
            return;
        };
        if slot.as_ref().map_or(true, |(name, _)| name != stage) {
            if let Some((_, bar)) = slot.take() {
                bar.finish();
            }
            let style = ProgressStyle::with_template("[{prefix}] {wide_bar} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            let bar = ProgressBar::new(total).with_style(style).with_prefix(stage.to_string());
            *slot = Some((stage.to_string(), bar));
        }
        if let Some((_, bar)) = slot.as_ref() {
            bar.set_position(current);
            bar.set_message(message.to_string());
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.current.lock() {
            if let Some((_, bar)) = slot.take() {
                bar.finish();
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "gp2nc=info,gp2nc_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let options = gp2nc_core::RunOptions {
        source_root: cli.photos_dir,
        remote: gp2nc_core::RemoteConfig {
            base_url: cli.url,
            username: cli.user,
            password: cli.password,
            accept_invalid_certs: cli.accept_invalid_certs,
        },
        parallelism: cli.parallel,
        retry: gp2nc_core::RetryPolicy {
            max_attempts: cli.retry_attempts,
            delay: Duration::from_secs(cli.retry_delay_secs),
        },
    };

    tracing::info!(
        source = %options.source_root.display(),
        workers = options.parallelism,
        "starting Takeout upload"
    );

    let bars = StageBars::default();
    let report = gp2nc_core::run(&options, &|stage, current, total, message| {
        bars.update(stage, current, total, message);
    })?;
    bars.finish();

    eprintln!(
        "Processed {} media files ({} from sidecars, {} from embedded metadata, {} undated, {} skipped)",
        report.indexed,
        report.resolution.sidecars_resolved,
        report.resolution.embedded_resolved,
        report.normalized,
        report.resolution.skipped.len()
    );
    eprintln!(
        "Folders: {} created, {} already present, {} failed",
        report.provision.segments_created,
        report.provision.segments_existing,
        report.provision.failed_buckets.len()
    );
    eprintln!(
        "Done! {} uploaded, {} failed, {} retries ({:.2}s)",
        report.upload.succeeded,
        report.upload.failed,
        report.upload.retries,
        t_total.elapsed().as_secs_f64()
    );
    for (path, reason) in &report.upload.failures {
        eprintln!("  failed: {} ({})", path.display(), reason);
    }

    if report.upload.failed > 0 {
        anyhow::bail!("{} media files failed to upload", report.upload.failed);
    }
    Ok(())
}
