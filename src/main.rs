//! Gaze Sample Agent CLI
//!
//! Buffered collection and upload of eye-tracking calibration samples.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gaze_sample_agent::{
    config::Config,
    core::{decode_chunk, ErrorKind, SampleManager, TimeWindow, UploadStats},
    source::{SourceConfig, SyntheticSource},
    transparency::create_shared_log_with_persistence,
    uploader::{UploadClient, UploadCommand, UploadTask},
    PRIVACY_DECLARATION, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long shutdown waits for queued chunks to reach the endpoint.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "gaze-sample")]
#[command(version = VERSION)]
#[command(about = "Buffered collection and upload of gaze calibration samples", long_about = None)]
struct Cli {
    /// Log filter (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start collecting and uploading samples
    Start {
        /// Upload endpoint (overrides the configured one)
        #[arg(long)]
        endpoint: Option<String>,

        /// Milliseconds between synthetic samples
        #[arg(long, default_value = "33")]
        interval_ms: u64,

        /// Do not attach eye crops to samples
        #[arg(long)]
        no_eyes: bool,
    },

    /// Pause collection (discards everything not yet uploaded)
    Pause,

    /// Resume collection
    Resume,

    /// Show current collection status
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,

    /// Decode a chunk file and print its contents
    Inspect {
        /// Path to a version 4 chunk
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Commands::Start {
            endpoint,
            interval_ms,
            no_eyes,
        } => cmd_start(endpoint, Duration::from_millis(interval_ms), !no_eyes),
        Commands::Pause => cmd_pause(),
        Commands::Resume => cmd_resume(),
        Commands::Status => cmd_status(),
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
        Commands::Config => cmd_config(),
        Commands::Inspect { file } => cmd_inspect(&file),
    }
}

/// Initialize the tracing subscriber.
fn init_tracing(level: Option<&str>) {
    let env_filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Flush window ending now.
fn current_window(config: &Config) -> TimeWindow {
    let now = now_ms();
    let width = config.window.as_millis() as u64;
    TimeWindow::new(now.saturating_sub(width), now.saturating_add(1))
}

fn cmd_start(endpoint: Option<String>, interval: Duration, with_eyes: bool) -> Result<()> {
    println!("Gaze Sample Agent v{VERSION}");
    println!();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(endpoint) = endpoint {
        config.upload_endpoint = endpoint;
    }
    if let Err(e) = config.ensure_directories() {
        warn!("Could not create data directory: {e}");
    }

    let generated = config.identity.fill_missing();
    if !generated.is_empty() {
        info!(?generated, "Generated missing identity entities");
        config.save().context("Failed to save generated identity")?;
    }
    let identity = config.identity.to_identity()?;

    println!("Starting collection...");
    println!("  Endpoint: {}", config.upload_endpoint);
    println!("  Max chunk size: {} bytes", config.max_chunk_size);
    println!("  Flush interval: {}ms", config.flush_interval.as_millis());
    println!("  Camera: {}", identity.camera_id);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let _guard = runtime.enter();

    let client = UploadClient::new(config.retry.request_timeout())?;
    let (commands, status, join) = UploadTask::spawn(client, config.retry_policy()).into_parts();

    let transparency = create_shared_log_with_persistence(config.transparency_path());
    let mut manager = SampleManager::new(config.manager_config(), commands.clone())
        .with_status(status)
        .with_transparency_log(transparency.clone());
    manager.on_error(ErrorKind::Validation, |e| debug!("Sample rejected: {e}"));
    manager.on_error(ErrorKind::Storage, |e| warn!("Sample dropped: {e}"));

    let mut source = SyntheticSource::new(SourceConfig {
        identity,
        interval,
        with_eyes,
    });

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    // Pause/resume from another process is picked up by polling the config file
    let mut paused = config.paused;
    if paused {
        println!("Collection is currently paused.");
        println!("Run `gaze-sample resume` to start collecting.");
        println!();
    } else {
        source.start()?;
    }

    let mut last_config_check = Instant::now();
    let mut last_flush = Instant::now();

    while running.load(Ordering::SeqCst) {
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != paused {
                    paused = cfg.paused;

                    if paused {
                        println!();
                        println!("Pausing collection...");
                        source.stop();
                        while source.try_recv().is_some() {}

                        let sent = manager.flush_and_clear(current_window(&config));
                        info!(sent, "Buffer flushed and cleared on pause");
                    } else {
                        println!();
                        println!("Resuming collection...");
                        source.start()?;
                    }
                }
            }
            last_config_check = Instant::now();
        }

        if paused {
            manager.poll_upload_status();
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        if let Some(sample) = source.recv_timeout(Duration::from_millis(100)) {
            // Rejections are reported through the registered handlers
            let _ = manager.store(sample, current_window(&config));
        }

        if last_flush.elapsed() >= config.flush_interval {
            manager.flush(current_window(&config));
            manager.prune_stale(now_ms());
            manager.poll_upload_status();

            let stats = manager.stats();
            debug!(
                buffered = stats.total_samples,
                buckets = stats.bucket_count,
                utilization = stats.buffer_utilization,
                in_queue = stats.upload.in_queue,
                uploaded = stats.upload.chunks_uploaded,
                "Periodic flush"
            );
            last_flush = Instant::now();
        }
    }

    println!();
    println!("Stopping collection...");
    source.stop();
    while let Some(sample) = source.try_recv() {
        let _ = manager.store(sample, current_window(&config));
    }

    manager.poll_upload_status();
    let before = manager.stats().upload;
    let sent = manager.flush_and_clear(current_window(&config));
    if sent > 0 || before.in_queue > 0 {
        println!("Waiting for {sent} samples to upload...");
        if !wait_for_drain(&mut manager, &before, sent > 0, SHUTDOWN_GRACE) {
            warn!("Upload queue did not drain in time, abandoning remaining chunks");
        }
    }

    if commands.send(UploadCommand::Stop).is_err() {
        debug!("Upload task already stopped");
    }
    let stopped = runtime.block_on(tokio::time::timeout(Duration::from_secs(2), join));
    if stopped.is_err() {
        warn!("Upload task did not stop in time");
    }

    if let Err(e) = transparency.save() {
        warn!("Could not save transparency log: {e}");
    }

    println!();
    println!("{}", transparency.summary());
    Ok(())
}

/// Poll upload statuses until the task reports an empty queue after making
/// progress past `before`. Returns false on timeout.
fn wait_for_drain(
    manager: &mut SampleManager,
    before: &UploadStats,
    expect_progress: bool,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        manager.poll_upload_status();
        let upload = manager.stats().upload;

        let progressed = upload.chunks_uploaded > before.chunks_uploaded
            || upload.upload_failures > before.upload_failures;
        if upload.in_queue == 0 && (progressed || !expect_progress) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

fn cmd_pause() -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    config.paused = true;
    config.save().context("Error saving config")?;
    println!("Collection paused. Use 'gaze-sample resume' to continue.");
    Ok(())
}

fn cmd_resume() -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    config.paused = false;
    config.save().context("Error saving config")?;
    println!("Collection resumed.");
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Gaze Sample Agent Status");
    println!("========================");
    println!();

    println!("Configuration:");
    println!("  Endpoint: {}", config.upload_endpoint);
    println!("  Max chunk size: {} bytes", config.max_chunk_size);
    println!("  Retention: {}s", config.retention_secs);
    println!("  Paused: {}", config.paused);
    let missing = config.identity.missing();
    if missing.is_empty() {
        println!("  Identity: complete");
    } else {
        let names: Vec<&str> = missing.iter().map(|f| f.name()).collect();
        println!("  Identity: missing {}", names.join(", "));
    }
    println!();

    let stats_path = config.transparency_path();
    if !stats_path.exists() {
        println!("No previous session data found.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&stats_path)
        .with_context(|| format!("Failed to read {}", stats_path.display()))?;
    let stats: serde_json::Value =
        serde_json::from_str(&content).context("Transparency log is corrupt")?;

    println!("Cumulative Statistics:");
    for (key, label) in [
        ("samples_stored", "Samples stored"),
        ("samples_rejected", "Samples rejected"),
        ("samples_dropped", "Samples discarded"),
        ("chunks_enqueued", "Chunks enqueued"),
        ("chunks_uploaded", "Chunks uploaded"),
        ("upload_failures", "Upload failures"),
    ] {
        if let Some(value) = stats.get(key) {
            println!("  {label}: {value}");
        }
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let chunk = decode_chunk(&data).context("Not a valid chunk")?;

    println!("Chunk: {}", path.display());
    println!("  Version: {}", chunk.version);
    println!("  Size: {} bytes", data.len());
    println!("  User: {}", chunk.identity.user_id);
    println!("  Place: {}", chunk.identity.place_id);
    println!("  Screen: {}", chunk.identity.screen_id);
    println!("  Camera: {}", chunk.identity.camera_id);
    println!("  Monitor: {}", chunk.identity.monitor_id);
    println!("  Samples: {}", chunk.samples.len());

    if let (Some(first), Some(last)) = (chunk.samples.first(), chunk.samples.last()) {
        println!("  First time: {}", first.time());
        println!("  Last time: {}", last.time());
    }
    for (i, sample) in chunk.samples.iter().enumerate().take(10) {
        let goal = sample
            .goal()
            .map(|g| format!("({:.3}, {:.3})", g.x, g.y))
            .unwrap_or_else(|| "-".to_string());
        println!("    [{i}] t={} goal={goal}", sample.time());
    }
    if chunk.samples.len() > 10 {
        println!("    ... {} more", chunk.samples.len() - 10);
    }
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
