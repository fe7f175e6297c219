//! Gaze Sample Agent - buffered collection and upload of eye-tracking
//! calibration samples.
//!
//! Capture code hands every [`Sample`] (two 48x48 eye crops, 478 face
//! landmarks and the on-screen target) to a [`SampleManager`]. The manager
//! validates it, buckets it by identity, and ships complete batches as
//! compact binary chunks to an HTTP endpoint through a background upload
//! task that retries with backoff and never reorders chunks.
//!
//! # Privacy Guarantees
//!
//! - **No camera frames**: only cropped, grayscale eye regions leave the machine
//! - **Memory only**: samples are never written to disk before upload
//! - **Pause means discard**: pausing flushes what is ready and drops the rest
//! - **Transparency**: every stored, rejected and uploaded sample is counted
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Gaze Sample Agent                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │   Source    │──▶│   Manager   │──▶│   Buffer    │             │
//! │  │  (camera)   │   │ (validate)  │   │  (buckets)  │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │                           │ flush                                 │
//! │                           ▼                                       │
//! │                    ┌─────────────┐   commands  ┌─────────────┐   │
//! │                    │   Upload    │────────────▶│   Upload    │──▶ HTTP
//! │                    │   Queue     │◀────────────│    Task     │   │
//! │                    └─────────────┘   statuses  └─────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gaze_sample_agent::{ManagerConfig, RetryPolicy, SampleManager, TimeWindow};
//! use gaze_sample_agent::uploader::{UploadClient, UploadTask};
//! use std::time::Duration;
//!
//! # async fn run(samples: Vec<gaze_sample_agent::Sample>) -> anyhow::Result<()> {
//! let client = UploadClient::new(Duration::from_secs(10))?;
//! let (commands, status, _join) = UploadTask::spawn(client, RetryPolicy::default()).into_parts();
//!
//! let mut manager = SampleManager::new(ManagerConfig::new("https://collect.example.com"), commands)
//!     .with_status(status);
//! for sample in samples {
//!     manager.store(sample, TimeWindow::all())?;
//! }
//! manager.flush_and_clear(TimeWindow::all());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod sample;
pub mod source;
pub mod transparency;
pub mod uploader;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, IdentityConfig, RetryConfig};
pub use core::{
    decode_chunk, serialize, ErrorKind, ManagerConfig, ManagerStats, SampleManager,
    SerializationError, StorageError, StoreError, TimeWindow, UploadStats,
};
pub use sample::{Goal, Identity, NamedEntity, Sample, ValidationError};
pub use source::{SourceConfig, SyntheticSource};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use uploader::{RetryPolicy, UploadClient, UploadError, UploadStatus, UploadTask};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            GAZE SAMPLE AGENT - PRIVACY DECLARATION               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent collects eye-tracking calibration samples.           ║
║                                                                  ║
║  ✓ WHAT WE COLLECT:                                              ║
║    • Two 48x48 grayscale crops of your eyes per sample           ║
║    • Face landmark positions (478 points)                        ║
║    • The on-screen target you were asked to look at              ║
║    • Opaque ids for user, place, screen, camera and monitor      ║
║                                                                  ║
║  ✗ WHAT WE NEVER COLLECT:                                        ║
║    • Full camera frames or video                                 ║
║    • Screen content or application names                         ║
║    • Your name or any other text you type                        ║
║                                                                  ║
║  Samples are kept in memory only until uploaded. Pausing         ║
║  discards everything that has not been sent.                     ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    gaze-sample status                                            ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
