//! Synchronisation engine: configuration, lifecycle hooks, the per-cycle
//! pipeline and the scheduler driving it.
//!
//! ```ignore
//! let config = SyncConfig::from_file("config.yaml")?;
//! let pipeline = build_pipeline(&config)?;
//! let summary = Scheduler::new(pipeline, config.sync.interval_secs, cancel).run().await;
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod pipeline;
pub mod scheduler;

pub use bootstrap::build_pipeline;
pub use config::{LogConfig, LogFormat, SyncConfig, UserApi, DEFAULT_CONFIG_PATH};
pub use error::{ConfigError, ConfigResult, EngineError, EngineResult};
pub use executor::{GroupApplyReport, SyncExecutor, UserApplyReport};
pub use hooks::{build_lifecycle, FailPolicy, Hooks, LifecycleKind};
pub use pipeline::{CycleReport, CycleStage, SyncPipeline};
pub use scheduler::{RunSummary, Scheduler};
