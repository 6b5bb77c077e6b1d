//! Staged ingestion pipeline for channel messages.
//!
//! ```text
//! ┌─────────────────┐
//! │  SourceClient   │  remote channel history, paged, rate-limit aware
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │    AppendLog    │  {root}/{date}/{channel}.jsonl, append only
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │    Persister    │  raw_messages, insert-if-absent by message id
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │   Transformer   │  external SQL transformation command
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │EnrichmentWriter │  image_detections via a Detector
//! └─────────────────┘
//! ```
//!
//! [`Orchestrator`] runs the stages in that order and stops at the first
//! failure.

pub mod append_log;
pub mod collect;
pub mod detect;
pub mod enrich;
pub mod error;
pub mod orchestrator;
pub mod persister;
pub mod source;
pub mod stages;
pub mod transform;

pub use error::{Error, Result};

pub use append_log::{AppendLog, Partition};
pub use collect::{CollectStats, Collector};
pub use detect::{Detector, HttpDetector, message_id_from_path};
pub use enrich::{EnrichStats, EnrichmentWriter};
pub use orchestrator::{
    Orchestrator, PipelineRun, RunReport, Stage, StageFailure, StageKind, StageState,
};
pub use persister::{LoadStats, Persister};
pub use source::{ClientConfig, HttpSource, HttpSourceConfig, MessageSource, SourceClient};
pub use stages::{CollectStage, EnrichStage, PersistStage, TransformStage};
pub use transform::Transformer;
