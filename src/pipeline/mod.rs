//! # Pipeline Module
//!
//! The stages of a sketch run (frame extraction, filtering under a worker
//! pool, per-invocation workspaces) and the [`VideoPipeline`] that exposes
//! them as boundary operations.

pub mod engine;
pub mod extractor;
pub mod scheduler;
pub mod workspace;

pub use engine::{
    AudioMergeRequest, ExtractionResult, FilterRequest, Invocation, ProcessRequest, VideoOutput, VideoPipeline,
};
pub use extractor::{Extraction, ExtractionRequest, FrameExtractor};
pub use scheduler::{FilteredFrames, FrameFilterScheduler};
pub use workspace::{sweep_stale, TempWorkspace};
