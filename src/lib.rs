//! # Sketch-Video
//!
//! Re-encode videos through cosmetic sketch filters.
//!
//! A run samples stills from the source at a target frame rate, applies a
//! per-frame filter under a bounded worker pool, encodes the filtered stills
//! back into a video and optionally copies the original audio under it.
//!
//! ## Quick Start
//!
//! Encoding and muxing need the `ffmpeg` feature:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sketch_video::{
//!     config::Config,
//!     media::{FfmpegCli, LibavBackend},
//!     pipeline::{Invocation, ProcessRequest, VideoPipeline},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let pipeline = VideoPipeline::new(
//!     Config::default(),
//!     Arc::new(FfmpegCli::default()),
//!     Arc::new(LibavBackend::new()?),
//! );
//!
//! let ok = pipeline
//!     .process_video(
//!         ProcessRequest {
//!             input_path: "input.mp4".into(),
//!             output_path: "sketched.mp4".into(),
//!             filter_type: "charcoalSketch".into(),
//!         },
//!         Invocation::detached(),
//!     )
//!     .await;
//! assert!(ok);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`pipeline`] - Extraction, filter scheduling, workspaces and the boundary operations
//! - [`filters`] - The closed set of sketch filters and their registry
//! - [`media`] - Frames, pixel conversion, the encoder pump, muxing and codec backends
//! - [`progress`] - Per-invocation progress sinks
//! - [`config`] - Configuration management
//!
//! ## Custom Filters
//!
//! Implement [`Filter`](filters::Filter) and register it under a token:
//!
//! ```rust
//! use std::sync::Arc;
//! use sketch_video::filters::{Filter, FilterRegistry};
//! use sketch_video::media::Picture;
//! use sketch_video::Result;
//!
//! struct Mirror;
//!
//! impl Filter for Mirror {
//!     fn name(&self) -> &str {
//!         "mirror"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Flips frames horizontally"
//!     }
//!
//!     fn apply(&self, picture: &Picture) -> Result<Picture> {
//!         Ok(Picture::new(image::imageops::flip_horizontal(picture.as_image())))
//!     }
//! }
//!
//! let mut registry = FilterRegistry::new();
//! registry.register("mirror", || Arc::new(Mirror));
//! assert!(registry.has("mirror"));
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod filters;
pub mod media;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
mod testing;

pub use crate::{
    cancel::CancellationFlag,
    config::Config,
    error::{PipelineError, Result},
    filters::{Filter, FilterKind, FilterRegistry},
    pipeline::{Invocation, VideoPipeline},
    progress::{ChannelSink, ProgressEvent, ProgressSink},
};
