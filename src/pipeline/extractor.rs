use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::config::{effective_concurrency, ExtractionConfig};
use crate::error::{ArgumentError, ExtractionError, PipelineError, Result};
use crate::media::backend::FrameSource;
use crate::media::types::{Frame, FrameManifest, SourceMedia};
use crate::progress::{ProgressSink, StageProgress};

/// Pull frames out of `source_path` at `target_fps` into `output_directory`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub source_path: PathBuf,
    pub output_directory: PathBuf,
    pub target_fps: f64,
}

impl ExtractionRequest {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_fps > 0.0) || !self.target_fps.is_finite() {
            return Err(ArgumentError::new(format!("targetFPS must be > 0, got {}", self.target_fps)).into());
        }
        if !self.source_path.is_file() {
            return Err(ArgumentError::new(format!("input not found: {}", self.source_path.display())).into());
        }
        Ok(())
    }
}

/// Output of a successful extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    pub media: SourceMedia,
    /// Frames renumbered by position; file names keep the original index
    pub manifest: FrameManifest,
    pub requested: usize,
}

impl Extraction {
    pub fn dropped(&self) -> usize {
        self.requested - self.manifest.len()
    }
}

/// Samples stills from a video under a bounded worker pool
pub struct FrameExtractor<'a> {
    source: &'a dyn FrameSource,
    config: &'a ExtractionConfig,
    cancel: Option<CancellationFlag>,
    progress_span: (f64, f64),
}

impl<'a> FrameExtractor<'a> {
    pub fn new(source: &'a dyn FrameSource, config: &'a ExtractionConfig) -> Self {
        Self {
            source,
            config,
            cancel: None,
            progress_span: (0.0, config.progress_weight),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Report progress as a share of `[base, base + weight]`
    pub fn with_progress_span(mut self, base: f64, weight: f64) -> Self {
        self.progress_span = (base, weight);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Probe the source and reject media without a usable video stream
    pub fn probe(&self, path: &Path) -> Result<SourceMedia> {
        let media = self.source.probe(path)?;
        if !(media.duration_seconds > 0.0) || media.width == 0 || media.height == 0 {
            return Err(ExtractionError::InvalidMedia {
                path: path.display().to_string(),
                reason: format!(
                    "duration {:.3}s, size {}x{}",
                    media.duration_seconds, media.width, media.height
                ),
            }
            .into());
        }
        Ok(media)
    }

    pub fn extract(&self, request: &ExtractionRequest, sink: &dyn ProgressSink) -> Result<Extraction> {
        request.validate()?;
        let media = self.probe(&request.source_path)?;
        std::fs::create_dir_all(&request.output_directory)?;

        let requested = media.total_frames(request.target_fps);
        info!("Extracting {} frames at {} fps from {} ({:.2}s)",
              requested, request.target_fps, request.source_path.display(), media.duration_seconds);

        let (base, weight) = self.progress_span;
        let stage = StageProgress::new(sink, "Extracting frames", requested)
            .every(self.config.progress_every)
            .span(base, weight);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_concurrency(self.config.max_concurrency))
            .thread_name(|i| format!("extract-{}", i))
            .build()
            .map_err(|e| PipelineError::generic(format!("cannot start extraction workers: {}", e)))?;

        let slots: Vec<Option<Frame>> = pool.install(|| {
            (0..requested)
                .into_par_iter()
                .map(|index| {
                    if self.cancelled() {
                        return None;
                    }
                    let timestamp = (index as f64 / request.target_fps).min(media.duration_seconds);
                    let dest = request.output_directory.join(Frame::file_name("frame", index));
                    match self.source.grab(&request.source_path, timestamp, &dest, self.config.jpeg_quality) {
                        Ok(()) => {
                            debug!("Extracted frame {} at {:.3}s", index, timestamp);
                            stage.tick();
                            Some(Frame::new(index, dest, request.target_fps))
                        }
                        Err(e) => {
                            warn!("Skipping frame {}: {}", index, e);
                            None
                        }
                    }
                })
                .collect()
        });

        if self.cancelled() {
            return Err(PipelineError::Cancelled { stage: "extraction" });
        }

        let manifest: FrameManifest = slots.into_iter().flatten().collect();
        if manifest.is_empty() {
            return Err(ExtractionError::NoFramesExtracted {
                path: request.source_path.display().to_string(),
                requested,
            }
            .into());
        }

        let manifest = manifest.compacted(request.target_fps);
        info!("Extracted {}/{} frames", manifest.len(), requested);
        Ok(Extraction {
            media,
            manifest,
            requested,
        })
    }
}
