use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::config::{effective_concurrency, FilterConfig};
use crate::error::{FilterError, PipelineError, Result};
use crate::filters::Filter;
use crate::media::picture::Picture;
use crate::media::types::{Frame, FrameManifest};
use crate::progress::{ProgressSink, StageProgress};

/// How one frame came out of the filter stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Filtered,
    /// The filter failed and the unfiltered source was copied instead
    CopiedOriginal,
}

/// Summary of a filter pass
#[derive(Debug, Clone)]
pub struct FilteredFrames {
    pub manifest: FrameManifest,
    pub filtered: usize,
    pub fallbacks: usize,
}

/// Applies a [`Filter`] to every frame of a manifest on a small worker pool.
///
/// Output files are keyed by the source frame's index, so completion order
/// never shows up in the result.
pub struct FrameFilterScheduler<'a> {
    config: &'a FilterConfig,
    cancel: Option<CancellationFlag>,
    progress_span: (f64, f64),
}

impl<'a> FrameFilterScheduler<'a> {
    pub fn new(config: &'a FilterConfig) -> Self {
        Self {
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

    /// Filter `frames` into `output_directory`, optionally resizing each
    /// result to `size`.
    pub fn apply(
        &self,
        frames: &FrameManifest,
        filter: &dyn Filter,
        output_directory: &Path,
        size: Option<(u32, u32)>,
        sink: &dyn ProgressSink,
    ) -> Result<FilteredFrames> {
        std::fs::create_dir_all(output_directory)?;
        info!("Applying '{}' to {} frames", filter.name(), frames.len());

        let (base, weight) = self.progress_span;
        let stage = StageProgress::new(sink, "Processing frames", frames.len())
            .every(self.config.progress_every)
            .span(base, weight);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_concurrency(self.config.max_concurrency))
            .thread_name(|i| format!("filter-{}", i))
            .build()
            .map_err(|e| PipelineError::generic(format!("cannot start filter workers: {}", e)))?;

        let slots: Vec<Option<(Frame, FrameOutcome)>> = pool.install(|| {
            frames
                .frames()
                .par_iter()
                .map(|frame| {
                    if self.cancelled() {
                        return None;
                    }
                    let result = self.process(frame, filter, output_directory, size);
                    stage.tick();
                    result
                })
                .collect()
        });

        if self.cancelled() {
            return Err(PipelineError::Cancelled { stage: "filtering" });
        }

        let filtered = slots.iter().flatten().filter(|(_, o)| *o == FrameOutcome::Filtered).count();
        let fallbacks = slots.iter().flatten().filter(|(_, o)| *o == FrameOutcome::CopiedOriginal).count();
        // Survivors take over the positions of the input so the result stays
        // dense; file names keep the source index.
        let manifest: FrameManifest = slots
            .into_iter()
            .flatten()
            .zip(frames.iter())
            .map(|((frame, _), slot)| Frame {
                index: slot.index,
                file_path: frame.file_path,
                timestamp_seconds: slot.timestamp_seconds,
            })
            .collect();

        if manifest.is_empty() {
            return Err(FilterError::NoFramesProcessed { total: frames.len() }.into());
        }

        info!("Filtered {} frames ({} fell back to the original)", manifest.len(), fallbacks);
        Ok(FilteredFrames {
            manifest,
            filtered,
            fallbacks,
        })
    }

    fn process(
        &self,
        frame: &Frame,
        filter: &dyn Filter,
        output_directory: &Path,
        size: Option<(u32, u32)>,
    ) -> Option<(Frame, FrameOutcome)> {
        let index = Frame::index_from_path(&frame.file_path).unwrap_or(frame.index);
        let dest = output_directory.join(Frame::file_name("filtered", index));
        let output = Frame {
            index: frame.index,
            file_path: dest.clone(),
            timestamp_seconds: frame.timestamp_seconds,
        };

        match self.render(frame, filter, &dest, size) {
            Ok(()) => {
                debug!("Filtered frame {}", index);
                Some((output, FrameOutcome::Filtered))
            }
            Err(e) => {
                warn!("Filter '{}' failed on frame {}: {}, keeping the original", filter.name(), index, e);
                match copy_original(&frame.file_path, &dest, size, self.config.jpeg_quality) {
                    Ok(()) => Some((output, FrameOutcome::CopiedOriginal)),
                    Err(e) => {
                        warn!("Could not copy original frame {}: {}", index, e);
                        None
                    }
                }
            }
        }
    }

    fn render(&self, frame: &Frame, filter: &dyn Filter, dest: &Path, size: Option<(u32, u32)>) -> Result<()> {
        let picture = Picture::open(&frame.file_path)?;
        let picture = match size {
            Some((w, h)) => picture.resized(w, h),
            None => picture,
        };
        let filtered = filter.apply(&picture).map_err(|e| FilterError::FrameFailed {
            filter: filter.name().to_string(),
            index: frame.index,
            reason: e.to_string(),
        })?;
        filtered.save_jpeg(dest, self.config.jpeg_quality)?;
        Ok(())
    }
}

fn copy_original(source: &Path, dest: &Path, size: Option<(u32, u32)>, quality: u8) -> Result<()> {
    match size {
        Some((w, h)) => Picture::open(source)?.resized(w, h).save_jpeg(dest, quality)?,
        None => {
            std::fs::copy(source, dest)?;
        }
    }
    Ok(())
}
