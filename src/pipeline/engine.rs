//! Boundary operations of the pipeline.
//!
//! Every operation runs its blocking work on the tokio blocking pool,
//! never returns an error to the caller and always finishes with a terminal
//! progress event. Failures are logged and reported as `false` / `None`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cancel::CancellationFlag;
use crate::config::Config;
use crate::error::{ArgumentError, PipelineError, Result};
use crate::filters::FilterRegistry;
use crate::media::backend::{CodecBackend, FrameSource};
use crate::media::encoder::{EncodeReport, EncoderPump};
use crate::media::muxer::{merge_tracks, MergeOutcome};
use crate::media::picture::{fit_even, Picture};
use crate::media::types::FrameManifest;
use crate::pipeline::extractor::{ExtractionRequest, FrameExtractor};
use crate::pipeline::scheduler::FrameFilterScheduler;
use crate::pipeline::workspace::TempWorkspace;
use crate::progress::{NullSink, ProgressSink};

/// Result of [`VideoPipeline::extract_frames`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub frame_paths: Vec<PathBuf>,
    pub frame_count: usize,
    pub duration: f64,
    pub fps: f64,
    pub target_fps: f64,
}

/// Filter already extracted frames and encode them into `output_path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub frame_paths: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub filter_type: String,
    pub frame_count: usize,
    pub duration: f64,
    pub target_fps: f64,
}

/// Copy the audio of `audio_source_path` under the video of `video_path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMergeRequest {
    pub video_path: PathBuf,
    pub audio_source_path: PathBuf,
    pub output_path: PathBuf,
}

/// Sample, filter and encode a whole video in one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub filter_type: String,
}

/// Per-call capabilities: where progress goes and how to cancel
#[derive(Clone)]
pub struct Invocation {
    pub sink: Arc<dyn ProgressSink>,
    pub cancel: CancellationFlag,
}

impl Invocation {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            cancel: CancellationFlag::new(),
        }
    }

    /// No listener attached
    pub fn detached() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// How the encode step produced the output file
#[derive(Debug, Clone, PartialEq)]
pub enum VideoOutput {
    Encoded(EncodeReport),
    /// Encoding failed; the first frame was saved as a still instead
    StillFallback,
}

/// Entry point tying extraction, filtering, encoding and muxing together
#[derive(Clone)]
pub struct VideoPipeline {
    config: Arc<Config>,
    frames: Arc<dyn FrameSource>,
    codec: Arc<dyn CodecBackend>,
    filters: Arc<FilterRegistry>,
}

impl VideoPipeline {
    pub fn new(config: Config, frames: Arc<dyn FrameSource>, codec: Arc<dyn CodecBackend>) -> Self {
        Self {
            config: Arc::new(config),
            frames,
            codec,
            filters: Arc::new(FilterRegistry::new()),
        }
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract frames into `request.output_directory`
    pub async fn extract_frames(&self, request: ExtractionRequest, invocation: Invocation) -> Option<ExtractionResult> {
        let this = self.clone();
        let inv = invocation.clone();
        let result = run_blocking(move || this.extract_blocking(&request, &inv)).await;
        conclude("Frame extraction", result, invocation.sink.as_ref())
    }

    /// Filter frames and encode them; succeeds immediately if the output exists
    pub async fn apply_filter_to_frames(&self, request: FilterRequest, invocation: Invocation) -> bool {
        if request.output_path.exists() {
            info!("{} already exists, skipping", request.output_path.display());
            invocation.sink.report(1.0, "Complete");
            return true;
        }
        let this = self.clone();
        let inv = invocation.clone();
        let result = run_blocking(move || this.filter_blocking(&request, &inv)).await;
        conclude("Frame filtering", result, invocation.sink.as_ref()).is_some()
    }

    /// Remux video and donor audio; falls back to copying the video
    pub async fn merge_audio(&self, request: AudioMergeRequest, invocation: Invocation) -> bool {
        let this = self.clone();
        let result = run_blocking(move || this.merge_blocking(&request)).await;
        conclude("Audio merge", result, invocation.sink.as_ref()).is_some()
    }

    /// Sample, downscale, filter and encode `request.input_path`
    pub async fn process_video(&self, request: ProcessRequest, invocation: Invocation) -> bool {
        if request.output_path.exists() {
            info!("{} already exists, skipping", request.output_path.display());
            invocation.sink.report(1.0, "Complete");
            return true;
        }
        let this = self.clone();
        let inv = invocation.clone();
        let result = run_blocking(move || this.process_blocking(&request, &inv)).await;
        conclude("Video processing", result, invocation.sink.as_ref()).is_some()
    }

    fn extract_blocking(&self, request: &ExtractionRequest, inv: &Invocation) -> Result<ExtractionResult> {
        let extraction = FrameExtractor::new(self.frames.as_ref(), &self.config.extraction)
            .with_cancellation(inv.cancel.clone())
            .extract(request, inv.sink.as_ref())?;

        Ok(ExtractionResult {
            frame_count: extraction.manifest.len(),
            frame_paths: extraction.manifest.paths(),
            duration: extraction.media.duration_seconds,
            fps: extraction.media.source_frame_rate,
            target_fps: request.target_fps,
        })
    }

    fn filter_blocking(&self, request: &FilterRequest, inv: &Invocation) -> Result<VideoOutput> {
        if request.frame_paths.is_empty() {
            return Err(ArgumentError::new("no frames given").into());
        }
        if !(request.target_fps > 0.0) {
            return Err(ArgumentError::new(format!("targetFPS must be > 0, got {}", request.target_fps)).into());
        }
        if request.frame_count != request.frame_paths.len() {
            warn!("frameCount {} does not match {} frame paths, using the paths",
                  request.frame_count, request.frame_paths.len());
        }

        let workspace = self.workspace("video_filter")?;
        let frames = FrameManifest::from_paths(request.frame_paths.iter().cloned(), request.target_fps);
        let filter = self.filters.resolve(&request.filter_type);

        let filtered = FrameFilterScheduler::new(&self.config.filtering)
            .with_cancellation(inv.cancel.clone())
            .apply(&frames, filter.as_ref(), &workspace.subdir("filtered")?, None, inv.sink.as_ref())?;

        let first = filtered.manifest.first().map(|f| f.file_path.clone()).ok_or_else(|| {
            PipelineError::generic("filtered manifest is empty")
        })?;
        let picture = Picture::open(&first)?;
        let frames = filtered.manifest.compacted(request.target_fps);

        self.encode(&frames, &request.output_path, (picture.width(), picture.height()),
                    request.target_fps, request.duration, 0.8, inv)
    }

    fn merge_blocking(&self, request: &AudioMergeRequest) -> Result<MergeOutcome> {
        for path in [&request.video_path, &request.audio_source_path] {
            if !path.is_file() {
                return Err(ArgumentError::new(format!("input not found: {}", path.display())).into());
            }
        }

        match merge_tracks(self.codec.as_ref(), &request.video_path, &request.audio_source_path, &request.output_path) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("Audio merge failed ({}), copying video without audio", e);
                std::fs::copy(&request.video_path, &request.output_path)?;
                Ok(MergeOutcome::VideoCopied)
            }
        }
    }

    fn process_blocking(&self, request: &ProcessRequest, inv: &Invocation) -> Result<VideoOutput> {
        let process = &self.config.process;
        let workspace = self.workspace("video_process")?;
        let extraction_request = ExtractionRequest {
            source_path: request.input_path.clone(),
            output_directory: workspace.subdir("frames")?,
            target_fps: process.target_fps,
        };

        let extraction = FrameExtractor::new(self.frames.as_ref(), &self.config.extraction)
            .with_cancellation(inv.cancel.clone())
            .with_progress_span(0.0, 0.4)
            .extract(&extraction_request, inv.sink.as_ref())?;

        let media = &extraction.media;
        let size = fit_even(media.width, media.height, process.max_dimension);
        info!("Processing {}x{} -> {}x{} at {} fps with '{}'",
              media.width, media.height, size.0, size.1, process.target_fps, request.filter_type);

        let filter = self.filters.resolve(&request.filter_type);
        let filtered = FrameFilterScheduler::new(&self.config.filtering)
            .with_cancellation(inv.cancel.clone())
            .with_progress_span(0.4, 0.4)
            .apply(&extraction.manifest, filter.as_ref(), &workspace.subdir("filtered")?, Some(size), inv.sink.as_ref())?;

        let frames = filtered.manifest.compacted(process.target_fps);
        self.encode(&frames, &request.output_path, size, process.target_fps, media.duration_seconds, 0.8, inv)
    }

    fn workspace(&self, prefix: &str) -> Result<TempWorkspace> {
        let workspace = &self.config.workspace;
        TempWorkspace::create(&workspace.temp_root, prefix, workspace.stale_after())
    }

    /// Encode into a hidden `.part` sibling and rename into place.
    ///
    /// When encoding fails and the still fallback is enabled, the first frame
    /// is saved at `output` together with an `_info.txt` sidecar.
    #[allow(clippy::too_many_arguments)]
    fn encode(
        &self,
        frames: &FrameManifest,
        output: &Path,
        (width, height): (u32, u32),
        target_fps: f64,
        duration: f64,
        progress_base: f64,
        inv: &Invocation,
    ) -> Result<VideoOutput> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        inv.sink.report(progress_base, "Creating video...");
        let part = part_path(output);
        let encoded = EncoderPump::new(self.codec.as_ref(), &self.config.encoder)
            .with_cancellation(inv.cancel.clone())
            .with_progress(inv.sink.as_ref(), progress_base, 1.0 - progress_base)
            .encode(frames, &part, width, height, target_fps)
            .and_then(|report| {
                std::fs::rename(&part, output)?;
                Ok(report)
            });

        match encoded {
            Ok(report) => {
                for violation in &report.violations {
                    warn!("Encoder contract violation: {}", violation);
                }
                Ok(VideoOutput::Encoded(report))
            }
            Err(e) => {
                remove_if_exists(&part);
                if e.is_cancelled() || !self.config.encoder.still_fallback {
                    return Err(e);
                }
                warn!("Video encoding failed ({}), saving first frame as a still", e);
                write_still_fallback(frames, output, duration, target_fps, &e)?;
                Ok(VideoOutput::StillFallback)
            }
        }
    }
}

fn part_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!(".{}.part.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.part", stem),
    };
    output.with_file_name(name)
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn sidecar_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    output.with_file_name(format!("{}_info.txt", stem))
}

fn write_still_fallback(
    frames: &FrameManifest,
    output: &Path,
    duration: f64,
    target_fps: f64,
    cause: &PipelineError,
) -> Result<()> {
    let first = frames
        .first()
        .ok_or_else(|| PipelineError::generic("no frame available for the still fallback"))?;
    std::fs::copy(&first.file_path, output)?;

    let info = format!(
        "Video processing fallback\nFrames: {}\nDuration: {:.2}s\nFPS: {}\nReason: {}\n",
        frames.len(),
        duration,
        target_fps,
        cause
    );
    std::fs::write(sidecar_path(output), info)?;
    Ok(())
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::generic(format!("pipeline task failed: {}", e)))?
}

fn conclude<T>(operation: &str, result: Result<T>, sink: &dyn ProgressSink) -> Option<T> {
    match result {
        Ok(value) => {
            info!("{} complete", operation);
            sink.report(1.0, "Complete");
            Some(value)
        }
        Err(e) => {
            error!("{} failed during {}: {}", operation, e.phase(), e);
            sink.report(1.0, &e.user_message());
            None
        }
    }
}
