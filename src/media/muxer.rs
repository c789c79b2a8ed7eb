use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{ArgumentError, MuxError, Result};
use crate::media::backend::{CodecBackend, ContainerWriter, MediaSource};
use crate::media::types::{EncodedSample, TrackFormat, TrackRole};

/// Container session that enforces the add-track / start / write / stop order.
///
/// Tracks may only be added before [`TrackMuxer::start`]; samples may only be
/// written after it. `stop` and `release` are idempotent, and a session that
/// never started is never asked to stop. Dropping the muxer releases the
/// underlying writer, stopping it first if it was started.
pub struct TrackMuxer {
    writer: Box<dyn ContainerWriter>,
    tracks: HashMap<TrackRole, usize>,
    started: bool,
    stopped: bool,
    released: bool,
    samples_written: usize,
}

impl TrackMuxer {
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            writer,
            tracks: HashMap::new(),
            started: false,
            stopped: false,
            released: false,
            samples_written: 0,
        }
    }

    /// Register a track; only valid before the session starts
    pub fn add_track(&mut self, role: TrackRole, format: &TrackFormat) -> std::result::Result<usize, MuxError> {
        if self.started {
            return Err(MuxError::TrackAfterStart { role: role.to_string() });
        }
        let index = self.writer.add_track(format)?;
        debug!("Registered {} track {} ({})", role, index, format.codec);
        self.tracks.insert(role, index);
        Ok(index)
    }

    pub fn start(&mut self) -> std::result::Result<(), MuxError> {
        if self.started {
            return Err(MuxError::AlreadyStarted);
        }
        if self.tracks.is_empty() {
            return Err(MuxError::NoTracks);
        }
        self.writer.start()?;
        self.started = true;
        debug!("Muxer session started with {} track(s)", self.tracks.len());
        Ok(())
    }

    pub fn write(&mut self, sample: &EncodedSample) -> std::result::Result<(), MuxError> {
        if !self.started || self.stopped {
            return Err(MuxError::NotStarted { track: sample.track_index });
        }
        self.writer.write_sample(sample)?;
        self.samples_written += 1;
        Ok(())
    }

    /// Finish the container; a no-op when never started or already stopped
    pub fn stop(&mut self) -> std::result::Result<(), MuxError> {
        if !self.started || self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.writer.stop()
    }

    /// Release the writer; stops a started session first
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("Failed to stop muxer during release: {}", e);
        }
        self.writer.release();
        self.released = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn track(&self, role: TrackRole) -> Option<usize> {
        self.tracks.get(&role).copied()
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }
}

impl Drop for TrackMuxer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Result of [`merge_tracks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Video and audio were remuxed into the output
    Merged { video_samples: usize, audio_samples: usize },
    /// The audio source had no audio; the video was copied verbatim
    VideoCopied,
}

/// Remux the video stream of `video_source` and the audio stream of
/// `audio_source` into `output` without re-encoding.
///
/// Samples keep their original timestamps and key-frame flags. Tracks are
/// written one after the other; the container interleaves by timestamp.
pub fn merge_tracks(
    backend: &dyn CodecBackend,
    video_source: &Path,
    audio_source: &Path,
    output: &Path,
) -> Result<MergeOutcome> {
    for path in [video_source, audio_source] {
        if !path.exists() {
            return Err(ArgumentError::new(format!("input not found: {}", path.display())).into());
        }
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut video = backend.open_source(video_source)?;
    let mut audio = backend.open_source(audio_source)?;

    let video_track = find_track(video.as_ref(), TrackRole::Video).ok_or_else(|| MuxError::NoVideoTrack {
        path: video_source.display().to_string(),
    })?;

    let Some(audio_track) = find_track(audio.as_ref(), TrackRole::Audio) else {
        warn!("No audio track in {}, copying video only", audio_source.display());
        std::fs::copy(video_source, output)?;
        return Ok(MergeOutcome::VideoCopied);
    };

    let outcome = remux(backend, video.as_mut(), video_track, audio.as_mut(), audio_track, output);
    if outcome.is_err() && output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            warn!("Failed to remove partial output {}: {}", output.display(), e);
        }
    }
    outcome
}

fn remux(
    backend: &dyn CodecBackend,
    video: &mut dyn MediaSource,
    video_track: usize,
    audio: &mut dyn MediaSource,
    audio_track: usize,
    output: &Path,
) -> Result<MergeOutcome> {
    let video_format = video.tracks()[video_track].clone();
    let audio_format = audio.tracks()[audio_track].clone();

    let mut muxer = TrackMuxer::new(backend.create_writer(output)?);
    let video_index = muxer.add_track(TrackRole::Video, &video_format)?;
    let audio_index = muxer.add_track(TrackRole::Audio, &audio_format)?;
    muxer.start()?;

    video.select_track(video_track)?;
    let video_samples = copy_samples(video, &mut muxer, video_index)?;

    audio.select_track(audio_track)?;
    let audio_samples = copy_samples(audio, &mut muxer, audio_index)?;

    muxer.stop()?;
    info!("Merged {} video and {} audio samples into {}",
          video_samples, audio_samples, output.display());

    Ok(MergeOutcome::Merged { video_samples, audio_samples })
}

fn find_track(source: &dyn MediaSource, role: TrackRole) -> Option<usize> {
    source.tracks().iter().position(|format| format.role == role)
}

fn copy_samples(source: &mut dyn MediaSource, muxer: &mut TrackMuxer, track_index: usize) -> Result<usize> {
    let mut copied = 0;
    while let Some(sample) = source.read_sample()? {
        muxer.write(&sample.into_encoded(track_index))?;
        copied += 1;
    }
    Ok(copied)
}
