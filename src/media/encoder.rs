//! # Encoder Pump
//!
//! Drives a [`VideoEncoder`] through its buffer exchange protocol: filtered
//! stills are converted to 4:2:0, fed into input slots and the compressed
//! output is drained into a [`TrackMuxer`]. The loop is single threaded and
//! sequential; every buffer acquisition uses a short timeout so cancellation
//! is observed between iterations.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::config::EncoderConfig;
use crate::error::{EncodeError, Result};
use crate::media::backend::{CodecBackend, EncoderOutput, EncoderSettings, OutputBuffer, VideoEncoder};
use crate::media::muxer::TrackMuxer;
use crate::media::picture::{round_down_even, Picture};
use crate::media::types::{EncodedSample, FrameManifest, TrackRole};
use crate::media::yuv::to_planar_yuv;
use crate::progress::{ProgressSink, StageProgress};

const PROGRESS_EVERY: usize = 3;

/// Lifecycle of one encoder session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Unconfigured,
    Configured,
    Running,
    AwaitingFormat,
    Draining,
    Stopped,
}

impl EncoderState {
    pub fn can_transition_to(self, next: EncoderState) -> bool {
        use EncoderState::*;
        matches!(
            (self, next),
            (Unconfigured, Configured)
                | (Configured, Running)
                | (Running, AwaitingFormat)
                | (AwaitingFormat, Draining)
                | (Running, Stopped)
                | (Draining, Stopped)
        )
    }
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Owns an encoder for the duration of one session.
///
/// Dropping the session stops a started encoder and always releases it.
struct EncoderSession {
    encoder: Box<dyn VideoEncoder>,
    state: EncoderState,
    started: bool,
    released: bool,
}

impl EncoderSession {
    fn new(encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            encoder,
            state: EncoderState::Unconfigured,
            started: false,
            released: false,
        }
    }

    fn transition(&mut self, next: EncoderState) -> std::result::Result<(), EncodeError> {
        if !self.state.can_transition_to(next) {
            return Err(EncodeError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Encoder state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn configure(&mut self, settings: &EncoderSettings) -> std::result::Result<(), EncodeError> {
        self.encoder.configure(settings)?;
        self.transition(EncoderState::Configured)
    }

    fn start(&mut self) -> std::result::Result<(), EncodeError> {
        self.encoder.start()?;
        self.started = true;
        self.transition(EncoderState::Running)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        if self.started {
            self.encoder.stop();
        }
        self.encoder.release();
        self.released = true;
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// What happened during one encode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeReport {
    pub width: u32,
    pub height: u32,
    pub frames_submitted: usize,
    /// Frames that failed to decode and were submitted as empty buffers
    pub frames_blank: usize,
    pub samples_written: usize,
    pub samples_dropped: usize,
    pub violations: Vec<EncodeError>,
}

/// Presentation time of the frame at `position`, in microseconds
pub fn presentation_time_us(position: usize, target_fps: f64) -> i64 {
    (position as f64 * 1_000_000.0 / target_fps).round() as i64
}

/// Encodes an ordered frame manifest into a video-only container
pub struct EncoderPump<'a> {
    backend: &'a dyn CodecBackend,
    config: &'a EncoderConfig,
    cancel: Option<CancellationFlag>,
    progress: Option<(&'a dyn ProgressSink, f64, f64)>,
}

impl<'a> EncoderPump<'a> {
    pub fn new(backend: &'a dyn CodecBackend, config: &'a EncoderConfig) -> Self {
        Self {
            backend,
            config,
            cancel: None,
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Report submitted frames as a share of `[base, base + weight]`
    pub fn with_progress(mut self, sink: &'a dyn ProgressSink, base: f64, weight: f64) -> Self {
        self.progress = Some((sink, base, weight));
        self
    }

    /// Encode `frames` at `target_fps` into `output`.
    ///
    /// The requested size is rounded down to even dimensions and every frame
    /// is resampled to it. Timestamps are taken from each frame's position in
    /// `frames`, not its original index.
    pub fn encode(
        &self,
        frames: &FrameManifest,
        output: &Path,
        width: u32,
        height: u32,
        target_fps: f64,
    ) -> Result<EncodeReport> {
        if frames.is_empty() {
            return Err(EncodeError::Configure { reason: "no frames to encode".to_string() }.into());
        }
        if !(target_fps > 0.0) {
            return Err(EncodeError::Configure { reason: format!("invalid frame rate {}", target_fps) }.into());
        }

        let settings = EncoderSettings {
            width: round_down_even(width),
            height: round_down_even(height),
            bitrate: self.config.bitrate,
            frame_rate: target_fps,
            key_frame_interval_secs: self.config.key_frame_interval_secs,
        };

        info!("Encoding {} frames at {}x{} @ {} fps into {}",
              frames.len(), settings.width, settings.height, target_fps, output.display());

        let mut session = EncoderSession::new(self.backend.create_encoder()?);
        session.configure(&settings)?;
        let mut muxer = TrackMuxer::new(self.backend.create_writer(output)?);
        session.start()?;

        let mut report = EncodeReport {
            width: settings.width,
            height: settings.height,
            ..EncodeReport::default()
        };
        self.pump(&mut session, &mut muxer, frames, &settings, &mut report)?;

        session.release();
        muxer.stop()?;

        if report.samples_written == 0 {
            return Err(EncodeError::Pump { reason: "encoder produced no samples".to_string() }.into());
        }

        info!("Encoded {} samples ({} frames submitted, {} dropped)",
              report.samples_written, report.frames_submitted, report.samples_dropped);
        Ok(report)
    }

    fn pump(
        &self,
        session: &mut EncoderSession,
        muxer: &mut TrackMuxer,
        frames: &FrameManifest,
        settings: &EncoderSettings,
        report: &mut EncodeReport,
    ) -> Result<()> {
        let timeout = self.config.dequeue_timeout();
        let stage = self.progress.map(|(sink, base, weight)| {
            StageProgress::new(sink, "Encoding video", frames.len())
                .every(PROGRESS_EVERY)
                .span(base, weight)
        });

        let mut next = 0;
        let mut end_signalled = false;
        let mut idle_polls = 0u32;

        while session.state != EncoderState::Stopped {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return Err(EncodeError::Cancelled.into());
            }
            let poll_started = Instant::now();
            let mut progressed = false;

            if !end_signalled {
                if let Some(slot) = session.encoder.dequeue_input_buffer(timeout)? {
                    progressed = true;
                    let pts = presentation_time_us(next, settings.frame_rate);
                    if let Some(frame) = frames.frames().get(next) {
                        let data = match load_planar(&frame.file_path, settings) {
                            Ok(data) => data,
                            Err(e) => {
                                warn!("Frame {} failed to decode, submitting empty buffer: {}", next, e);
                                report.frames_blank += 1;
                                Vec::new()
                            }
                        };
                        session.encoder.queue_input_buffer(slot, &data, pts, false)?;
                        report.frames_submitted += 1;
                        next += 1;
                        if let Some(stage) = &stage {
                            stage.tick();
                        }
                    } else {
                        debug!("Signalling end of stream at {}us", pts);
                        session.encoder.queue_input_buffer(slot, &[], pts, true)?;
                        end_signalled = true;
                    }
                }
            }

            match session.encoder.dequeue_output_buffer(timeout)? {
                EncoderOutput::TryAgainLater => {}
                EncoderOutput::FormatChanged => {
                    progressed = true;
                    self.register_format(session, muxer, report)?;
                }
                EncoderOutput::Buffer(buffer) => {
                    progressed = true;
                    let end_of_stream = buffer.end_of_stream;
                    self.forward(muxer, &buffer, report)?;
                    session.encoder.release_output_buffer(buffer.index);
                    if end_of_stream {
                        session.transition(EncoderState::Stopped)?;
                    }
                }
            }

            if progressed {
                idle_polls = 0;
            } else {
                // Backends may return before the timeout; pad so the stall
                // limit measures time, not loop speed
                let spent = poll_started.elapsed();
                if spent < timeout {
                    std::thread::sleep(timeout - spent);
                }
                idle_polls += 1;
                if idle_polls >= self.config.max_idle_polls {
                    return Err(EncodeError::Stalled { polls: idle_polls }.into());
                }
            }
        }

        Ok(())
    }

    fn register_format(
        &self,
        session: &mut EncoderSession,
        muxer: &mut TrackMuxer,
        report: &mut EncodeReport,
    ) -> Result<()> {
        if muxer.track(TrackRole::Video).is_some() {
            warn!("Encoder reported its output format twice, ignoring");
            report.violations.push(EncodeError::ContractViolation {
                reason: "output format changed after the muxer started".to_string(),
            });
            return Ok(());
        }

        session.transition(EncoderState::AwaitingFormat)?;
        let format = session.encoder.output_format()?;
        debug!("Encoder output format: {:?}", format);
        muxer.add_track(TrackRole::Video, &format)?;
        muxer.start()?;
        session.transition(EncoderState::Draining)?;
        Ok(())
    }

    fn forward(&self, muxer: &mut TrackMuxer, buffer: &OutputBuffer, report: &mut EncodeReport) -> Result<()> {
        if buffer.codec_config || buffer.data.is_empty() {
            return Ok(());
        }

        match muxer.track(TrackRole::Video).filter(|_| muxer.is_started()) {
            Some(track_index) => {
                muxer.write(&EncodedSample {
                    track_index,
                    presentation_time_us: buffer.presentation_time_us,
                    decode_time_us: None,
                    data: buffer.data.clone(),
                    is_key_frame: buffer.key_frame,
                    is_end_of_stream: buffer.end_of_stream,
                })?;
                report.samples_written += 1;
            }
            None => {
                warn!("Dropping sample at {}us drained before the output format", buffer.presentation_time_us);
                report.samples_dropped += 1;
                report.violations.push(EncodeError::ContractViolation {
                    reason: format!("sample at {}us drained before muxer start", buffer.presentation_time_us),
                });
            }
        }
        Ok(())
    }
}

fn load_planar(path: &Path, settings: &EncoderSettings) -> Result<Vec<u8>> {
    let picture = Picture::open(path)?.resized(settings.width, settings.height);
    Ok(to_planar_yuv(picture.as_image(), settings.width, settings.height))
}
