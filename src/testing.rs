//! In-memory fakes for the media seams, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{EncodeError, ExtractionError, MuxError, PipelineError, Result};
use crate::filters::Filter;
use crate::media::backend::{
    CodecBackend, ContainerWriter, EncoderOutput, EncoderSettings, FrameSource, MediaSource, OutputBuffer,
    VideoEncoder,
};
use crate::media::picture::Picture;
use crate::media::types::{EncodedSample, Frame, SourceMedia, SourceSample, TrackFormat};
use crate::progress::{ProgressEvent, ProgressSink};

const SAMPLE_STEP_US: i64 = 200_000;
const COLOR_TOLERANCE: i32 = 6;

/// Colour of the solid test frame with the given index
fn frame_color(index: usize) -> [u8; 3] {
    [(index * 40 % 256) as u8, 90, 170]
}

/// Write `count` solid-colour JPEGs named like extracted frames
pub fn write_solid_frames(dir: &Path, prefix: &str, count: usize, width: u32, height: u32) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(Frame::file_name(prefix, i));
            Picture::new_filled(width, height, frame_color(i)).save_jpeg(&path, 95).unwrap();
            path
        })
        .collect()
}

/// Keeps every reported event
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn last(&self) -> Option<ProgressEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, progress: f64, status: &str) {
        self.events.lock().unwrap().push(ProgressEvent::new(progress, status));
    }
}

/// Frame source producing solid stills without touching a real decoder
pub struct SyntheticSource {
    duration: f64,
    width: u32,
    height: u32,
    failing: Vec<usize>,
}

impl SyntheticSource {
    pub fn new(duration: f64, width: u32, height: u32) -> Self {
        Self {
            duration,
            width,
            height,
            failing: Vec::new(),
        }
    }

    /// Fail the grabs whose destination carries one of these frame indices
    pub fn failing_at(mut self, indices: &[usize]) -> Self {
        self.failing = indices.to_vec();
        self
    }
}

impl FrameSource for SyntheticSource {
    fn probe(&self, path: &Path) -> std::result::Result<SourceMedia, ExtractionError> {
        Ok(SourceMedia {
            path: path.to_path_buf(),
            duration_seconds: self.duration,
            width: self.width,
            height: self.height,
            source_frame_rate: 30.0,
            has_audio: false,
        })
    }

    fn grab(&self, _path: &Path, timestamp: f64, dest: &Path, quality: u8) -> std::result::Result<(), ExtractionError> {
        let index = Frame::index_from_path(dest).unwrap_or(0);
        if self.failing.contains(&index) {
            return Err(ExtractionError::GrabFailed {
                timestamp,
                reason: "synthetic failure".to_string(),
            });
        }
        Picture::new_filled(self.width, self.height, frame_color(index))
            .save_jpeg(dest, quality)
            .map_err(|e| ExtractionError::GrabFailed {
                timestamp,
                reason: e.to_string(),
            })
    }
}

/// Fails on solid frames written for the given indices
pub struct FailingFilter {
    reds: Vec<u8>,
}

impl FailingFilter {
    pub fn on_indices(indices: &[usize]) -> Self {
        Self {
            reds: indices.iter().map(|&i| frame_color(i)[0]).collect(),
        }
    }
}

impl Filter for FailingFilter {
    fn name(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "Fails on selected frames"
    }

    fn apply(&self, picture: &Picture) -> Result<Picture> {
        let red = picture.get_pixel(0, 0)[0] as i32;
        if self.reds.iter().any(|&r| (r as i32 - red).abs() <= COLOR_TOLERANCE) {
            return Err(PipelineError::generic("refusing this frame"));
        }
        Ok(picture.clone())
    }
}

/// How the scripted encoder orders its output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptMode {
    /// Output format first, then one sample per queued frame
    #[default]
    FormatFirst,
    /// The first sample arrives before the output format
    SampleFirst,
    /// Never offers input slots or output
    Silent,
    /// `configure` fails
    RejectConfigure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderCall {
    Configure { width: u32, height: u32 },
    Start,
    Queue { len: usize, pts: i64, eos: bool },
    Stop,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterEvent {
    AddTrack(crate::media::types::TrackRole),
    Start,
    Write { track: usize, pts: i64 },
    Stop,
    Release,
}

/// A track of a fake source container with `samples` samples
#[derive(Debug, Clone)]
pub struct MemoryTrack {
    format: TrackFormat,
    samples: usize,
}

impl MemoryTrack {
    pub fn video(samples: usize) -> Self {
        Self {
            format: TrackFormat::video("avc", 64, 48, 5.0),
            samples,
        }
    }

    pub fn audio(samples: usize) -> Self {
        Self {
            format: TrackFormat::audio("aac", 44100, 2),
            samples,
        }
    }
}

#[derive(Default)]
struct BackendState {
    encoder_calls: Vec<EncoderCall>,
    writer_events: Vec<WriterEvent>,
    sources: HashMap<PathBuf, Vec<MemoryTrack>>,
}

/// Codec backend with a scripted encoder, a recording writer and
/// registered in-memory sources
#[derive(Clone, Default)]
pub struct MemoryBackend {
    script: ScriptMode,
    state: Arc<Mutex<BackendState>>,
}

impl MemoryBackend {
    pub fn with_script(script: ScriptMode) -> Self {
        Self {
            script,
            state: Arc::default(),
        }
    }

    pub fn add_source(&self, path: &Path, tracks: Vec<MemoryTrack>) {
        self.state.lock().unwrap().sources.insert(path.to_path_buf(), tracks);
    }

    pub fn encoder_calls(&self) -> Vec<EncoderCall> {
        self.state.lock().unwrap().encoder_calls.clone()
    }

    pub fn writer_events(&self) -> Vec<WriterEvent> {
        self.state.lock().unwrap().writer_events.clone()
    }

    pub fn samples_written(&self) -> usize {
        self.writer_events()
            .iter()
            .filter(|e| matches!(e, WriterEvent::Write { .. }))
            .count()
    }
}

impl CodecBackend for MemoryBackend {
    fn create_encoder(&self) -> std::result::Result<Box<dyn VideoEncoder>, EncodeError> {
        Ok(Box::new(ScriptedEncoder {
            script: self.script,
            state: self.state.clone(),
            settings: None,
            pending: VecDeque::new(),
            format_emitted: false,
            early_sample_emitted: false,
            eos_queued: false,
            eos_emitted: false,
            samples_emitted: 0,
        }))
    }

    fn create_writer(&self, output: &Path) -> std::result::Result<Box<dyn ContainerWriter>, MuxError> {
        std::fs::File::create(output).map_err(|e| MuxError::Container { reason: e.to_string() })?;
        Ok(Box::new(MemoryWriter {
            state: self.state.clone(),
            tracks: 0,
        }))
    }

    fn open_source(&self, path: &Path) -> std::result::Result<Box<dyn MediaSource>, MuxError> {
        let tracks = self
            .state
            .lock()
            .unwrap()
            .sources
            .get(path)
            .cloned()
            .ok_or_else(|| MuxError::Container {
                reason: format!("cannot open {}", path.display()),
            })?;
        Ok(Box::new(MemorySource {
            formats: tracks.iter().map(|t| t.format.clone()).collect(),
            counts: tracks.iter().map(|t| t.samples).collect(),
            selected: None,
            cursor: 0,
        }))
    }
}

struct ScriptedEncoder {
    script: ScriptMode,
    state: Arc<Mutex<BackendState>>,
    settings: Option<EncoderSettings>,
    pending: VecDeque<i64>,
    format_emitted: bool,
    early_sample_emitted: bool,
    eos_queued: bool,
    eos_emitted: bool,
    samples_emitted: usize,
}

impl ScriptedEncoder {
    fn record(&self, call: EncoderCall) {
        self.state.lock().unwrap().encoder_calls.push(call);
    }

    fn next_sample(&mut self) -> Option<EncoderOutput> {
        let pts = self.pending.pop_front()?;
        self.samples_emitted += 1;
        Some(EncoderOutput::Buffer(OutputBuffer {
            index: 0,
            data: vec![0xAB; 8],
            presentation_time_us: pts,
            key_frame: self.samples_emitted == 1,
            codec_config: false,
            end_of_stream: false,
        }))
    }
}

impl VideoEncoder for ScriptedEncoder {
    fn configure(&mut self, settings: &EncoderSettings) -> std::result::Result<(), EncodeError> {
        self.record(EncoderCall::Configure {
            width: settings.width,
            height: settings.height,
        });
        if self.script == ScriptMode::RejectConfigure {
            return Err(EncodeError::Configure {
                reason: "scripted rejection".to_string(),
            });
        }
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn start(&mut self) -> std::result::Result<(), EncodeError> {
        self.record(EncoderCall::Start);
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> std::result::Result<Option<usize>, EncodeError> {
        if self.script == ScriptMode::Silent || self.eos_queued {
            return Ok(None);
        }
        Ok(Some(0))
    }

    fn queue_input_buffer(
        &mut self,
        _index: usize,
        data: &[u8],
        presentation_time_us: i64,
        end_of_stream: bool,
    ) -> std::result::Result<(), EncodeError> {
        self.record(EncoderCall::Queue {
            len: data.len(),
            pts: presentation_time_us,
            eos: end_of_stream,
        });
        if end_of_stream {
            self.eos_queued = true;
        } else {
            self.pending.push_back(presentation_time_us);
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> std::result::Result<EncoderOutput, EncodeError> {
        if self.script == ScriptMode::Silent {
            return Ok(EncoderOutput::TryAgainLater);
        }
        if !self.format_emitted {
            if self.script == ScriptMode::SampleFirst && !self.early_sample_emitted {
                if let Some(sample) = self.next_sample() {
                    self.early_sample_emitted = true;
                    return Ok(sample);
                }
            }
            self.format_emitted = true;
            return Ok(EncoderOutput::FormatChanged);
        }
        if let Some(sample) = self.next_sample() {
            return Ok(sample);
        }
        if self.eos_queued && !self.eos_emitted {
            self.eos_emitted = true;
            return Ok(EncoderOutput::Buffer(OutputBuffer {
                index: 0,
                data: Vec::new(),
                presentation_time_us: 0,
                key_frame: false,
                codec_config: false,
                end_of_stream: true,
            }));
        }
        Ok(EncoderOutput::TryAgainLater)
    }

    fn output_format(&self) -> std::result::Result<TrackFormat, EncodeError> {
        let settings = self.settings.as_ref().ok_or_else(|| EncodeError::ContractViolation {
            reason: "format requested before configure".to_string(),
        })?;
        Ok(TrackFormat::video("avc", settings.width, settings.height, settings.frame_rate))
    }

    fn release_output_buffer(&mut self, _index: usize) {}

    fn stop(&mut self) {
        self.record(EncoderCall::Stop);
    }

    fn release(&mut self) {
        self.record(EncoderCall::Release);
    }
}

struct MemoryWriter {
    state: Arc<Mutex<BackendState>>,
    tracks: usize,
}

impl MemoryWriter {
    fn record(&self, event: WriterEvent) {
        self.state.lock().unwrap().writer_events.push(event);
    }
}

impl ContainerWriter for MemoryWriter {
    fn add_track(&mut self, format: &TrackFormat) -> std::result::Result<usize, MuxError> {
        self.record(WriterEvent::AddTrack(format.role));
        self.tracks += 1;
        Ok(self.tracks - 1)
    }

    fn start(&mut self) -> std::result::Result<(), MuxError> {
        self.record(WriterEvent::Start);
        Ok(())
    }

    fn write_sample(&mut self, sample: &EncodedSample) -> std::result::Result<(), MuxError> {
        self.record(WriterEvent::Write {
            track: sample.track_index,
            pts: sample.presentation_time_us,
        });
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), MuxError> {
        self.record(WriterEvent::Stop);
        Ok(())
    }

    fn release(&mut self) {
        self.record(WriterEvent::Release);
    }
}

struct MemorySource {
    formats: Vec<TrackFormat>,
    counts: Vec<usize>,
    selected: Option<usize>,
    cursor: usize,
}

impl MediaSource for MemorySource {
    fn tracks(&self) -> &[TrackFormat] {
        &self.formats
    }

    fn select_track(&mut self, index: usize) -> std::result::Result<(), MuxError> {
        if index >= self.formats.len() {
            return Err(MuxError::Container {
                reason: format!("no track {}", index),
            });
        }
        self.selected = Some(index);
        self.cursor = 0;
        Ok(())
    }

    fn read_sample(&mut self) -> std::result::Result<Option<SourceSample>, MuxError> {
        let track = self.selected.ok_or_else(|| MuxError::Container {
            reason: "no track selected".to_string(),
        })?;
        if self.cursor >= self.counts[track] {
            return Ok(None);
        }
        let pts = self.cursor as i64 * SAMPLE_STEP_US;
        self.cursor += 1;
        Ok(Some(SourceSample {
            presentation_time_us: pts,
            decode_time_us: Some(pts),
            data: vec![track as u8; 4],
            is_key_frame: self.cursor == 1,
        }))
    }
}
