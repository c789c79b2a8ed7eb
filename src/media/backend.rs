//! Seams between the pipeline and the media libraries it drives.
//!
//! Frame grabbing and codec/container access are traits so the stages can
//! be exercised against fakes and so the libav bindings stay optional.

use std::path::Path;
use std::time::Duration;

use crate::error::{EncodeError, ExtractionError, MuxError};
use crate::media::types::{EncodedSample, SourceMedia, SourceSample, TrackFormat};

/// Reads metadata and single stills out of a source video
pub trait FrameSource: Send + Sync {
    fn probe(&self, path: &Path) -> Result<SourceMedia, ExtractionError>;

    /// Decode the frame closest to `timestamp_seconds` and store it at
    /// `dest` as a JPEG of the given quality
    fn grab(&self, path: &Path, timestamp_seconds: f64, dest: &Path, quality: u8) -> Result<(), ExtractionError>;
}

/// Factory for encoder, container writer and container reader sessions
pub trait CodecBackend: Send + Sync {
    fn create_encoder(&self) -> Result<Box<dyn VideoEncoder>, EncodeError>;
    fn create_writer(&self, output: &Path) -> Result<Box<dyn ContainerWriter>, MuxError>;
    fn open_source(&self, path: &Path) -> Result<Box<dyn MediaSource>, MuxError>;
}

/// Parameters the encoder is configured with
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: f64,
    pub key_frame_interval_secs: u32,
}

/// A compressed buffer handed out by the encoder
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBuffer {
    pub index: usize,
    pub data: Vec<u8>,
    pub presentation_time_us: i64,
    pub key_frame: bool,
    /// Out-of-band codec data already carried by the output format
    pub codec_config: bool,
    pub end_of_stream: bool,
}

/// Outcome of polling the encoder for output
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderOutput {
    TryAgainLater,
    FormatChanged,
    Buffer(OutputBuffer),
}

/// Stateful encoder with a dequeue/queue buffer exchange protocol.
///
/// Input slots are acquired with `dequeue_input_buffer` and handed back
/// filled with `queue_input_buffer`; output buffers are acquired with
/// `dequeue_output_buffer` and returned with `release_output_buffer`.
/// A zero-length input with `end_of_stream` set signals the end of input.
pub trait VideoEncoder {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<(), EncodeError>;
    fn start(&mut self) -> Result<(), EncodeError>;
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>, EncodeError>;
    fn queue_input_buffer(
        &mut self,
        index: usize,
        data: &[u8],
        presentation_time_us: i64,
        end_of_stream: bool,
    ) -> Result<(), EncodeError>;
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<EncoderOutput, EncodeError>;
    /// Negotiated output format; valid after `FormatChanged` was reported
    fn output_format(&self) -> Result<TrackFormat, EncodeError>;
    fn release_output_buffer(&mut self, index: usize);
    fn stop(&mut self);
    fn release(&mut self);
}

/// Output container accepting tracks and samples
pub trait ContainerWriter {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize, MuxError>;
    fn start(&mut self) -> Result<(), MuxError>;
    fn write_sample(&mut self, sample: &EncodedSample) -> Result<(), MuxError>;
    fn stop(&mut self) -> Result<(), MuxError>;
    fn release(&mut self);
}

/// Read cursor over the samples of one track of an existing container
pub trait MediaSource {
    fn tracks(&self) -> &[TrackFormat];
    fn select_track(&mut self, index: usize) -> Result<(), MuxError>;
    /// Next sample of the selected track, `None` at end of stream
    fn read_sample(&mut self) -> Result<Option<SourceSample>, MuxError>;
}
