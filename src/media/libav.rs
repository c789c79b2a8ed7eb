//! libavcodec / libavformat backend
//!
//! The send/receive codec API is adapted to the dequeue/queue buffer
//! protocol: there is a single input slot, the output format is announced
//! once after the encoder opens, and a frame the encoder cannot accept yet
//! is held back until output has been drained. Neither call blocks in
//! libavcodec, so dequeue timeouts are not waited on here; the pump pads
//! idle polls itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::codec::{self, encoder, Id};
use ffmpeg_next::format::{self, Pixel};
use ffmpeg_next::util::frame;
use ffmpeg_next::{media, Packet, Rational};
use tracing::{debug, info};

use crate::error::{EncodeError, MuxError};
use crate::media::backend::{
    CodecBackend, ContainerWriter, EncoderOutput, EncoderSettings, MediaSource, OutputBuffer, VideoEncoder,
};
use crate::media::types::{EncodedSample, SourceSample, TrackFormat};

const MICROSECONDS: Rational = Rational(1, 1_000_000);

/// Codec parameters carried inside a [`TrackFormat`]
pub struct LibavParameters {
    parameters: codec::Parameters,
    time_base: Rational,
}

// SAFETY: the wrapped AVCodecParameters is an owned copy (no owner handle)
// and is only read after construction.
unsafe impl Send for LibavParameters {}
unsafe impl Sync for LibavParameters {}

impl LibavParameters {
    fn owned(parameters: &codec::Parameters, time_base: Rational) -> Self {
        Self {
            parameters: parameters.clone(),
            time_base,
        }
    }
}

/// Codec backend on top of the linked FFmpeg libraries
pub struct LibavBackend;

impl LibavBackend {
    pub fn new() -> Result<Self, EncodeError> {
        ffmpeg_next::init().map_err(|e| EncodeError::Configure {
            reason: format!("FFmpeg initialization failed: {}", e),
        })?;
        Ok(Self)
    }
}

impl CodecBackend for LibavBackend {
    fn create_encoder(&self) -> Result<Box<dyn VideoEncoder>, EncodeError> {
        Ok(Box::new(LibavEncoder::default()))
    }

    fn create_writer(&self, output: &Path) -> Result<Box<dyn ContainerWriter>, MuxError> {
        Ok(Box::new(LibavWriter::create(output)?))
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn MediaSource>, MuxError> {
        Ok(Box::new(LibavSource::open(path)?))
    }
}

fn configure_error(e: ffmpeg_next::Error) -> EncodeError {
    EncodeError::Configure { reason: e.to_string() }
}

fn pump_error(e: ffmpeg_next::Error) -> EncodeError {
    EncodeError::Pump { reason: e.to_string() }
}

fn container_error(e: ffmpeg_next::Error) -> MuxError {
    MuxError::Container { reason: e.to_string() }
}

fn is_again(e: &ffmpeg_next::Error) -> bool {
    matches!(e, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::util::error::EAGAIN)
}

#[derive(Default)]
struct LibavEncoder {
    settings: Option<EncoderSettings>,
    encoder: Option<encoder::video::Encoder>,
    format_reported: bool,
    held_back: Option<frame::Video>,
    eof_pending: bool,
    input_closed: bool,
}

impl LibavEncoder {
    fn encoder(&mut self) -> Result<&mut encoder::video::Encoder, EncodeError> {
        self.encoder.as_mut().ok_or_else(|| EncodeError::Pump {
            reason: "encoder not started".to_string(),
        })
    }

    fn picture(&self, settings: &EncoderSettings, data: &[u8], pts: i64) -> frame::Video {
        let (width, height) = (settings.width as usize, settings.height as usize);
        let (chroma_width, chroma_height) = (width / 2, height / 2);
        let mut picture = frame::Video::new(Pixel::YUV420P, settings.width, settings.height);

        let stride = picture.stride(0);
        let luma = picture.data_mut(0);
        for row in 0..height {
            luma[row * stride..row * stride + width].copy_from_slice(&data[row * width..(row + 1) * width]);
        }

        // Interleaved U/V pairs are split into the two chroma planes
        let chroma = &data[width * height..];
        for plane in [1usize, 2] {
            let stride = picture.stride(plane);
            let target = picture.data_mut(plane);
            for row in 0..chroma_height {
                for col in 0..chroma_width {
                    target[row * stride + col] = chroma[(row * chroma_width + col) * 2 + plane - 1];
                }
            }
        }

        picture.set_pts(Some(pts));
        picture
    }

    /// Push a held-back frame or end of stream into the encoder
    fn flush_pending(&mut self) -> Result<(), EncodeError> {
        if let Some(picture) = self.held_back.take() {
            match self.encoder()?.send_frame(&picture) {
                Ok(()) => {}
                Err(e) if is_again(&e) => {
                    self.held_back = Some(picture);
                    return Ok(());
                }
                Err(e) => return Err(pump_error(e)),
            }
        }
        if self.eof_pending {
            self.encoder()?.send_eof().map_err(pump_error)?;
            self.eof_pending = false;
        }
        Ok(())
    }
}

impl VideoEncoder for LibavEncoder {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<(), EncodeError> {
        if settings.width % 2 != 0 || settings.height % 2 != 0 {
            return Err(EncodeError::Configure {
                reason: format!("odd dimensions {}x{}", settings.width, settings.height),
            });
        }
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), EncodeError> {
        let settings = self.settings.clone().ok_or_else(|| EncodeError::Configure {
            reason: "encoder started before configuration".to_string(),
        })?;
        let codec = encoder::find(Id::H264).ok_or_else(|| EncodeError::Configure {
            reason: "no H.264 encoder available".to_string(),
        })?;

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(configure_error)?;

        let fps = settings.frame_rate.round().max(1.0) as i32;
        video.set_width(settings.width);
        video.set_height(settings.height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(MICROSECONDS);
        video.set_frame_rate(Some(Rational(fps, 1)));
        video.set_bit_rate(settings.bitrate as usize);
        video.set_gop(fps as u32 * settings.key_frame_interval_secs);
        video.set_max_b_frames(0);
        video.set_flags(codec::Flags::GLOBAL_HEADER);

        let opened = video.open_as(codec).map_err(configure_error)?;
        info!("Opened H.264 encoder {}x{} @ {} fps, {} bps",
              settings.width, settings.height, fps, settings.bitrate);
        self.encoder = Some(opened);
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>, EncodeError> {
        if self.input_closed || self.held_back.is_some() {
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
    ) -> Result<(), EncodeError> {
        let settings = self.settings.clone().ok_or_else(|| EncodeError::Pump {
            reason: "encoder not configured".to_string(),
        })?;

        if end_of_stream {
            self.input_closed = true;
            self.eof_pending = true;
            return self.flush_pending();
        }
        if data.is_empty() {
            debug!("Empty input at {}us, leaving a gap", presentation_time_us);
            return Ok(());
        }
        if data.len() < crate::media::yuv::planar_size(settings.width, settings.height) {
            return Err(EncodeError::Pump {
                reason: format!("short input buffer ({} bytes)", data.len()),
            });
        }

        self.held_back = Some(self.picture(&settings, data, presentation_time_us));
        self.flush_pending()
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<EncoderOutput, EncodeError> {
        if self.encoder.is_none() {
            return Ok(EncoderOutput::TryAgainLater);
        }
        if !self.format_reported {
            self.format_reported = true;
            return Ok(EncoderOutput::FormatChanged);
        }

        let mut packet = Packet::empty();
        let received = self.encoder()?.receive_packet(&mut packet);
        let output = match received {
            Ok(()) => EncoderOutput::Buffer(OutputBuffer {
                index: 0,
                data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                presentation_time_us: packet.pts().unwrap_or(0),
                key_frame: packet.is_key(),
                codec_config: false,
                end_of_stream: false,
            }),
            Err(ffmpeg_next::Error::Eof) => EncoderOutput::Buffer(OutputBuffer {
                index: 0,
                data: Vec::new(),
                presentation_time_us: 0,
                key_frame: false,
                codec_config: false,
                end_of_stream: true,
            }),
            Err(e) if is_again(&e) => EncoderOutput::TryAgainLater,
            Err(e) => return Err(pump_error(e)),
        };

        self.flush_pending()?;
        Ok(output)
    }

    fn output_format(&self) -> Result<TrackFormat, EncodeError> {
        let (Some(settings), Some(encoder)) = (&self.settings, &self.encoder) else {
            return Err(EncodeError::Pump { reason: "output format requested before start".to_string() });
        };
        let parameters = codec::Parameters::from(encoder);
        Ok(TrackFormat::video("h264", settings.width, settings.height, settings.frame_rate)
            .with_native(LibavParameters::owned(&parameters, MICROSECONDS)))
    }

    fn release_output_buffer(&mut self, _index: usize) {}

    fn stop(&mut self) {
        self.held_back = None;
        self.input_closed = true;
    }

    fn release(&mut self) {
        self.encoder = None;
    }
}

struct LibavWriter {
    path: PathBuf,
    output: format::context::Output,
    time_bases: Vec<Rational>,
}

impl LibavWriter {
    fn create(path: &Path) -> Result<Self, MuxError> {
        let output = format::output(&path).map_err(container_error)?;
        Ok(Self {
            path: path.to_path_buf(),
            output,
            time_bases: Vec::new(),
        })
    }
}

impl ContainerWriter for LibavWriter {
    fn add_track(&mut self, track: &TrackFormat) -> Result<usize, MuxError> {
        let native = track.native::<LibavParameters>().ok_or_else(|| MuxError::Container {
            reason: format!("{} track has no codec parameters", track.role),
        })?;

        let mut stream = self
            .output
            .add_stream(encoder::find(Id::None))
            .map_err(container_error)?;
        stream.set_parameters(native.parameters.clone());
        stream.set_time_base(native.time_base);

        self.time_bases.push(MICROSECONDS);
        Ok(stream.index())
    }

    fn start(&mut self) -> Result<(), MuxError> {
        self.output.write_header().map_err(container_error)?;
        debug!("Wrote container header for {}", self.path.display());
        Ok(())
    }

    fn write_sample(&mut self, sample: &EncodedSample) -> Result<(), MuxError> {
        let source_tb = *self.time_bases.get(sample.track_index).ok_or_else(|| MuxError::Container {
            reason: format!("unknown track {}", sample.track_index),
        })?;
        let stream_tb = self
            .output
            .stream(sample.track_index)
            .map(|s| s.time_base())
            .unwrap_or(source_tb);

        let mut packet = Packet::copy(&sample.data);
        packet.set_stream(sample.track_index);
        packet.set_pts(Some(sample.presentation_time_us));
        packet.set_dts(Some(sample.decode_time_us.unwrap_or(sample.presentation_time_us)));
        if sample.is_key_frame {
            packet.set_flags(codec::packet::Flags::KEY);
        }
        packet.rescale_ts(source_tb, stream_tb);
        packet.write_interleaved(&mut self.output).map_err(container_error)
    }

    fn stop(&mut self) -> Result<(), MuxError> {
        self.output.write_trailer().map_err(container_error)?;
        info!("Finalized {}", self.path.display());
        Ok(())
    }

    fn release(&mut self) {}
}

struct LibavSource {
    input: format::context::Input,
    tracks: Vec<TrackFormat>,
    stream_indices: Vec<usize>,
    selected: Option<usize>,
}

impl LibavSource {
    fn open(path: &Path) -> Result<Self, MuxError> {
        let input = format::input(&path).map_err(container_error)?;

        let mut tracks = Vec::new();
        let mut stream_indices = Vec::new();
        for stream in input.streams() {
            let Some(format) = track_format(&stream)? else {
                continue;
            };
            let native = LibavParameters::owned(&stream.parameters(), stream.time_base());
            tracks.push(format.with_native(native));
            stream_indices.push(stream.index());
        }

        debug!("Opened {} with {} usable track(s)", path.display(), tracks.len());
        Ok(Self {
            input,
            tracks,
            stream_indices,
            selected: None,
        })
    }
}

/// Describe a stream through its decoder context; `None` for streams that
/// are neither video nor audio
fn track_format(stream: &format::stream::Stream) -> Result<Option<TrackFormat>, MuxError> {
    let parameters = stream.parameters();
    let codec_name = format!("{:?}", parameters.id()).to_lowercase();
    let medium = parameters.medium();
    if !matches!(medium, media::Type::Video | media::Type::Audio) {
        return Ok(None);
    }

    let decoder = codec::context::Context::from_parameters(parameters)
        .map_err(container_error)?
        .decoder();
    let format = match medium {
        media::Type::Video => {
            let video = decoder.video().map_err(container_error)?;
            let rate = stream.avg_frame_rate();
            let frame_rate = if rate.denominator() != 0 { f64::from(rate) } else { 0.0 };
            TrackFormat::video(codec_name, video.width(), video.height(), frame_rate)
        }
        _ => {
            let audio = decoder.audio().map_err(container_error)?;
            TrackFormat::audio(codec_name, audio.rate(), audio.ch_layout().channels() as u16)
        }
    };
    Ok(Some(format))
}

impl MediaSource for LibavSource {
    fn tracks(&self) -> &[TrackFormat] {
        &self.tracks
    }

    fn select_track(&mut self, index: usize) -> Result<(), MuxError> {
        if index >= self.tracks.len() {
            return Err(MuxError::Container { reason: format!("no track {}", index) });
        }
        self.selected = Some(index);
        Ok(())
    }

    fn read_sample(&mut self) -> Result<Option<SourceSample>, MuxError> {
        let selected = self.selected.ok_or_else(|| MuxError::Container {
            reason: "no track selected".to_string(),
        })?;
        let stream_index = self.stream_indices[selected];
        let time_base = self
            .tracks[selected]
            .native::<LibavParameters>()
            .map(|p| p.time_base)
            .unwrap_or(MICROSECONDS);

        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(container_error(e)),
            }
            if packet.stream() != stream_index {
                continue;
            }

            packet.rescale_ts(time_base, MICROSECONDS);
            let presentation_time_us = packet.pts().or(packet.dts()).unwrap_or(0);
            return Ok(Some(SourceSample {
                presentation_time_us,
                decode_time_us: packet.dts(),
                data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                is_key_frame: packet.is_key(),
            }));
        }
    }
}
