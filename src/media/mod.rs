//! # Media Module
//!
//! Data model for frames and encoded samples, pixel conversion for encoder
//! input, the encoder pump, track muxing and the backends that talk to the
//! actual media libraries.

pub mod backend;
pub mod cli;
pub mod encoder;
#[cfg(feature = "ffmpeg")]
pub mod libav;
pub mod muxer;
pub mod picture;
pub mod types;
pub mod yuv;

pub use backend::{
    CodecBackend, ContainerWriter, EncoderOutput, EncoderSettings, FrameSource, MediaSource, OutputBuffer,
    VideoEncoder,
};
pub use cli::FfmpegCli;
pub use encoder::{EncodeReport, EncoderPump, EncoderState};
#[cfg(feature = "ffmpeg")]
pub use libav::LibavBackend;
pub use muxer::{merge_tracks, MergeOutcome, TrackMuxer};
pub use picture::Picture;
pub use types::{EncodedSample, Frame, FrameManifest, SourceMedia, SourceSample, TrackFormat, TrackRole};
pub use yuv::to_planar_yuv;
