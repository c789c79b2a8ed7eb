use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Source video metadata, read once from the container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMedia {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub source_frame_rate: f64,
    pub has_audio: bool,
}

impl SourceMedia {
    /// Number of frames sampled at `target_fps` over the whole duration
    pub fn total_frames(&self, target_fps: f64) -> usize {
        (self.duration_seconds * target_fps).round().max(0.0) as usize
    }
}

/// One extracted or filtered still on disk
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub file_path: PathBuf,
    pub timestamp_seconds: f64,
}

impl Frame {
    pub fn new<P: Into<PathBuf>>(index: usize, file_path: P, target_fps: f64) -> Self {
        Self {
            index,
            file_path: file_path.into(),
            timestamp_seconds: index as f64 / target_fps,
        }
    }

    /// Zero-padded file name so lexical order equals numeric order
    pub fn file_name(prefix: &str, index: usize) -> String {
        format!("{}_{:06}.jpg", prefix, index)
    }

    /// Parse the index back out of a name produced by [`Frame::file_name`]
    pub fn index_from_path<P: AsRef<Path>>(path: P) -> Option<usize> {
        let stem = path.as_ref().file_stem()?.to_str()?;
        let (_, digits) = stem.rsplit_once('_')?;
        digits.parse().ok()
    }
}

/// Ordered frames; index order is encode order and presentation order.
///
/// Failed frames are simply absent, never represented as holes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameManifest {
    frames: Vec<Frame>,
}

impl FrameManifest {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Build a manifest from frames in any order, sorted by index
    pub fn from_unordered(mut frames: Vec<Frame>) -> Self {
        frames.sort_by_key(|frame| frame.index);
        frames.dedup_by_key(|frame| frame.index);
        Self { frames }
    }

    /// Build a manifest from an ordered list of paths, indexed by position
    pub fn from_paths<I, P>(paths: I, target_fps: f64) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let frames = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| Frame::new(index, path, target_fps))
            .collect();
        Self { frames }
    }

    /// Renumber frames densely by position, recomputing timestamps
    pub fn compacted(&self, target_fps: f64) -> Self {
        Self::from_paths(self.frames.iter().map(|f| f.file_path.clone()), target_fps)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.frames.iter().map(|f| f.file_path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first(&self) -> Option<&Frame> {
        self.frames.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

impl FromIterator<Frame> for FrameManifest {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self::from_unordered(iter.into_iter().collect())
    }
}

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackRole {
    Video,
    Audio,
}

impl fmt::Display for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRole::Video => write!(f, "video"),
            TrackRole::Audio => write!(f, "audio"),
        }
    }
}

/// Negotiated format of an elementary stream.
///
/// `native` carries the backend's own codec parameters so a writer from the
/// same backend can register the track without loss.
#[derive(Clone)]
pub struct TrackFormat {
    pub role: TrackRole,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub native: Option<Arc<dyn Any + Send + Sync>>,
}

impl TrackFormat {
    pub fn video<S: Into<String>>(codec: S, width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            role: TrackRole::Video,
            codec: codec.into(),
            width,
            height,
            frame_rate,
            sample_rate: 0,
            channels: 0,
            native: None,
        }
    }

    pub fn audio<S: Into<String>>(codec: S, sample_rate: u32, channels: u16) -> Self {
        Self {
            role: TrackRole::Audio,
            codec: codec.into(),
            width: 0,
            height: 0,
            frame_rate: 0.0,
            sample_rate,
            channels,
            native: None,
        }
    }

    pub fn with_native<T: Any + Send + Sync>(mut self, native: T) -> Self {
        self.native = Some(Arc::new(native));
        self
    }

    pub fn native<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.native.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for TrackFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackFormat")
            .field("role", &self.role)
            .field("codec", &self.codec)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_rate", &self.frame_rate)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// One compressed sample on its way into a container
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSample {
    pub track_index: usize,
    pub presentation_time_us: i64,
    /// Decode timestamp for verbatim copies; `None` means equal to the PTS
    pub decode_time_us: Option<i64>,
    pub data: Vec<u8>,
    pub is_key_frame: bool,
    pub is_end_of_stream: bool,
}

/// A sample read from an existing container, before it is assigned a track
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSample {
    pub presentation_time_us: i64,
    pub decode_time_us: Option<i64>,
    pub data: Vec<u8>,
    pub is_key_frame: bool,
}

impl SourceSample {
    pub fn into_encoded(self, track_index: usize) -> EncodedSample {
        EncodedSample {
            track_index,
            presentation_time_us: self.presentation_time_us,
            decode_time_us: self.decode_time_us,
            data: self.data,
            is_key_frame: self.is_key_frame,
            is_end_of_stream: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_frames_rounds() {
        let media = SourceMedia {
            path: PathBuf::from("clip.mp4"),
            duration_seconds: 2.1,
            width: 640,
            height: 480,
            source_frame_rate: 30.0,
            has_audio: false,
        };
        assert_eq!(media.total_frames(5.0), 11);
        assert_eq!(media.total_frames(3.0), 6);
    }

    #[test]
    fn test_file_names_sort_numerically() {
        let mut names: Vec<String> = [10, 2, 100, 1].iter().map(|&i| Frame::file_name("frame", i)).collect();
        names.sort();
        assert_eq!(names, vec!["frame_000001.jpg", "frame_000002.jpg", "frame_000010.jpg", "frame_000100.jpg"]);
        assert_eq!(Frame::index_from_path("/tmp/x/filtered_000042.jpg"), Some(42));
    }

    #[test]
    fn test_manifest_sorts_and_compacts() {
        let manifest: FrameManifest = vec![
            Frame::new(4, "f4.jpg", 2.0),
            Frame::new(0, "f0.jpg", 2.0),
            Frame::new(2, "f2.jpg", 2.0),
        ]
        .into_iter()
        .collect();

        let indices: Vec<usize> = manifest.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 2, 4]);

        let compacted = manifest.compacted(2.0);
        let indices: Vec<usize> = compacted.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(compacted.frames()[2].file_path, PathBuf::from("f4.jpg"));
        assert_eq!(compacted.frames()[2].timestamp_seconds, 1.0);
    }

    #[test]
    fn test_native_format_downcast() {
        let format = TrackFormat::video("h264", 320, 240, 5.0).with_native(42u32);
        assert_eq!(format.native::<u32>(), Some(&42));
        assert_eq!(format.native::<String>(), None);
    }
}
