use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::media::backend::FrameSource;
use crate::media::picture::Picture;
use crate::media::types::SourceMedia;

/// Frame source backed by the `ffprobe` and `ffmpeg` executables
#[derive(Debug, Clone)]
pub struct FfmpegCli {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegCli {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl FfmpegCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use executables other than the ones on `PATH`
    pub fn with_executables<S: Into<String>>(ffmpeg: S, ffprobe: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Check whether both executables can be launched
    pub fn check_available(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|program| {
            Command::new(program.as_str())
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    fn run_grab(&self, path: &Path, timestamp_seconds: f64, accurate: bool) -> Result<Vec<u8>, String> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error"]);
        if !accurate {
            cmd.arg("-noaccurate_seek");
        }
        cmd.args(["-ss", &format!("{:.6}", timestamp_seconds)])
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"]);

        let output = cmd.output().map_err(|e| format!("cannot launch {}: {}", self.ffmpeg, e))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        if output.stdout.is_empty() {
            return Err("no frame decoded".to_string());
        }
        Ok(output.stdout)
    }
}

fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => rate.parse().ok()?,
    };
    (value > 0.0).then_some(value)
}

fn parse_probe(path: &Path, json: &str) -> Result<SourceMedia, ExtractionError> {
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| ExtractionError::ProbeFailed {
        path: path.display().to_string(),
        reason: format!("unreadable ffprobe output: {}", e),
    })?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ExtractionError::InvalidMedia {
            path: path.display().to_string(),
            reason: "no video stream".to_string(),
        })?;
    let has_audio = probe.streams.iter().any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let source_frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(0.0);

    Ok(SourceMedia {
        path: path.to_path_buf(),
        duration_seconds,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        source_frame_rate,
        has_audio,
    })
}

impl FrameSource for FfmpegCli {
    fn probe(&self, path: &Path) -> Result<SourceMedia, ExtractionError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| ExtractionError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!("cannot launch {}: {}", self.ffprobe, e),
            })?;

        if !output.status.success() {
            return Err(ExtractionError::InvalidMedia {
                path: path.display().to_string(),
                reason: "ffprobe could not read the file".to_string(),
            });
        }

        let media = parse_probe(path, &String::from_utf8_lossy(&output.stdout))?;
        info!("Video metadata: {}x{} @ {:.1}fps, {:.2}s, audio: {}",
              media.width, media.height, media.source_frame_rate, media.duration_seconds, media.has_audio);
        Ok(media)
    }

    fn grab(&self, path: &Path, timestamp_seconds: f64, dest: &Path, quality: u8) -> Result<(), ExtractionError> {
        let bytes = match self.run_grab(path, timestamp_seconds, true) {
            Ok(bytes) => bytes,
            Err(reason) => {
                debug!("Accurate seek to {:.3}s failed ({}), retrying at nearest decodable frame",
                       timestamp_seconds, reason);
                self.run_grab(path, timestamp_seconds, false)
                    .map_err(|reason| ExtractionError::GrabFailed { timestamp: timestamp_seconds, reason })?
            }
        };

        let picture = Picture::from_encoded(&bytes).map_err(|e| ExtractionError::GrabFailed {
            timestamp: timestamp_seconds,
            reason: format!("undecodable frame: {}", e),
        })?;
        picture.save_jpeg(dest, quality).map_err(|e| {
            warn!("Could not write {}: {}", dest.display(), e);
            ExtractionError::GrabFailed {
                timestamp: timestamp_seconds,
                reason: format!("cannot write {}: {}", dest.display(), e),
            }
        })
    }
}
