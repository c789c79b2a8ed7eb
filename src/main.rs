use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sketch_video::{
    config::Config,
    filters::{FilterKind, FilterRegistry},
    media::{backend::CodecBackend, FfmpegCli},
    pipeline::{AudioMergeRequest, ExtractionRequest, FilterRequest, Invocation, ProcessRequest, VideoPipeline},
    progress::ChannelSink,
};

#[derive(Parser)]
#[command(
    name = "sketch-video",
    version,
    about = "Re-encode videos through cosmetic sketch filters",
    long_about = "Sketch-Video samples frames from a video, applies a sketch-style filter to each frame, encodes the result back into a video and can copy the original audio under it."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract frames from a video at a target frame rate
    Extract {
        #[arg(short, long)]
        input: PathBuf,

        /// Directory the frames are written to
        #[arg(short, long)]
        output_dir: PathBuf,

        #[arg(short, long, default_value_t = 5.0)]
        fps: f64,
    },

    /// Filter extracted frames and encode them into a video
    Filter {
        /// Directory of extracted frames (*.jpg, encoded in name order)
        #[arg(short = 'd', long)]
        frames_dir: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Filter token (see `filters`)
        #[arg(short, long, default_value = "sketch")]
        filter: String,

        #[arg(long, default_value_t = 5.0)]
        fps: f64,

        /// Source duration in seconds, recorded in the fallback sidecar
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
    },

    /// Copy the audio of one file under the video of another
    Merge {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        audio_source: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract, downscale, filter and encode in one step
    Process {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, default_value = "sketch")]
        filter: String,
    },

    /// List the available filters
    Filters,

    /// Write the default configuration to a file
    Config {
        #[arg(short, long, default_value = "sketch-video.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting Sketch-Video v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    match &cli.command {
        Command::Filters => {
            let registry = FilterRegistry::new();
            for kind in FilterKind::ALL {
                if registry.has(kind.token()) {
                    println!("{:<18} {}", kind.token(), kind.description());
                }
            }
            return Ok(());
        }
        Command::Config { output } => {
            config.save_to_file(output)?;
            info!("Default configuration written to {:?}", output);
            return Ok(());
        }
        _ => {}
    }

    let frames = FfmpegCli::default();
    if !frames.check_available() {
        bail!("ffmpeg and ffprobe must be installed and on PATH");
    }
    let pipeline = VideoPipeline::new(config, Arc::new(frames), codec_backend()?);

    let (sink, mut events) = ChannelSink::channel();
    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("[{:>3.0}%] {}", event.progress * 100.0, event.status);
        }
    });
    let invocation = Invocation::new(sink);

    let ok = match cli.command {
        Command::Extract { input, output_dir, fps } => {
            let request = ExtractionRequest {
                source_path: input,
                output_directory: output_dir,
                target_fps: fps,
            };
            match pipeline.extract_frames(request, invocation).await {
                Some(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    true
                }
                None => false,
            }
        }
        Command::Filter { frames_dir, output, filter, fps, duration } => {
            let frame_paths = list_frames(&frames_dir)?;
            let request = FilterRequest {
                frame_count: frame_paths.len(),
                frame_paths,
                output_path: output,
                filter_type: filter,
                duration,
                target_fps: fps,
            };
            pipeline.apply_filter_to_frames(request, invocation).await
        }
        Command::Merge { video, audio_source, output } => {
            let request = AudioMergeRequest {
                video_path: video,
                audio_source_path: audio_source,
                output_path: output,
            };
            pipeline.merge_audio(request, invocation).await
        }
        Command::Process { input, output, filter } => {
            let request = ProcessRequest {
                input_path: input,
                output_path: output,
                filter_type: filter,
            };
            pipeline.process_video(request, invocation).await
        }
        Command::Filters | Command::Config { .. } => true,
    };

    // The invocation owned the last sender, so the listener drains and exits
    listener.await?;

    if !ok {
        bail!("operation failed, see the log for details");
    }
    Ok(())
}

/// JPEG files of `dir`, sorted by name
fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read frame directory {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(feature = "ffmpeg")]
fn codec_backend() -> Result<Arc<dyn CodecBackend>> {
    Ok(Arc::new(sketch_video::media::LibavBackend::new()?))
}

#[cfg(not(feature = "ffmpeg"))]
fn codec_backend() -> Result<Arc<dyn CodecBackend>> {
    Ok(Arc::new(unavailable::NoCodecs))
}

#[cfg(not(feature = "ffmpeg"))]
mod unavailable {
    use std::path::Path;

    use sketch_video::error::{EncodeError, MuxError};
    use sketch_video::media::backend::{CodecBackend, ContainerWriter, MediaSource, VideoEncoder};

    const REASON: &str = "built without the `ffmpeg` feature";

    /// Stand-in backend; extraction still works through the ffmpeg CLI
    pub struct NoCodecs;

    impl CodecBackend for NoCodecs {
        fn create_encoder(&self) -> Result<Box<dyn VideoEncoder>, EncodeError> {
            Err(EncodeError::Configure { reason: REASON.to_string() })
        }

        fn create_writer(&self, _output: &Path) -> Result<Box<dyn ContainerWriter>, MuxError> {
            Err(MuxError::Container { reason: REASON.to_string() })
        }

        fn open_source(&self, _path: &Path) -> Result<Box<dyn MediaSource>, MuxError> {
            Err(MuxError::Container { reason: REASON.to_string() })
        }
    }
}
