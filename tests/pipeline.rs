//! End-to-end runs against the real ffmpeg tools and libav bindings.

#![cfg(feature = "ffmpeg")]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use sketch_video::config::Config;
use sketch_video::media::backend::{CodecBackend, FrameSource};
use sketch_video::media::{FfmpegCli, LibavBackend, TrackRole};
use sketch_video::pipeline::{AudioMergeRequest, ExtractionRequest, FilterRequest, Invocation, VideoPipeline};
use tempfile::tempdir;

/// Two seconds of 10 fps test pattern with a sine tone
fn make_clip(path: &Path) -> bool {
    Command::new("ffmpeg")
        .args(["-v", "error", "-y"])
        .args(["-f", "lavfi", "-i", "testsrc=size=64x48:rate=10:duration=2"])
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=2"])
        .args(["-c:v", "mpeg4", "-c:a", "aac", "-shortest"])
        .arg(path)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn pipeline(temp_root: &Path) -> VideoPipeline {
    let mut config = Config::default();
    config.workspace.temp_root = temp_root.to_path_buf();
    config.encoder.still_fallback = false;
    VideoPipeline::new(
        config,
        Arc::new(FfmpegCli::default()),
        Arc::new(LibavBackend::new().unwrap()),
    )
}

#[tokio::test]
async fn test_extract_filter_encode_and_merge() {
    let cli = FfmpegCli::default();
    if !cli.check_available() {
        eprintln!("ffmpeg not available, skipping");
        return;
    }

    let dir = tempdir().unwrap();
    let clip = dir.path().join("clip.mp4");
    assert!(make_clip(&clip));
    let pipeline = pipeline(&dir.path().join("tmp"));

    let extraction = pipeline
        .extract_frames(
            ExtractionRequest {
                source_path: clip.clone(),
                output_directory: dir.path().join("frames"),
                target_fps: 5.0,
            },
            Invocation::detached(),
        )
        .await
        .unwrap();
    assert!(extraction.frame_count > 0 && extraction.frame_count <= 10);
    assert!((extraction.duration - 2.0).abs() < 0.2);

    let filtered = dir.path().join("filtered.mp4");
    let ok = pipeline
        .apply_filter_to_frames(
            FilterRequest {
                frame_paths: extraction.frame_paths.clone(),
                output_path: filtered.clone(),
                filter_type: "identity".to_string(),
                frame_count: extraction.frame_count,
                duration: extraction.duration,
                target_fps: 5.0,
            },
            Invocation::detached(),
        )
        .await;
    assert!(ok);

    let encoded = cli.probe(&filtered).unwrap();
    assert_eq!((encoded.width, encoded.height), (64, 48));
    assert!(!encoded.has_audio);
    assert!((encoded.duration_seconds - 2.0).abs() <= 0.2, "duration {}", encoded.duration_seconds);

    // Identity filtering keeps every extracted frame
    assert_eq!(count_samples(&filtered, TrackRole::Video), extraction.frame_count);

    let merged = dir.path().join("final.mp4");
    let ok = pipeline
        .merge_audio(
            AudioMergeRequest {
                video_path: filtered,
                audio_source_path: clip,
                output_path: merged.clone(),
            },
            Invocation::detached(),
        )
        .await;
    assert!(ok);
    assert!(cli.probe(&merged).unwrap().has_audio);
    assert_eq!(count_samples(&merged, TrackRole::Video), extraction.frame_count);
}

#[test]
fn test_source_tracks_describe_streams() {
    if !FfmpegCli::default().check_available() {
        eprintln!("ffmpeg not available, skipping");
        return;
    }

    let dir = tempdir().unwrap();
    let clip = dir.path().join("clip.mp4");
    assert!(make_clip(&clip));

    let source = LibavBackend::new().unwrap().open_source(&clip).unwrap();
    let video = source.tracks().iter().find(|t| t.role == TrackRole::Video).unwrap();
    assert_eq!((video.width, video.height), (64, 48));
    assert!((video.frame_rate - 10.0).abs() < 0.01);

    let audio = source.tracks().iter().find(|t| t.role == TrackRole::Audio).unwrap();
    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.channels, 1);
}

fn count_samples(path: &Path, role: TrackRole) -> usize {
    let mut source = LibavBackend::new().unwrap().open_source(path).unwrap();
    let track = source.tracks().iter().position(|t| t.role == role).unwrap();
    source.select_track(track).unwrap();
    std::iter::from_fn(|| source.read_sample().unwrap()).count()
}
