//! # Progress Reporting
//!
//! Progress is an injected capability: each pipeline call receives its own
//! [`ProgressSink`], so concurrent invocations never share listener state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A single progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Overall completion in `[0, 1]`
    pub progress: f64,
    /// Human readable status line
    pub status: String,
}

impl ProgressEvent {
    pub fn new<S: Into<String>>(progress: f64, status: S) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            status: status.into(),
        }
    }
}

/// Receives fractional progress and a status message.
///
/// Delivery is best-effort: implementations must never fail the pipeline.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: f64, status: &str);
}

/// Sink used when no listener is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, progress: f64, status: &str) {
        debug!("progress {:.2} (no listener): {}", progress, status);
    }
}

/// Forwards events to at most one listener over an unbounded channel.
///
/// The sink disables itself the first time delivery fails (listener gone).
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    active: AtomicBool,
}

impl ChannelSink {
    /// Create a sink together with the receiving end for the listener
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            sender,
            active: AtomicBool::new(true),
        });
        (sink, receiver)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, progress: f64, status: &str) {
        if !self.is_active() {
            return;
        }
        if self.sender.send(ProgressEvent::new(progress, status)).is_err() {
            warn!("Progress listener detached, disabling progress updates");
            self.active.store(false, Ordering::Release);
        }
    }
}

/// Counts completed items and reports every `every`-th one as a share of
/// `[base, base + weight]`.
pub struct StageProgress<'a> {
    sink: &'a dyn ProgressSink,
    label: &'static str,
    total: usize,
    every: usize,
    base: f64,
    weight: f64,
    done: AtomicUsize,
}

impl<'a> StageProgress<'a> {
    pub fn new(sink: &'a dyn ProgressSink, label: &'static str, total: usize) -> Self {
        Self {
            sink,
            label,
            total: total.max(1),
            every: 1,
            base: 0.0,
            weight: 1.0,
            done: AtomicUsize::new(0),
        }
    }

    pub fn every(mut self, every: usize) -> Self {
        self.every = every.max(1);
        self
    }

    pub fn span(mut self, base: f64, weight: f64) -> Self {
        self.base = base;
        self.weight = weight;
        self
    }

    /// Record one completed item; safe to call from any worker thread
    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        if done % self.every == 0 {
            let stage_fraction = done as f64 / self.total as f64;
            let percentage = (stage_fraction * 100.0).round() as u32;
            self.sink.report(
                self.base + stage_fraction * self.weight,
                &format!("{}... {}%", self.label, percentage),
            );
        }
    }

    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[tokio::test]
    async fn test_channel_sink_delivers_events() {
        let (sink, mut receiver) = ChannelSink::channel();
        sink.report(0.5, "halfway");

        let event = receiver.recv().await.unwrap();
        assert_eq!(event, ProgressEvent::new(0.5, "halfway"));
        assert!(sink.is_active());
    }

    #[test]
    fn test_channel_sink_disables_when_listener_dropped() {
        let (sink, receiver) = ChannelSink::channel();
        drop(receiver);

        sink.report(0.1, "nobody listening");
        assert!(!sink.is_active());
        // Further reports are silently dropped
        sink.report(0.2, "still nobody");
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(ProgressEvent::new(1.7, "x").progress, 1.0);
        assert_eq!(ProgressEvent::new(-0.2, "x").progress, 0.0);
    }

    #[test]
    fn test_stage_progress_cadence() {
        let sink = RecordingSink::default();
        let stage = StageProgress::new(&sink, "Extracting frames", 9)
            .every(3)
            .span(0.0, 0.3);

        for _ in 0..9 {
            stage.tick();
        }

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!((events[2].progress - 0.3).abs() < 1e-9);
        assert_eq!(events[2].status, "Extracting frames... 100%");
        assert_eq!(stage.completed(), 9);
    }
}
