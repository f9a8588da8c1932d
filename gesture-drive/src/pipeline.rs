//! Frame pipeline
//!
//! [`GesturePipeline`] runs one frame through mode update, classification and
//! dispatch. [`PipelineHandle`] moves a pipeline into a single tokio task so
//! that frames and debounce releases are serialized through one mailbox; the
//! mode state never needs a lock.

use crate::classifier::{ClassifierConfig, Command, GestureClassifier};
use crate::dispatcher::CommandSink;
use crate::landmarks::LandmarkFrame;
use crate::mode::{ModeChange, ModeController, OperatingMode, ToggleConfig};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline task has stopped")]
    Closed,

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of handling one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No person in the frame; nothing updated, nothing sent
    Skipped,

    Processed {
        command: Command,
        mode_change: Option<ModeChange>,
    },
}

/// Pipeline statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub commands_sent: u64,
    pub mode_changes: u64,
    pub mode: OperatingMode,
}

/// Mode controller, classifier and command sink wired in order
pub struct GesturePipeline<S: CommandSink> {
    controller: ModeController,
    classifier: GestureClassifier,
    sink: S,
    stats: PipelineStats,
}

impl<S: CommandSink> GesturePipeline<S> {
    pub fn new(toggle: ToggleConfig, classifier: ClassifierConfig, sink: S) -> Self {
        Self {
            controller: ModeController::with_config(toggle),
            classifier: GestureClassifier::new(classifier),
            sink,
            stats: PipelineStats::default(),
        }
    }

    /// Process one frame captured at `now`
    pub fn handle_frame(&mut self, frame: &LandmarkFrame, now: Instant) -> FrameOutcome {
        if frame.is_empty() {
            debug!("No landmarks detected, frame skipped");
            self.stats.frames_skipped += 1;
            return FrameOutcome::Skipped;
        }

        let mode_change = self.controller.update(frame, now);
        if mode_change.is_some() {
            self.stats.mode_changes += 1;
        }

        let mode = self.controller.mode();
        self.stats.mode = mode;
        self.stats.frames_processed += 1;

        let Some(command) = self.classifier.classify(frame, mode) else {
            return FrameOutcome::Skipped;
        };

        debug!("mode={} command={}", mode, command);
        self.sink.send(&command);
        self.stats.commands_sent += 1;

        FrameOutcome::Processed {
            command,
            mode_change,
        }
    }

    /// Clear the toggle debounce guard
    pub fn release_guard(&mut self) {
        self.controller.release_guard();
    }

    pub fn mode(&self) -> OperatingMode {
        self.controller.mode()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

enum PipelineMessage {
    Frame { frame: LandmarkFrame, at: Instant },
    ReleaseGuard,
    Stats(oneshot::Sender<PipelineStats>),
}

/// Handle to a pipeline running on its own task
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineMessage>,
    mode_rx: watch::Receiver<OperatingMode>,
    task: JoinHandle<PipelineStats>,
}

impl PipelineHandle {
    /// Spawn the pipeline onto the current tokio runtime
    pub fn spawn<S>(pipeline: GesturePipeline<S>) -> Self
    where
        S: CommandSink + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (mode_tx, mode_rx) = watch::channel(pipeline.mode());

        let timer_tx = tx.downgrade();
        let task = tokio::spawn(run_pipeline(pipeline, rx, timer_tx, mode_tx));

        info!("Gesture pipeline started");

        Self { tx, mode_rx, task }
    }

    /// Queue a frame for processing. Never blocks.
    pub fn submit(&self, frame: LandmarkFrame, at: Instant) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineMessage::Frame { frame, at })
            .map_err(|_| PipelineError::Closed)
    }

    /// Watch the operating mode (status display feed)
    pub fn subscribe_mode(&self) -> watch::Receiver<OperatingMode> {
        self.mode_rx.clone()
    }

    pub fn mode(&self) -> OperatingMode {
        *self.mode_rx.borrow()
    }

    /// Statistics as of all frames submitted before this call
    pub async fn stats(&self) -> Result<PipelineStats, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineMessage::Stats(reply_tx))
            .map_err(|_| PipelineError::Closed)?;
        reply_rx.await.map_err(|_| PipelineError::Closed)
    }

    /// Drain queued frames, stop the task and return final statistics
    pub async fn shutdown(self) -> Result<PipelineStats, PipelineError> {
        let Self { tx, task, .. } = self;
        drop(tx);
        Ok(task.await?)
    }
}

async fn run_pipeline<S: CommandSink>(
    mut pipeline: GesturePipeline<S>,
    mut rx: mpsc::UnboundedReceiver<PipelineMessage>,
    timer_tx: mpsc::WeakUnboundedSender<PipelineMessage>,
    mode_tx: watch::Sender<OperatingMode>,
) -> PipelineStats {
    while let Some(message) = rx.recv().await {
        match message {
            PipelineMessage::Frame { frame, at } => {
                if let FrameOutcome::Processed {
                    mode_change: Some(change),
                    ..
                } = pipeline.handle_frame(&frame, at)
                {
                    mode_tx.send_replace(change.to);
                    schedule_release(timer_tx.clone(), change);
                }
            }

            PipelineMessage::ReleaseGuard => pipeline.release_guard(),

            PipelineMessage::Stats(reply) => {
                let _ = reply.send(pipeline.stats());
            }
        }
    }

    info!("Gesture pipeline stopped");
    pipeline.stats()
}

/// Post a guard release back into the pipeline mailbox after the cool-down
fn schedule_release(timer_tx: mpsc::WeakUnboundedSender<PipelineMessage>, change: ModeChange) {
    tokio::spawn(async move {
        tokio::time::sleep(change.release_after).await;

        match timer_tx.upgrade() {
            Some(tx) => {
                if tx.send(PipelineMessage::ReleaseGuard).is_err() {
                    error!("Pipeline closed before debounce release");
                }
            }
            None => debug!("Pipeline gone, debounce release skipped"),
        }
    });
}
