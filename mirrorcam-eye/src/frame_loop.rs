//! Drives the pipeline frame by frame until a capture is dispatched

use crate::capture::{CaptureController, CaptureEvent, CaptureState};
use crate::config::FrameLoopConfig;
use crate::dispatch::DispatchOutcome;
use crate::error::VisionError;
use crate::pipeline::DetectionPipeline;
use crate::source::FrameSource;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// A crop was dispatched; holds the analysis outcome.
    Dispatched(DispatchOutcome),
    /// The source ran out without a capture.
    SourceExhausted,
    /// `max_frames` was reached without a capture.
    FrameLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub dropped: u64,
    pub exit: LoopExit,
}

pub struct FrameLoop {
    pipeline: DetectionPipeline,
    controller: CaptureController,
    config: FrameLoopConfig,
}

impl FrameLoop {
    pub fn new(
        pipeline: DetectionPipeline,
        controller: CaptureController,
        config: FrameLoopConfig,
    ) -> Self {
        Self {
            pipeline,
            controller,
            config,
        }
    }

    pub fn controller(&self) -> &CaptureController {
        &self.controller
    }

    /// Processes frames one at a time until the session dispatches, the
    /// source ends, or the frame limit is hit.
    ///
    /// Frames that cannot be preprocessed are dropped after a short pause.
    /// Inference failures count as frames without detections. Other errors
    /// end the loop.
    pub async fn run<S>(&self, source: &mut S) -> Result<LoopSummary, VisionError>
    where
        S: FrameSource + ?Sized,
    {
        let mut frames = 0u64;
        let mut dropped = 0u64;

        loop {
            if self.controller.is_terminal() {
                if let Some(outcome) = self.controller.wait_for_outcome().await {
                    return Ok(self.finish(frames, dropped, LoopExit::Dispatched(outcome)));
                }
                // reset while waiting
                continue;
            }

            if let Some(max) = self.config.max_frames {
                if frames >= max {
                    let exit = self.drain(LoopExit::FrameLimit).await;
                    return Ok(self.finish(frames, dropped, exit));
                }
            }

            let generation = self.controller.generation();
            let frame = match source.next_frame().await? {
                Some(frame) => frame,
                None => {
                    let exit = self.drain(LoopExit::SourceExhausted).await;
                    return Ok(self.finish(frames, dropped, exit));
                }
            };
            frames += 1;

            match self.pipeline.process_frame(&frame).await {
                Ok(crops) => {
                    debug!("Frame {}: {} crops", frames, crops.len());
                    self.controller.observe(generation, &crops);
                }
                Err(VisionError::InvalidFrame { width, height }) => {
                    warn!("Dropping invalid {}x{} frame", width, height);
                    dropped += 1;
                    tokio::time::sleep(self.config.not_ready_backoff()).await;
                }
                Err(e) if e.is_frame_local() => {
                    warn!("Inference failed, treating frame as empty: {}", e);
                    self.controller.observe(generation, &[]);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// No more frames will be fed. An armed window still runs out and its
    /// winner is dispatched; otherwise the loop ends with `idle_exit`.
    async fn drain(&self, idle_exit: LoopExit) -> LoopExit {
        let mut events = self.controller.subscribe();
        while self.controller.state() == CaptureState::Armed {
            match events.recv().await {
                Ok(CaptureEvent::Finalized { .. })
                | Ok(CaptureEvent::WindowExpired { .. })
                | Ok(CaptureEvent::Reset { .. }) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }

        if self.controller.is_terminal() {
            if let Some(outcome) = self.controller.wait_for_outcome().await {
                return LoopExit::Dispatched(outcome);
            }
        }
        idle_exit
    }

    fn finish(&self, frames: u64, dropped: u64, exit: LoopExit) -> LoopSummary {
        info!(
            "Frame loop finished after {} frames ({} dropped): {:?}",
            frames, dropped, exit
        );
        LoopSummary {
            frames,
            dropped,
            exit,
        }
    }
}
