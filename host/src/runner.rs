//! The frame loop and its control channel
//!
//! One task owns the [`Pipeline`]. HTTP handlers talk to it through a
//! [`LoopHandle`]; commands are applied between frames, so pipeline state is never
//! shared across tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::error::AppError;
use crate::normalizer::Gains;
use crate::pipeline::{Pipeline, Settings, SettingsUpdate};
use crate::snapshot::SnapshotStore;
use crate::source::FrameSource;

/// A request for the frame loop, with a reply slot
pub enum ControlCommand {
    Calibrate(oneshot::Sender<Result<Gains, AppError>>),
    ResetCalibration(oneshot::Sender<Gains>),
    GetSettings(oneshot::Sender<Settings>),
    UpdateSettings(SettingsUpdate, oneshot::Sender<Result<Settings, AppError>>),
}

/// Sending side of the control channel
#[derive(Clone)]
pub struct LoopHandle {
    tx: mpsc::Sender<ControlCommand>,
}

pub fn control_channel(depth: usize) -> (LoopHandle, mpsc::Receiver<ControlCommand>) {
    let (tx, rx) = mpsc::channel(depth);
    (LoopHandle { tx }, rx)
}

impl LoopHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
    ) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| AppError::LoopUnavailable)?;
        reply_rx.await.map_err(|_| AppError::LoopUnavailable)
    }

    pub async fn calibrate(&self) -> Result<Gains, AppError> {
        self.request(ControlCommand::Calibrate).await?
    }

    pub async fn reset_calibration(&self) -> Result<Gains, AppError> {
        self.request(ControlCommand::ResetCalibration).await
    }

    pub async fn settings(&self) -> Result<Settings, AppError> {
        self.request(ControlCommand::GetSettings).await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, AppError> {
        self.request(|reply| ControlCommand::UpdateSettings(update, reply))
            .await?
    }
}

fn apply(pipeline: &mut Pipeline, command: ControlCommand) {
    // A dropped reply receiver only means the client went away
    match command {
        ControlCommand::Calibrate(reply) => {
            let _ = reply.send(pipeline.calibrate());
        }
        ControlCommand::ResetCalibration(reply) => {
            pipeline.reset_calibration();
            let _ = reply.send(pipeline.gains());
        }
        ControlCommand::GetSettings(reply) => {
            let _ = reply.send(pipeline.settings().clone());
        }
        ControlCommand::UpdateSettings(update, reply) => {
            let _ = reply.send(pipeline.update_settings(update));
        }
    }
}

/// Run the frame loop until `shutdown` resolves or the source fails
///
/// The actuator is always turned off before this returns.
pub async fn run<S>(
    mut pipeline: Pipeline,
    mut source: Box<dyn FrameSource>,
    mut commands: mpsc::Receiver<ControlCommand>,
    snapshot: Arc<SnapshotStore>,
    frame_interval: Duration,
    shutdown: S,
) -> Result<(), AppError>
where
    S: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let start = Instant::now();
    info!(
        "Frame loop started, actuator {}",
        if pipeline.actuator_connected() {
            "connected"
        } else {
            "disabled"
        }
    );

    let result = 'frames: loop {
        while let Ok(command) = commands.try_recv() {
            apply(&mut pipeline, command);
        }

        let frame = tokio::select! {
            _ = &mut shutdown => break 'frames Ok(()),
            frame = source.next_frame() => frame,
        };

        match frame {
            Ok(Some(frame)) => {
                let report = pipeline.process_frame(&frame, start.elapsed().as_secs_f64());
                snapshot.publish(report).await;
            }
            Ok(None) => {}
            Err(e) => {
                error!("Frame source failed: {}", e);
                break Err(e);
            }
        }

        let pause = tokio::time::sleep(pipeline.loop_delay().max(frame_interval));
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut shutdown => break 'frames Ok(()),
                _ = &mut pause => break,
                Some(command) = commands.recv() => apply(&mut pipeline, command),
            }
        }
    };

    info!("Frame loop stopping");
    pipeline.shutdown().await;
    result
}
