//! Bridge runtime
//!
//! Wires the protocol core to the outside world with two tokio tasks sharing
//! one [`ControllerState`]:
//!
//! ```text
//!                      ┌─────────────── Arc<Mutex<ControllerState>> ───────────────┐
//!                      │                                                           │
//! bus ─[BusEvent]→ FrameWorker ─[HidAction]→ HidOutput      KeepaliveScheduler (tick)
//!                      │                                                           │
//!                      └──────────────[RawFrame]→ FrameSender ←────────────────────┘
//! ```
//!
//! [`BridgeHandle`] owns both tasks, forwards [`BridgeCommand`]s and stops
//! everything through a shared `CancellationToken`.

pub mod frame_worker;
pub mod pipeline;
pub mod scheduler;

use crate::can::{BusEvent, FrameSender, RawFrame, TransportError};
use crate::config::{BridgeConfig, ConfigError};
use crate::controller::{ControllerState, Handshake, HandshakePhase};
use crate::hid::HidOutput;
use crate::input::joystick::JoystickMode;
use crate::input::HandlerCommand;
use frame_worker::FrameWorker;
use pipeline::FramePipeline;
use scheduler::KeepaliveScheduler;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Runtime reconfiguration requests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeCommand {
    SetJoystickMode(JoystickMode),
    SetRotaryEnabled(bool),
    SetLightEnabled(bool),
}

impl BridgeCommand {
    /// The part of the command the handler chain understands
    pub fn handler_command(self) -> Option<HandlerCommand> {
        match self {
            BridgeCommand::SetJoystickMode(mode) => Some(HandlerCommand::SetJoystickMode(mode)),
            BridgeCommand::SetRotaryEnabled(enabled) => {
                Some(HandlerCommand::SetRotaryEnabled(enabled))
            }
            BridgeCommand::SetLightEnabled(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("CAN bus channel closed")]
    BusClosed,

    #[error("Bridge command channel closed")]
    CommandChannelClosed,

    #[error("Bridge task failed: {0}")]
    Task(String),
}

/// Send every frame, logging failures.
///
/// Keeps going after a failed frame; the first error is returned once all
/// frames have been offered.
pub fn send_all(sender: &dyn FrameSender, frames: &[RawFrame]) -> Result<(), TransportError> {
    let mut first_error = None;
    for frame in frames {
        if let Err(e) = sender.send(frame) {
            warn!("Failed to send {}: {}", frame, e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

pub struct BridgeHandle {
    shared: Arc<Mutex<ControllerState>>,
    commands: mpsc::Sender<BridgeCommand>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

impl BridgeHandle {
    /// Validate `config` and start the frame worker and keepalive scheduler.
    ///
    /// The worker consumes `bus` until it closes; closing it stops the whole
    /// bridge.
    pub fn spawn<T, H>(
        config: &BridgeConfig,
        bus: mpsc::Receiver<BusEvent>,
        sender: T,
        hid: H,
    ) -> Result<Self, BridgeError>
    where
        T: FrameSender,
        H: HidOutput,
    {
        config.validate()?;
        info!("Spawning bridge with handshake settings: {:?}", config.handshake);

        let shared = Arc::new(Mutex::new(ControllerState::new(config.light.enabled)));
        let sender: Arc<dyn FrameSender> = Arc::new(sender);
        let cancel = CancellationToken::new();
        let (command_sender, command_receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        debug!(
            "Created command channel with buffer capacity {}",
            COMMAND_CHANNEL_CAPACITY
        );

        let worker = FrameWorker::create(
            bus,
            command_receiver,
            Arc::clone(&shared),
            FramePipeline::from_config(config),
            Arc::clone(&sender),
            Box::new(hid),
            config.handshake.rx_timeout(),
        );
        let worker_cancel = cancel.clone();
        let worker = tokio::spawn(async move {
            info!("Frame worker task started");
            if let Err(e) = frame_worker::run_worker_loop(worker, worker_cancel.clone()).await {
                error!("Frame worker terminated with error: {}", e);
            } else {
                info!("Frame worker finished");
            }
            worker_cancel.cancel();
        });

        let scheduler = KeepaliveScheduler::create(
            Handshake::new(config.handshake.clone()),
            Arc::clone(&shared),
            sender,
        );
        let scheduler = tokio::spawn(scheduler::run_scheduler_loop(scheduler, cancel.clone()));

        info!("Bridge started");
        Ok(Self {
            shared,
            commands: command_sender,
            cancel,
            worker,
            scheduler,
        })
    }

    pub async fn command(&self, command: BridgeCommand) -> Result<(), BridgeError> {
        debug!("Queueing bridge command {:?}", command);
        self.commands
            .send(command)
            .await
            .map_err(|_| BridgeError::CommandChannelClosed)
    }

    /// Copy of the current controller state
    pub async fn snapshot(&self) -> ControllerState {
        self.shared.lock().await.clone()
    }

    pub async fn phase(&self) -> HandshakePhase {
        self.shared.lock().await.phase()
    }

    /// Cancelled once the bridge stops, for whatever reason
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn shutdown(self) -> Result<(), BridgeError> {
        info!("Shutting down bridge");
        self.cancel.cancel();
        let (worker, scheduler) = tokio::join!(self.worker, self.scheduler);
        worker.map_err(|e| BridgeError::Task(format!("frame worker: {}", e)))?;
        scheduler.map_err(|e| BridgeError::Task(format!("keepalive scheduler: {}", e)))?;
        info!("Bridge stopped");
        Ok(())
    }
}
