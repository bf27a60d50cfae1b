//! Frame worker
//!
//! Waits for bus traffic (bounded by the rx timeout), drains everything that
//! is pending and runs it through the [`FramePipeline`] under the state lock.
//! Outbound frames and HID actions are only submitted after the lock has been
//! released; rotary pacing pauses happen here as well.

use super::pipeline::FramePipeline;
use super::{send_all, BridgeCommand, BridgeError};
use crate::can::{BusEvent, FrameSender, RawFrame};
use crate::controller::ControllerState;
use crate::hid::HidOutput;
use crate::input::ActionBuffer;
use crate::protocol::commands;
use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Everything drained from the inbound channels in one cycle
#[derive(Debug, Clone, Default)]
pub struct FrameBatch {
    pub events: Vec<BusEvent>,
    pub commands: Vec<BridgeCommand>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    pub cycles: u64,
    pub frames: u64,
    pub events: u64,
    pub dispatched: u64,
    pub actions: u64,
    pub alerts: u64,
    pub tx_failures: u64,
    pub hid_failures: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Waiting,
    Dispatching(FrameBatch),
}

#[machine]
pub struct FrameWorker<S: WorkerState> {
    bus: mpsc::Receiver<BusEvent>,
    commands: mpsc::Receiver<BridgeCommand>,
    // false once the handle dropped its command sender
    commands_open: bool,
    shared: Arc<Mutex<ControllerState>>,
    pipeline: FramePipeline,
    sender: Arc<dyn FrameSender>,
    hid: Box<dyn HidOutput>,
    rx_timeout: Duration,
    stats: WorkerStats,
}

impl<S: WorkerState> FrameWorker<S> {
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    fn take_stats(&mut self) -> WorkerStats {
        std::mem::take(&mut self.stats)
    }
}

enum Wake {
    Command(Option<BridgeCommand>),
    Bus(Option<BusEvent>),
    Timeout,
}

impl FrameWorker<Waiting> {
    pub fn create(
        bus: mpsc::Receiver<BusEvent>,
        commands: mpsc::Receiver<BridgeCommand>,
        shared: Arc<Mutex<ControllerState>>,
        pipeline: FramePipeline,
        sender: Arc<dyn FrameSender>,
        hid: Box<dyn HidOutput>,
        rx_timeout: Duration,
    ) -> Self {
        info!(
            "Creating frame worker with {} ms rx timeout",
            rx_timeout.as_millis()
        );
        Self::new(
            bus,
            commands,
            true,
            shared,
            pipeline,
            sender,
            hid,
            rx_timeout,
            WorkerStats::default(),
        )
    }

    /// Block until bus traffic, a command or the rx timeout, then drain
    /// whatever else is already queued.
    pub async fn wait_and_collect(mut self) -> Result<FrameWorker<Dispatching>, BridgeError> {
        let mut batch = FrameBatch::default();

        let wake = tokio::select! {
            command = self.commands.recv(), if self.commands_open => Wake::Command(command),
            event = tokio::time::timeout(self.rx_timeout, self.bus.recv()) => match event {
                Ok(event) => Wake::Bus(event),
                Err(_) => Wake::Timeout,
            },
        };

        match wake {
            Wake::Command(Some(command)) => batch.commands.push(command),
            Wake::Command(None) => {
                debug!("Command channel closed, ignoring further commands");
                self.commands_open = false;
            }
            Wake::Bus(Some(event)) => batch.events.push(event),
            Wake::Bus(None) => return Err(BridgeError::BusClosed),
            Wake::Timeout => trace!("No bus traffic within {:?}", self.rx_timeout),
        }

        loop {
            match self.bus.try_recv() {
                Ok(event) => batch.events.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                // reported by the next blocking receive
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }
        }
        while self.commands_open {
            match self.commands.try_recv() {
                Ok(command) => batch.commands.push(command),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => self.commands_open = false,
            }
        }

        if !batch.events.is_empty() {
            trace!("Collected batch of {} bus events", batch.events.len());
        }
        Ok(self.transition_with(batch))
    }
}

impl FrameWorker<Dispatching> {
    /// Apply the collected batch and go back to waiting
    pub async fn dispatch(mut self) -> Result<FrameWorker<Waiting>, BridgeError> {
        let batch = match self.get_state_data() {
            Some(batch) => batch.clone(),
            None => {
                warn!("No batch in state data, this should not happen");
                FrameBatch::default()
            }
        };
        self.stats.cycles += 1;

        for command in &batch.commands {
            self.apply_command(*command).await;
        }

        let hid_connected = self.hid.is_connected();
        let mut actions = ActionBuffer::new();
        let mut outbound: Vec<RawFrame> = Vec::new();
        {
            let shared = Arc::clone(&self.shared);
            let mut state = shared.lock().await;
            for event in &batch.events {
                match event {
                    BusEvent::Frame(frame) => {
                        self.stats.frames += 1;
                        let processed = self.pipeline.process(
                            frame,
                            &mut state,
                            hid_connected,
                            Instant::now(),
                            &mut actions,
                        );
                        if processed.event.is_some() {
                            self.stats.events += 1;
                        }
                        if processed.dispatched {
                            self.stats.dispatched += 1;
                        }
                        outbound.extend(processed.outbound);
                    }
                    BusEvent::Alert(alert) => {
                        self.stats.alerts += 1;
                        warn!("CAN bus alert: {}", alert);
                    }
                }
            }
        }

        if send_all(self.sender.as_ref(), &outbound).is_err() {
            self.stats.tx_failures += 1;
        }

        for emission in actions.drain() {
            match self.hid.apply(&emission.action) {
                Ok(()) => self.stats.actions += 1,
                Err(e) => {
                    self.stats.hid_failures += 1;
                    warn!("HID {} failed: {}", emission.action, e);
                }
            }
            if !emission.pause_after.is_zero() {
                tokio::time::sleep(emission.pause_after).await;
            }
        }

        Ok(self.transition())
    }

    async fn apply_command(&mut self, command: BridgeCommand) {
        info!("Applying bridge command {:?}", command);
        if let Some(handler_command) = command.handler_command() {
            self.pipeline.reconfigure(&handler_command);
            return;
        }
        if let BridgeCommand::SetLightEnabled(enabled) = command {
            self.shared.lock().await.set_light_enabled(enabled);
            if send_all(self.sender.as_ref(), &[commands::light(enabled)]).is_err() {
                self.stats.tx_failures += 1;
            }
        }
    }
}

/// Drive the worker until the bus closes or `cancel` fires.
pub async fn run_worker_loop(
    mut worker: FrameWorker<Waiting>,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    info!("Entering frame worker loop");
    loop {
        let collected = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Frame worker cancelled");
                return Ok(());
            }
            collected = worker.wait_and_collect() => collected,
        };
        let collected = match collected {
            Ok(collected) => collected,
            Err(BridgeError::BusClosed) => {
                info!("CAN bus channel closed, frame worker stopping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        worker = collected.dispatch().await?;

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
            let stats = worker.take_stats();
            info!(
                "Frame worker stats: {} frames, {} events, {} dispatched, {} HID actions in {} seconds",
                stats.frames, stats.events, stats.dispatched, stats.actions, elapsed_seconds
            );
            info!(
                "Average: {:.2} frames/sec over {} cycles, {} alerts, {} tx failures, {} HID failures",
                stats.frames as f64 / elapsed_seconds as f64,
                stats.cycles,
                stats.alerts,
                stats.tx_failures,
                stats.hid_failures
            );
            last_stats_time = now;
        }
    }
}
