//! Keepalive scheduler
//!
//! Ticks at a fixed period, lets [`Handshake`] decide which frames are due and
//! sends them once the state lock is released.

use super::send_all;
use crate::can::{FrameSender, RawFrame};
use crate::controller::{ControllerState, Handshake, HandshakePhase};
use statum::{machine, state};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum SchedulerState {
    Starting,
    Ticking,
}

#[machine]
pub struct KeepaliveScheduler<S: SchedulerState> {
    handshake: Handshake,
    shared: Arc<Mutex<ControllerState>>,
    sender: Arc<dyn FrameSender>,
    last_phase: HandshakePhase,
    // batches with at least one frame the transport refused
    tx_failures: u64,
}

impl<S: SchedulerState> KeepaliveScheduler<S> {
    pub fn tx_failures(&self) -> u64 {
        self.tx_failures
    }

    fn send(&mut self, frames: &[RawFrame]) {
        if send_all(self.sender.as_ref(), frames).is_err() {
            self.tx_failures += 1;
        }
    }
}

impl KeepaliveScheduler<Starting> {
    pub fn create(
        handshake: Handshake,
        shared: Arc<Mutex<ControllerState>>,
        sender: Arc<dyn FrameSender>,
    ) -> Self {
        debug!(
            "Creating keepalive scheduler with {} ms tick",
            handshake.settings().tick_ms
        );
        Self::new(handshake, shared, sender, HandshakePhase::Uninitialized, 0)
    }

    /// Send the rotary init and light command
    pub async fn start(mut self) -> KeepaliveScheduler<Ticking> {
        let frames = {
            let mut state = self.shared.lock().await;
            let frames = self.handshake.start(&mut state, Instant::now());
            self.last_phase = state.phase();
            frames
        };
        self.send(&frames);
        self.transition()
    }
}

impl KeepaliveScheduler<Ticking> {
    /// One timer step; returns the phase after it
    pub async fn tick(&mut self) -> HandshakePhase {
        let (frames, phase) = {
            let mut state = self.shared.lock().await;
            let frames = self.handshake.tick(&mut state, Instant::now());
            (frames, state.phase())
        };
        if !frames.is_empty() {
            debug!("Keepalive tick sending {} frames", frames.len());
            self.send(&frames);
        }
        if phase != self.last_phase {
            info!("Handshake phase {} -> {}", self.last_phase, phase);
            self.last_phase = phase;
        }
        phase
    }
}

pub async fn run_scheduler_loop(
    scheduler: KeepaliveScheduler<Starting>,
    cancel: CancellationToken,
) {
    let tick = scheduler.handshake.settings().tick();
    let mut scheduler = scheduler.start().await;

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick fires immediately and the handshake just started
    interval.tick().await;

    info!("Entering keepalive loop with {} ms tick", tick.as_millis());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if scheduler.tx_failures() > 0 {
                    warn!(
                        "Keepalive scheduler cancelled, {} send batches failed",
                        scheduler.tx_failures()
                    );
                } else {
                    info!("Keepalive scheduler cancelled");
                }
                return;
            }
            _ = interval.tick() => {
                scheduler.tick().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::{ChannelFrameSender, RawFrame};
    use crate::controller::HandshakeSettings;
    use crate::protocol::{can_id, commands};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn scheduler(
        settings: HandshakeSettings,
    ) -> (
        KeepaliveScheduler<Starting>,
        Arc<Mutex<ControllerState>>,
        mpsc::Receiver<RawFrame>,
    ) {
        let (sender, frames) = ChannelFrameSender::new(1024);
        let shared = Arc::new(Mutex::new(ControllerState::new(true)));
        let scheduler =
            KeepaliveScheduler::create(Handshake::new(settings), Arc::clone(&shared), Arc::new(sender));
        (scheduler, shared, frames)
    }

    fn drain(frames: &mut mpsc::Receiver<RawFrame>) -> Vec<RawFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            out.push(frame);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn start_sends_init_then_light() {
        let (scheduler, shared, mut frames) = scheduler(HandshakeSettings::default());
        let scheduler = scheduler.start().await;
        assert_eq!(
            drain(&mut frames),
            vec![commands::rotary_init(), commands::light(true)]
        );
        assert_eq!(scheduler.last_phase, HandshakePhase::RotaryInitPending);
        assert_eq!(shared.lock().await.phase(), HandshakePhase::RotaryInitPending);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_frames_are_counted() {
        let (sender, mut frames) = ChannelFrameSender::new(1);
        let shared = Arc::new(Mutex::new(ControllerState::new(true)));
        let scheduler = KeepaliveScheduler::create(
            Handshake::new(HandshakeSettings::default()),
            shared,
            Arc::new(sender),
        );

        // init fits, the light command does not
        let mut scheduler = scheduler.start().await;
        assert_eq!(scheduler.tx_failures(), 1);
        assert_eq!(drain(&mut frames), vec![commands::rotary_init()]);

        tokio::time::advance(Duration::from_millis(10)).await;
        scheduler.tick().await;
        assert_eq!(scheduler.tx_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_polls_until_cancelled() {
        let (scheduler, _shared, mut frames) = scheduler(HandshakeSettings::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_scheduler_loop(scheduler, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1_015)).await;
        cancel.cancel();
        task.await.unwrap();

        let sent = drain(&mut frames);
        let polls = sent.iter().filter(|f| f.id == can_id::POLL).count();
        // 10, 510 and 1010 ms
        assert_eq!(polls, 3);
        assert_eq!(sent[0], commands::rotary_init());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_reports_phase_changes() {
        let (scheduler, shared, _frames) = scheduler(HandshakeSettings::default());
        let mut scheduler = scheduler.start().await;

        assert_eq!(scheduler.tick().await, HandshakePhase::RotaryInitPending);

        // the router flips this in production
        let mut state = shared.lock().await;
        let router = crate::controller::FrameRouter::new(Default::default(), 0);
        router.route(&RawFrame::new(0x277, &[]), &mut state, Instant::now());
        drop(state);

        assert_eq!(scheduler.tick().await, HandshakePhase::Cooldown);
        tokio::time::advance(Duration::from_millis(750)).await;
        assert_eq!(scheduler.tick().await, HandshakePhase::Ready);
        assert_eq!(scheduler.last_phase, HandshakePhase::Ready);
    }
}
