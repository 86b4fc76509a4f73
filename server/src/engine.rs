//! Lifecycle controller for a single match
//!
//! `Engine` is the only surface the display layer talks to. It owns:
//! - The shared match context (roster, clock, phase, outbound queue)
//! - The event queue fed by the hit listener
//! - The background tasks spawned by `start`
//!
//! Hits are never applied behind the caller's back: they wait in the event
//! queue until `drain_pending_events` runs them through the rule engine, so
//! score changes happen on the caller's schedule.

use crate::clock::{run_announcer, run_clock};
use crate::config::{parse_destination, MatchConfig};
use crate::error::EngineError;
use crate::game::{Phase, Scoreboard};
use crate::network::{run_egress, run_ingress, MatchContext, Sockets};
use crate::rules;
use log::{debug, error, info, warn};
use photon_shared::{encode_registration, HitEvent, Player};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Engine {
    ctx: Arc<MatchContext>,
    events_tx: mpsc::UnboundedSender<HitEvent>,
    events_rx: mpsc::UnboundedReceiver<HitEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new(config: MatchConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            ctx: Arc::new(MatchContext::new(config)),
            events_tx,
            events_rx,
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.ctx.config
    }

    /// Opens the sockets and starts the match
    ///
    /// Does nothing if the match is already running. Bind failures are
    /// returned before any task is spawned. A finished match has to be
    /// `reset` before it can start again.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        match self.phase().await {
            Phase::Running => return Ok(()),
            Phase::Stopped => return Err(EngineError::MatchFinished),
            Phase::Idle => {}
        }
        // The last match may still be releasing its sockets.
        self.wait_stopped().await;

        let sockets = {
            let mut state = self.ctx.state.write().await;
            match state.phase() {
                Phase::Running => return Ok(()),
                Phase::Stopped => return Err(EngineError::MatchFinished),
                Phase::Idle => {}
            }

            let destination = self.ctx.destination().await;
            let sockets = Sockets::bind(self.ctx.config.bind_addr, destination).await?;
            state.begin();
            sockets
        };

        self.ctx.set_running(true);
        let recv = Arc::clone(&sockets.recv);
        let send = Arc::clone(&sockets.send);
        self.ctx.install_sockets(sockets).await;

        self.tasks.push(tokio::spawn(run_ingress(
            Arc::clone(&self.ctx),
            recv,
            self.events_tx.clone(),
            self.ctx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(run_egress(
            Arc::clone(&self.ctx),
            send,
            self.ctx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(run_clock(
            Arc::clone(&self.ctx),
            self.ctx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(run_announcer(
            Arc::clone(&self.ctx),
            self.ctx.subscribe(),
        )));

        info!(
            "Match started, sending to {}",
            self.ctx.destination().await
        );
        Ok(())
    }

    /// Ends the match early
    ///
    /// Returns false if the match was not running. Otherwise the stop code
    /// goes out three times and the sockets are released.
    pub async fn stop(&mut self) -> bool {
        let stopped = self.ctx.finish_match().await;
        if stopped {
            info!("Match stopped");
        }
        stopped
    }

    /// Waits for the background tasks of the last match to exit
    ///
    /// While the match is still running this waits for the clock to expire.
    pub async fn wait_stopped(&mut self) {
        for handle in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                error!("Engine task panicked: {}", e);
            }
        }
    }

    /// Adds a player and broadcasts its registration
    pub async fn join_player(&self, username: &str) -> Result<String, EngineError> {
        let mut state = self.ctx.state.write().await;
        let hw_id = state.registry.join(username)?;
        if let Some(player) = state.registry.get(&hw_id) {
            self.ctx
                .enqueue(encode_registration(&player.hw_id, &player.username, player.team));
        }
        Ok(hw_id)
    }

    pub async fn remove_player(&self, hw_id: &str) -> Option<Player> {
        self.ctx.state.write().await.registry.remove(hw_id)
    }

    /// Points outbound traffic at `address`
    ///
    /// Accepts `host:port`, or a bare IP that keeps the current port. The
    /// sender reads the destination on every send, so a change made during
    /// a match applies to the very next datagram.
    pub async fn change_destination(&self, address: &str) -> Result<SocketAddr, EngineError> {
        let current = self.ctx.destination().await;
        let destination = parse_destination(address, current)
            .ok_or_else(|| EngineError::InvalidAddress(address.to_string()))?;

        if self.phase().await == Phase::Running {
            warn!("Destination changed while the match is running");
        }
        self.ctx.set_destination(destination).await;
        info!("Send target = {}", destination);
        Ok(destination)
    }

    /// Applies every queued hit in arrival order; returns how many were applied
    ///
    /// Never waits for new traffic, only drains what has already arrived.
    pub async fn drain_pending_events(&mut self) -> usize {
        let mut pending = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            pending.push(event);
        }
        if pending.is_empty() {
            return 0;
        }

        let scoring = self.ctx.config.rules;
        let mut state = self.ctx.state.write().await;
        for event in &pending {
            let outcome = rules::apply(event, &mut state.registry, &scoring);
            match &outcome.result {
                Ok(kind) => debug!("Applied {} as {:?}", event, kind),
                Err(e) => warn!("Ignored event {}: {}", event, e),
            }
            for line in outcome.messages {
                self.ctx.enqueue(line);
            }
        }

        pending.len()
    }

    /// Clears the roster and rewinds the clock for a new match
    ///
    /// Refused while a match is running. Waits for the previous match to
    /// finish its stop sequence, then discards hits still queued from it.
    pub async fn reset(&mut self) -> bool {
        if self.phase().await == Phase::Running {
            return false;
        }
        self.wait_stopped().await;

        let mut state = self.ctx.state.write().await;
        if state.is_running() {
            return false;
        }

        let mut discarded = 0;
        while self.events_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {} stale events", discarded);
        }

        state.clear();
        true
    }

    pub async fn scoreboard(&self) -> Scoreboard {
        self.ctx.state.read().await.scoreboard()
    }

    pub async fn player(&self, hw_id: &str) -> Option<Player> {
        self.ctx.state.read().await.registry.get(hw_id).cloned()
    }

    pub async fn phase(&self) -> Phase {
        self.ctx.state.read().await.phase()
    }

    pub async fn time_left(&self) -> u32 {
        self.ctx.state.read().await.time_left()
    }

    pub async fn destination(&self) -> SocketAddr {
        self.ctx.destination().await
    }

    /// Address the hit listener is bound to, while a match holds it
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.ctx.local_addr().await
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Background tasks hold the context; wake them so they exit.
        self.ctx.set_running(false);
    }
}
