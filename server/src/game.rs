use crate::registry::PlayerRegistry;
use log::info;
use photon_shared::{Player, Team};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Authoritative state of the one match an engine runs.
///
/// The phase only moves forward, `Idle -> Running -> Stopped`; `clear` is the
/// only way back to `Idle`.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub registry: PlayerRegistry,
    time_left: u32,
    phase: Phase,
    duration: u32,
}

impl MatchState {
    pub fn new(duration: u32) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            time_left: duration,
            phase: Phase::Idle,
            duration,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    /// Moves an idle match to `Running`. Returns false from any other phase.
    pub fn begin(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::Running;
        info!("Match running, {} seconds on the clock", self.time_left);
        true
    }

    /// Moves a running match to `Stopped`. Returns false from any other phase.
    pub fn finish(&mut self) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        self.phase = Phase::Stopped;
        info!("Match stopped with {} seconds left", self.time_left);
        true
    }

    /// Advances the countdown by one second while running; returns the time left.
    pub fn tick(&mut self) -> u32 {
        if self.is_running() {
            self.time_left = self.time_left.saturating_sub(1);
        }
        self.time_left
    }

    /// Drops the roster and rewinds the clock for a fresh match
    pub fn clear(&mut self) {
        self.registry.clear();
        self.time_left = self.duration;
        self.phase = Phase::Idle;
        info!("Match state cleared");
    }

    pub fn scoreboard(&self) -> Scoreboard {
        Scoreboard {
            phase: self.phase,
            time_left: self.time_left,
            red_total: self.registry.team_total(Team::Red),
            green_total: self.registry.team_total(Team::Green),
            players: self.registry.standings(),
        }
    }
}

/// Point-in-time copy of the match for display consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreboard {
    pub phase: Phase,
    pub time_left: u32,
    pub red_total: i32,
    pub green_total: i32,
    pub players: Vec<Player>,
}

impl Scoreboard {
    pub fn team(&self, team: Team) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(move |player| player.team == team)
    }

    /// Team with the higher total, `None` on a tie
    pub fn leader(&self) -> Option<Team> {
        match self.red_total.cmp(&self.green_total) {
            std::cmp::Ordering::Greater => Some(Team::Red),
            std::cmp::Ordering::Less => Some(Team::Green),
            std::cmp::Ordering::Equal => None,
        }
    }
}
