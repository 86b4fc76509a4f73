//! Player roster for the current match
//!
//! The registry owns every active player, keyed by hardware id, and is the
//! only place identities are minted. It handles:
//! - Random hardware id generation with bounded collision retries
//! - Team assignment derived from the id token
//! - Score bookkeeping on behalf of the rule engine
//! - Roster queries used by the display layer

use crate::error::EngineError;
use log::{info, warn};
use photon_shared::{Player, Team};
use rand::Rng;
use std::collections::HashMap;

/// Attempts made before `join` gives up on finding a free id.
pub const MAX_JOIN_ATTEMPTS: usize = 32;
/// Largest id token; tokens are drawn from `1..=MAX_HW_TOKEN`.
pub const MAX_HW_TOKEN: u16 = 9999;

/// Formats a token as a device id, e.g. `42` becomes `hw0x002a`.
pub fn hw_id_for(token: u16) -> String {
    format!("hw0x{:04x}", token)
}

/// Manages the set of players taking part in a match
///
/// Identities are unique for as long as a player is registered. A player's
/// team is fixed at join time and never changes afterwards.
#[derive(Debug, Default, Clone)]
pub struct PlayerRegistry {
    players: HashMap<String, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// Registers a player under a freshly generated hardware id
    ///
    /// Returns the new id so the caller can broadcast the registration.
    pub fn join(&mut self, username: &str) -> Result<String, EngineError> {
        let mut rng = rand::thread_rng();
        self.join_with(username, || rng.gen_range(1..=MAX_HW_TOKEN))
    }

    /// Same as `join`, drawing candidate tokens from `next_token`
    ///
    /// Colliding candidates are discarded and a new one is drawn, up to
    /// `MAX_JOIN_ATTEMPTS` times.
    pub fn join_with(
        &mut self,
        username: &str,
        mut next_token: impl FnMut() -> u16,
    ) -> Result<String, EngineError> {
        for _ in 0..MAX_JOIN_ATTEMPTS {
            let token = next_token();
            let hw_id = hw_id_for(token);

            if self.players.contains_key(&hw_id) {
                warn!("Hardware id collision on {}, regenerating", hw_id);
                continue;
            }

            let team = Team::from_token(token);
            info!("Player joined: {} ({}) [{}]", username, hw_id, team);
            self.players
                .insert(hw_id.clone(), Player::new(hw_id.clone(), username, team));
            return Ok(hw_id);
        }

        Err(EngineError::RegistryExhausted {
            attempts: MAX_JOIN_ATTEMPTS,
        })
    }

    /// Admits a device whose id is already known
    ///
    /// Returns false without touching the roster if the id is taken.
    pub fn register(&mut self, hw_id: &str, username: &str, team: Team) -> bool {
        if self.players.contains_key(hw_id) {
            return false;
        }
        info!("Player registered: {} ({}) [{}]", username, hw_id, team);
        self.players
            .insert(hw_id.to_string(), Player::new(hw_id, username, team));
        true
    }

    /// Removes a player, returning it if it was present
    pub fn remove(&mut self, hw_id: &str) -> Option<Player> {
        let removed = self.players.remove(hw_id);
        if let Some(player) = &removed {
            info!("Player removed: {} ({})", player.username, player.hw_id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    pub fn get(&self, hw_id: &str) -> Option<&Player> {
        self.players.get(hw_id)
    }

    /// Adds `delta` to a player's score. Returns false for unknown ids.
    pub fn credit(&mut self, hw_id: &str, delta: i32) -> bool {
        match self.players.get_mut(hw_id) {
            Some(player) => {
                player.score = player.score.saturating_add(delta);
                true
            }
            None => false,
        }
    }

    /// Players ordered by descending score, ties broken by id
    pub fn standings(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.hw_id.cmp(&b.hw_id)));
        players
    }

    pub fn team_total(&self, team: Team) -> i32 {
        self.players
            .values()
            .filter(|player| player.team == team)
            .map(|player| player.score)
            .sum()
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tokens(seq: Vec<u16>) -> impl FnMut() -> u16 {
        let mut iter = seq.into_iter();
        move || iter.next().expect("token sequence exhausted")
    }

    #[test]
    fn test_hw_id_format() {
        assert_eq!(hw_id_for(1), "hw0x0001");
        assert_eq!(hw_id_for(42), "hw0x002a");
        assert_eq!(hw_id_for(MAX_HW_TOKEN), "hw0x270f");
    }

    #[test]
    fn test_join_assigns_team_by_parity() {
        let mut registry = PlayerRegistry::new();

        let odd = registry.join_with("Alice", tokens(vec![7])).unwrap();
        let even = registry.join_with("Bob", tokens(vec![8])).unwrap();

        assert_eq!(registry.get(&odd).unwrap().team, Team::Red);
        assert_eq!(registry.get(&even).unwrap().team, Team::Green);
        assert_eq!(registry.get(&odd).unwrap().score, 0);
    }

    #[test]
    fn test_join_retries_after_collision() {
        let mut registry = PlayerRegistry::new();

        let alice = registry.join_with("Alice", tokens(vec![5])).unwrap();
        let bob = registry.join_with("Bob", tokens(vec![5, 12])).unwrap();

        assert_ne!(alice, bob);
        assert_eq!(bob, hw_id_for(12));
        assert_eq!(registry.get(&bob).unwrap().username, "Bob");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_join_exhausts_retry_budget() {
        let mut registry = PlayerRegistry::new();
        registry.join_with("Alice", tokens(vec![3])).unwrap();

        let result = registry.join_with("Bob", || 3);

        assert!(matches!(
            result,
            Err(EngineError::RegistryExhausted {
                attempts: MAX_JOIN_ATTEMPTS
            })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_random_joins_are_distinct() {
        let mut registry = PlayerRegistry::new();
        let mut seen = HashSet::new();

        for i in 0..200 {
            let hw_id = registry.join(&format!("player{}", i)).unwrap();
            assert!(seen.insert(hw_id));
        }
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn test_register_refuses_duplicates() {
        let mut registry = PlayerRegistry::new();

        assert!(registry.register("hw01", "Alice", Team::Red));
        assert!(!registry.register("hw01", "Mallory", Team::Green));

        let player = registry.get("hw01").unwrap();
        assert_eq!(player.username, "Alice");
        assert_eq!(player.team, Team::Red);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = PlayerRegistry::new();
        registry.register("hw01", "Alice", Team::Red);
        registry.register("hw02", "Bob", Team::Green);

        assert!(registry.remove("hw01").is_some());
        assert!(registry.remove("hw01").is_none());
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_credit_and_standings() {
        let mut registry = PlayerRegistry::new();
        registry.register("hw01", "Alice", Team::Red);
        registry.register("hw02", "Bob", Team::Green);
        registry.register("hw03", "Carol", Team::Red);

        assert!(registry.credit("hw02", 30));
        assert!(registry.credit("hw03", -10));
        assert!(!registry.credit("hw99", 10));

        let order: Vec<String> = registry
            .standings()
            .into_iter()
            .map(|player| player.hw_id)
            .collect();
        assert_eq!(order, vec!["hw02", "hw01", "hw03"]);

        assert_eq!(registry.team_total(Team::Red), -10);
        assert_eq!(registry.team_total(Team::Green), 30);
    }
}
