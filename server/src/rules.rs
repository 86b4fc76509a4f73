//! Scoring rule engine
//!
//! Maps a decoded hit event and the current roster to score changes and the
//! lines to send back. The decision itself (`evaluate`) never touches the
//! roster; `apply` commits what it decided.
//!
//! | Case | Condition | Score change | Outbound |
//! |---|---|---|---|
//! | 1 | attacker unknown | none | `ERR:unknown-attacker` |
//! | 2 | target `43`, attacker on Red | attacker + base 43 bonus | `43` |
//! | 3 | target `53`, attacker on Green | attacker + base 53 bonus | `53` |
//! | 4 | target unknown | none | `ERR:unknown-target` |
//! | 5 | same team | both - penalty | attacker id, target id |
//! | 6 | opposing team | attacker + standard hit | target id |
//!
//! A base code hit by the team that does not score on it is looked up like
//! any other target, which in practice ends in case 4.

use crate::registry::PlayerRegistry;
use photon_shared::{
    encode_ack, encode_control, encode_hit, HitEvent, Team, GREEN_BASE_CODE, RED_BASE_CODE,
};

/// Point values used by the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRules {
    /// Credited to the attacker for hitting an opposing player.
    pub standard_hit: i32,
    /// Subtracted from both players on a same-team hit.
    pub friendly_fire_penalty: i32,
    /// Credited to a Red attacker for hitting base `43`.
    pub green_base_bonus: i32,
    /// Credited to a Green attacker for hitting base `53`.
    pub red_base_bonus: i32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            standard_hit: 10,
            friendly_fire_penalty: 10,
            green_base_bonus: 100,
            red_base_bonus: 500,
        }
    }
}

impl ScoringRules {
    /// The team that scores on `code` and the bonus it earns, if `code` is a base.
    pub fn base(&self, code: &str) -> Option<(Team, i32)> {
        match code {
            GREEN_BASE_CODE => Some((Team::Red, self.green_base_bonus)),
            RED_BASE_CODE => Some((Team::Green, self.red_base_bonus)),
            _ => None,
        }
    }
}

/// Why an event was rejected; the message is the reason sent after `ERR:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("unknown-attacker")]
    UnknownAttacker,
    #[error("unknown-target")]
    UnknownTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitKind {
    Base { code: String },
    FriendlyFire,
    Enemy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDelta {
    pub hw_id: String,
    pub delta: i32,
}

impl ScoreDelta {
    fn new(hw_id: &str, delta: i32) -> Self {
        Self {
            hw_id: hw_id.to_string(),
            delta,
        }
    }
}

/// Result of running one event through the decision table
///
/// `messages` is never empty: every event is answered on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub result: Result<HitKind, RuleError>,
    pub deltas: Vec<ScoreDelta>,
    pub messages: Vec<String>,
}

impl Outcome {
    fn rejected(error: RuleError) -> Self {
        Self {
            result: Err(error),
            deltas: Vec::new(),
            messages: vec![encode_ack(Some(&error.to_string()))],
        }
    }
}

/// Decides the outcome of `event` without modifying the roster
pub fn evaluate(event: &HitEvent, registry: &PlayerRegistry, rules: &ScoringRules) -> Outcome {
    let attacker = match registry.get(&event.attacker) {
        Some(attacker) => attacker,
        None => return Outcome::rejected(RuleError::UnknownAttacker),
    };

    if let Some((scoring_team, bonus)) = rules.base(&event.target) {
        if attacker.team == scoring_team {
            return Outcome {
                result: Ok(HitKind::Base {
                    code: event.target.clone(),
                }),
                deltas: vec![ScoreDelta::new(&attacker.hw_id, bonus)],
                messages: vec![encode_control(&event.target)],
            };
        }
    }

    let target = match registry.get(&event.target) {
        Some(target) => target,
        None => return Outcome::rejected(RuleError::UnknownTarget),
    };

    if attacker.hw_id == target.hw_id {
        return Outcome {
            result: Ok(HitKind::FriendlyFire),
            deltas: vec![ScoreDelta::new(&attacker.hw_id, -rules.friendly_fire_penalty)],
            messages: vec![encode_hit(&attacker.hw_id)],
        };
    }

    if attacker.team == target.team {
        return Outcome {
            result: Ok(HitKind::FriendlyFire),
            deltas: vec![
                ScoreDelta::new(&attacker.hw_id, -rules.friendly_fire_penalty),
                ScoreDelta::new(&target.hw_id, -rules.friendly_fire_penalty),
            ],
            messages: vec![encode_hit(&attacker.hw_id), encode_hit(&target.hw_id)],
        };
    }

    Outcome {
        result: Ok(HitKind::Enemy),
        deltas: vec![ScoreDelta::new(&attacker.hw_id, rules.standard_hit)],
        messages: vec![encode_hit(&target.hw_id)],
    }
}

/// Decides the outcome of `event` and commits its score changes
pub fn apply(event: &HitEvent, registry: &mut PlayerRegistry, rules: &ScoringRules) -> Outcome {
    let outcome = evaluate(event, registry, rules);
    for delta in &outcome.deltas {
        registry.credit(&delta.hw_id, delta.delta);
    }
    outcome
}
