use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SEND_PORT: u16 = 7500;
pub const RECEIVE_PORT: u16 = 7501;
pub const DEFAULT_DEST_HOST: &str = "127.0.0.1";
pub const MAX_DATAGRAM: usize = 2048;

pub const START_CODE: &str = "202";
pub const STOP_CODE: &str = "221";

/// Base target scored by team Red.
pub const GREEN_BASE_CODE: &str = "43";
/// Base target scored by team Green.
pub const RED_BASE_CODE: &str = "53";

pub const ACK_OK: &str = "OK";
const ERR_PREFIX: &str = "ERR:";
const REG_PREFIX: &str = "REG:";
const SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Green,
}

impl Team {
    /// Odd tokens play for Red, even tokens for Green.
    pub fn from_token(token: u16) -> Self {
        if token % 2 == 1 {
            Team::Red
        } else {
            Team::Green
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Green => "green",
        }
    }

    pub fn opponent(&self) -> Self {
        match self {
            Team::Red => Team::Green,
            Team::Green => Team::Red,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Team {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Team::Red),
            "green" => Ok(Team::Green),
            other => Err(format!("unknown team '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub hw_id: String,
    pub username: String,
    pub team: Team,
    pub score: i32,
}

impl Player {
    pub fn new(hw_id: impl Into<String>, username: impl Into<String>, team: Team) -> Self {
        Self {
            hw_id: hw_id.into(),
            username: username.into(),
            team,
            score: 0,
        }
    }
}

/// A single `ATTACKER:TARGET` report from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitEvent {
    pub attacker: String,
    pub target: String,
}

impl HitEvent {
    pub fn new(attacker: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            attacker: attacker.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for HitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.attacker, SEPARATOR, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("malformed datagram {0:?}")]
    Malformed(String),
}

/// Parses an inbound datagram into a hit event.
///
/// Only the first separator splits the line, so a target may itself contain
/// separators. Both halves are trimmed and must be non-empty.
pub fn decode(bytes: &[u8]) -> Result<HitEvent, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DecodeError::Malformed(String::from_utf8_lossy(bytes).into_owned()))?;
    let line = text.trim();
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    let (attacker, target) = line
        .split_once(SEPARATOR)
        .ok_or_else(|| DecodeError::Malformed(line.to_string()))?;
    let (attacker, target) = (attacker.trim(), target.trim());
    if attacker.is_empty() || target.is_empty() {
        return Err(DecodeError::Malformed(line.to_string()));
    }

    Ok(HitEvent::new(attacker, target))
}

/// `None` acknowledges, `Some(reason)` rejects.
pub fn encode_ack(reason: Option<&str>) -> String {
    match reason {
        None => ACK_OK.to_string(),
        Some(reason) => format!("{}{}", ERR_PREFIX, reason),
    }
}

pub fn encode_control(code: &str) -> String {
    code.to_string()
}

pub fn encode_registration(hw_id: &str, username: &str, team: Team) -> String {
    format!("{}{}:{}:{}", REG_PREFIX, hw_id, username, team)
}

pub fn encode_hit(hw_id: &str) -> String {
    hw_id.to_string()
}

/// Classification of a line the engine sends, as seen from the device side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Ack,
    Rejected(String),
    Control(String),
    Registration {
        hw_id: String,
        username: String,
        team: Team,
    },
    Hit(String),
}

impl Outbound {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line == ACK_OK {
            return Outbound::Ack;
        }
        if let Some(reason) = line.strip_prefix(ERR_PREFIX) {
            return Outbound::Rejected(reason.to_string());
        }
        if let Some(body) = line.strip_prefix(REG_PREFIX) {
            // Usernames may contain separators; the team is always last.
            if let Some((hw_id, rest)) = body.split_once(SEPARATOR) {
                if let Some((username, team)) = rest.rsplit_once(SEPARATOR) {
                    if let Ok(team) = team.parse() {
                        return Outbound::Registration {
                            hw_id: hw_id.to_string(),
                            username: username.to_string(),
                            team,
                        };
                    }
                }
            }
        }
        if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
            return Outbound::Control(line.to_string());
        }
        Outbound::Hit(line.to_string())
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Ack => f.write_str(&encode_ack(None)),
            Outbound::Rejected(reason) => f.write_str(&encode_ack(Some(reason.as_str()))),
            Outbound::Control(code) => f.write_str(&encode_control(code)),
            Outbound::Registration {
                hw_id,
                username,
                team,
            } => f.write_str(&encode_registration(hw_id, username, *team)),
            Outbound::Hit(hw_id) => f.write_str(&encode_hit(hw_id)),
        }
    }
}
