//! # Photon Match Engine
//!
//! Authoritative scoring engine for a live laser tag match. Hit-detection
//! devices report tags over UDP; the engine keeps the score, applies the
//! team rules and answers every report so devices never wait on a reply.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Scoring
//! Every hit is judged here against the current roster. Devices only report
//! what they saw; whether it scores, costs points or is rejected is decided
//! by the rule engine.
//!
//! ### Match Lifecycle
//! A match moves through `Idle -> Running -> Stopped` exactly once. Starting
//! binds the sockets and spawns the background tasks; stopping (by hand or
//! when the clock runs out) sends the stop code three times and releases
//! the sockets.
//!
//! ### Roster Management
//! Players get a random hardware id on join, and their team follows from that
//! id. Registrations are broadcast so devices can learn who is playing.
//!
//! ## Architecture Design
//!
//! ### Background Tasks
//! A running match has four tokio tasks sharing one `MatchContext`:
//! - **Hit listener**: receives datagrams, decodes them and queues events
//! - **Sender**: drains the outbound queue to the configured destination
//! - **Match clock**: counts down and stops the match at zero
//! - **Start announcer**: sends the start code after the grace period
//!
//! All four watch a shared running flag and exit within one poll interval of
//! a stop.
//!
//! ### Caller-Driven Scoring
//! Decoded hits wait in a queue until the caller runs
//! `Engine::drain_pending_events`. The display layer drives this on its own
//! refresh schedule and then reads the `Scoreboard`, so it always renders a
//! state that no task is modifying underneath it.
//!
//! ### Wire Protocol
//! Plain text, one message per datagram:
//! - inbound `ATTACKER:TARGET` hit reports
//! - outbound `OK` / `ERR:<reason>` acknowledgements
//! - outbound `202` start and `221` stop codes
//! - outbound `REG:<hw_id>:<username>:<team>` registrations
//! - outbound hit broadcasts naming the device(s) that were hit
//!
//! ## Module Organization
//!
//! - `registry`: player roster and hardware id generation
//! - `rules`: the scoring decision table and its point values
//! - `game`: match phase, clock state and scoreboard snapshots
//! - `network`: shared match context, hit listener and sender loops
//! - `clock`: countdown and start announcement tasks
//! - `engine`: the lifecycle controller exposed to callers
//! - `config`: match configuration and destination parsing
//! - `error`: errors reported to callers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use photon_server::{Engine, MatchConfig, Phase};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::new(MatchConfig::default());
//!     engine.change_destination("192.168.1.50").await?;
//!
//!     let alice = engine.join_player("Alice").await?;
//!     println!("Alice plays as {}", alice);
//!
//!     engine.start().await?;
//!
//!     let mut refresh = tokio::time::interval(Duration::from_millis(100));
//!     while engine.phase().await == Phase::Running {
//!         refresh.tick().await;
//!         engine.drain_pending_events().await;
//!         let board = engine.scoreboard().await;
//!         println!("red {} / green {}", board.red_total, board.green_total);
//!     }
//!
//!     engine.wait_stopped().await;
//!     Ok(())
//! }
//! ```

mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;
mod network;
pub mod registry;
pub mod rules;

pub use config::MatchConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use game::{Phase, Scoreboard};
pub use network::STOP_REPEAT;
pub use registry::PlayerRegistry;
pub use rules::{RuleError, ScoringRules};
