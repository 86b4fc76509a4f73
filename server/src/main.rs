use clap::Parser;
use log::{error, info};
use photon_server::{Engine, MatchConfig, Phase, Scoreboard, ScoringRules};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local address to receive hit reports on
    #[arg(short = 'b', long, default_value = "0.0.0.0:7501")]
    bind: SocketAddr,

    /// Where acknowledgements, codes and broadcasts are sent (host:port or bare IP)
    #[arg(short = 'd', long, default_value = "127.0.0.1:7500")]
    dest: String,

    /// Match length in seconds
    #[arg(short = 't', long, default_value = "360")]
    duration: u32,

    /// Player to join before the match starts (repeatable)
    #[arg(short = 'p', long = "player")]
    players: Vec<String>,

    /// How often queued hits are applied, in milliseconds
    #[arg(short = 'r', long, default_value = "100")]
    refresh_ms: u64,

    /// Delay before the start code is sent, in seconds
    #[arg(long, default_value = "3")]
    start_grace_secs: u64,

    /// Points for hitting an opposing player
    #[arg(long, default_value = "10")]
    hit_points: i32,

    /// Points lost by both players on a same-team hit
    #[arg(long, default_value = "10")]
    friendly_fire_penalty: i32,

    /// Points for a red player hitting base 43
    #[arg(long, default_value = "100")]
    green_base_points: i32,

    /// Points for a green player hitting base 53
    #[arg(long, default_value = "500")]
    red_base_points: i32,

    /// Print the final scoreboard as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn match_config(&self) -> MatchConfig {
        MatchConfig {
            bind_addr: self.bind,
            duration: self.duration,
            start_grace: Duration::from_secs(self.start_grace_secs),
            rules: ScoringRules {
                standard_hit: self.hit_points,
                friendly_fire_penalty: self.friendly_fire_penalty,
                green_base_bonus: self.green_base_points,
                red_base_bonus: self.red_base_points,
            },
            ..MatchConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut engine = Engine::new(args.match_config());
    engine.change_destination(&args.dest).await?;

    for name in &args.players {
        let hw_id = engine.join_player(name).await?;
        info!("{} plays as {}", name, hw_id);
    }

    engine.start().await?;
    info!(
        "Match running for {} seconds, Ctrl+C to stop early",
        args.duration
    );

    let mut refresh = interval(Duration::from_millis(args.refresh_ms.max(1)));
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_board = engine.scoreboard().await;

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if engine.drain_pending_events().await > 0 {
                    let board = engine.scoreboard().await;
                    log_changes(&last_board, &board);
                    last_board = board;
                }
                if engine.phase().await != Phase::Running {
                    break;
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, stopping match...");
                engine.stop().await;
                break;
            }
        }
    }

    engine.wait_stopped().await;
    engine.drain_pending_events().await;

    let board = engine.scoreboard().await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&board)?);
    } else {
        print_scoreboard(&board);
    }

    Ok(())
}

fn log_changes(before: &Scoreboard, after: &Scoreboard) {
    for player in &after.players {
        let previous = before
            .players
            .iter()
            .find(|p| p.hw_id == player.hw_id)
            .map(|p| p.score)
            .unwrap_or(0);
        if previous != player.score {
            info!(
                "{} ({}) {:+} -> {}",
                player.username,
                player.hw_id,
                player.score - previous,
                player.score
            );
        }
    }
    info!(
        "red {} / green {} ({}s left)",
        after.red_total, after.green_total, after.time_left
    );
}

fn print_scoreboard(board: &Scoreboard) {
    println!("Final score: red {} / green {}", board.red_total, board.green_total);
    match board.leader() {
        Some(team) => println!("Winner: {}", team),
        None => println!("Draw"),
    }
    for player in &board.players {
        println!(
            "  {:>6}  {:<10} {:<5} {}",
            player.score, player.hw_id, player.team, player.username
        );
    }
}
