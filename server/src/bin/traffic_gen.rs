//! Device traffic generator
//!
//! Stands in for the hit-detection hardware: learns the roster from
//! registration broadcasts, waits for the start code, then reports random
//! hits to the engine until the stop code arrives.

use clap::Parser;
use log::{debug, info, warn};
use photon_server::STOP_REPEAT;
use photon_shared::{
    HitEvent, Outbound, Team, GREEN_BASE_CODE, MAX_DATAGRAM, RED_BASE_CODE, START_CODE,
    STOP_CODE,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address the engine sends to
    #[arg(short = 'l', long, default_value = "0.0.0.0:7500")]
    listen: SocketAddr,

    /// Address the engine receives hits on
    #[arg(short = 't', long, default_value = "127.0.0.1:7501")]
    target: SocketAddr,

    /// Delay between hit reports, in milliseconds
    #[arg(short = 'i', long, default_value = "500")]
    interval_ms: u64,

    /// Chance that a report targets a base instead of a player
    #[arg(long, default_value = "0.1")]
    base_chance: f64,
}

struct Device {
    hw_id: String,
    team: Team,
}

fn random_event(roster: &[Device], rng: &mut impl Rng, base_chance: f64) -> Option<HitEvent> {
    let attacker = roster.choose(rng)?;

    if rng.gen_bool(base_chance.clamp(0.0, 1.0)) {
        let base = match attacker.team.opponent() {
            Team::Green => GREEN_BASE_CODE,
            Team::Red => RED_BASE_CODE,
        };
        return Some(HitEvent::new(attacker.hw_id.as_str(), base));
    }

    let target = roster.choose(rng)?;
    Some(HitEvent::new(attacker.hw_id.as_str(), target.hw_id.as_str()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let socket = UdpSocket::bind(args.listen).await?;
    info!("Generator listening on {}", socket.local_addr()?);
    info!("Reporting hits to {}", args.target);

    let mut rng = rand::thread_rng();
    let mut roster: Vec<Device> = Vec::new();
    let mut running = false;
    let mut stops_seen = 0;
    let mut sent = 0u64;

    let mut ticker = interval(Duration::from_millis(args.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                let line = String::from_utf8_lossy(&buf[..len]).into_owned();

                match Outbound::parse(&line) {
                    Outbound::Registration { hw_id, username, team } => {
                        info!("Registered {} as {} [{}]", username, hw_id, team);
                        roster.push(Device { hw_id, team });
                    }
                    Outbound::Control(code) if code == START_CODE => {
                        info!("Start code received, {} devices active", roster.len());
                        running = true;
                    }
                    Outbound::Control(code) if code == STOP_CODE => {
                        running = false;
                        stops_seen += 1;
                        if stops_seen >= STOP_REPEAT {
                            info!("Stop code received, {} hits reported", sent);
                            break;
                        }
                    }
                    Outbound::Control(code) => info!("Base {} was hit", code),
                    Outbound::Hit(hw_id) => info!("{} was hit", hw_id),
                    Outbound::Ack => debug!("Acknowledged"),
                    Outbound::Rejected(reason) => warn!("Engine rejected a report: {}", reason),
                }
            }
            _ = ticker.tick(), if running => {
                if let Some(event) = random_event(&roster, &mut rng, args.base_chance) {
                    socket.send_to(event.to_string().as_bytes(), args.target).await?;
                    debug!("Reported {}", event);
                    sent += 1;
                }
            }
        }
    }

    Ok(())
}
