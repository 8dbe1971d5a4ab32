use clap::Parser;
use client::network::{Client, ServerEvent};
use client::session::Session;
use log::{info, warn};
use rand::Rng;
use std::time::Duration;

/// Headless autoplay client: creates or joins a room, readies up, and
/// plays with random moves until disconnected. Useful for smoke-testing a
/// server and for filling lobbies during development.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server base URL
        #[clap(short, long, default_value = "http://127.0.0.1:8080")]
        server: String,
        /// Display name
        #[clap(short, long, default_value = "bot")]
        name: String,
        /// Room code to join; creates a new room when omitted
        #[clap(short, long)]
        room: Option<String>,
    }

    env_logger::init();
    let args = Args::parse();
    let client = Client::new(&args.server);

    let (room_id, token) = match &args.room {
        Some(code) => {
            let joined = client.join_room(code, &args.name).await?;
            (joined.room_id, joined.join_token)
        }
        None => {
            let created = client.create_room(&args.name).await?;
            info!("created room {}", created.room_id);
            (created.room_id, created.join_token)
        }
    };

    let mut connection = client.connect(&room_id, &token).await?;
    info!("connected to room {}", room_id);
    connection.handle().send_ready(true);

    let mut session: Option<Session> = None;

    loop {
        let gravity = session
            .as_ref()
            .filter(|s| !s.is_game_over())
            .map(|s| s.drop_interval())
            .unwrap_or(Duration::from_secs(3600));

        tokio::select! {
            event = connection.next_event() => {
                match event {
                    None | Some(ServerEvent::Disconnected) => {
                        warn!("disconnected from server");
                        break;
                    }
                    Some(ServerEvent::AssignId { player_id }) => {
                        info!("assigned id {}", player_id);
                    }
                    Some(ServerEvent::Countdown(value)) => {
                        info!("starting in {}...", value);
                    }
                    Some(ServerEvent::GameStart(start)) => {
                        info!("game started: seed {}, {} players", start.seed, start.players.len());
                        session = Some(Session::new(start.seed, connection.handle()));
                    }
                    Some(ServerEvent::ReceiveGarbage { lines, attacker_id }) => {
                        info!("incoming {} garbage lines from {}", lines, attacker_id);
                        if let Some(active) = session.as_mut() {
                            active.queue_garbage(lines);
                        }
                    }
                    Some(ServerEvent::MatchOver(over)) => {
                        info!(
                            "match over: winner {:?}, our rank {}",
                            over.winner_name, over.your_rank
                        );
                        session = None;
                        // Queue up for the next round.
                        connection.handle().send_ready(true);
                    }
                    Some(ServerEvent::LobbyUpdate(_)) | Some(ServerEvent::OpponentUpdate(_)) => {}
                }
            }
            _ = tokio::time::sleep(gravity) => {
                if let Some(active) = session.as_mut() {
                    autoplay_move(active);
                    active.tick();
                    if active.is_game_over() {
                        info!("topped out");
                    }
                }
            }
        }
    }

    Ok(())
}

/// One random move per gravity tick keeps the bot from stacking a single
/// column.
fn autoplay_move(session: &mut Session) {
    match rand::thread_rng().gen_range(0..5) {
        0 => session.move_left(),
        1 => session.move_right(),
        2 => session.rotate(),
        3 => session.hard_drop(),
        _ => {}
    }
}
