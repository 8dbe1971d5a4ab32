//! Per-room match lifecycle.
//!
//! A room moves through `Lobby -> Countdown -> Playing -> GameOver` and back
//! to `Lobby`. All mutation and the win-condition check happen under the
//! room's lock; everything sent to players goes through their bounded
//! outbound queues, so the lock is never held across an actual network
//! write.

use crate::player::Player;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::protocol::{
    msg, BoardSnapshot, Countdown, Envelope, GameStart, LinesCleared, LobbyPlayer, LobbyUpdate,
    MatchOver, OpponentState, OpponentUpdate, ReceiveGarbage, RoomInfo,
};
use shared::{
    BROADCAST_INTERVAL, COUNTDOWN_START, GAME_OVER_LOBBY_DELAY, MAX_PLAYERS, MIN_PLAYERS,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Countdown,
    Playing,
    GameOver,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::Countdown => "countdown",
            Phase::Playing => "playing",
            Phase::GameOver => "game_over",
        }
    }
}

#[derive(Debug)]
struct RoomState {
    phase: Phase,
    seed: u64,
    countdown: u32,
    winner_id: Option<String>,
    players: HashMap<String, Player>,
}

pub struct Room {
    code: String,
    state: RwLock<RoomState>,
    /// Stop signal for the broadcast task, fired when the registry reaps
    /// the room.
    stop_tx: watch::Sender<bool>,
}

impl Room {
    pub fn new(code: String) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            code,
            state: RwLock::new(RoomState {
                phase: Phase::Lobby,
                seed: 0,
                countdown: 0,
                winner_id: None,
                players: HashMap::new(),
            }),
            stop_tx,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    pub async fn seed(&self) -> u64 {
        self.state.read().await.seed
    }

    /// Current countdown value; meaningful only in the countdown phase.
    pub async fn countdown(&self) -> u32 {
        self.state.read().await.countdown
    }

    pub async fn player_count(&self) -> usize {
        self.state.read().await.players.len()
    }

    pub async fn info(&self) -> RoomInfo {
        let state = self.state.read().await;
        RoomInfo {
            room_id: self.code.clone(),
            player_count: state.players.len(),
            max_players: MAX_PLAYERS,
            phase: state.phase.as_str().to_string(),
        }
    }

    /// Idempotently tells the broadcast task to exit.
    pub fn signal_stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub async fn add_player(&self, player: Player) {
        let mut state = self.state.write().await;
        info!("room {}: player {} ({}) joined", self.code, player.name, player.id);
        state.players.insert(player.id.clone(), player);
    }

    /// Removes a player, re-evaluating the win condition if a match is in
    /// progress (a disconnect mid-game counts like a death).
    pub async fn remove_player(self: Arc<Self>, id: &str) {
        let mut state = self.state.write().await;
        if state.players.remove(id).is_some() {
            info!("room {}: player {} left", self.code, id);
        }
        if state.phase == Phase::Playing {
            Self::check_win(&self, &mut state);
        }
    }

    pub async fn broadcast_lobby_update(&self) {
        let state = self.state.read().await;
        broadcast(&state, &lobby_envelope(&state));
    }

    pub async fn set_name(&self, id: &str, name: String) {
        let mut state = self.state.write().await;
        if let Some(player) = state.players.get_mut(id) {
            player.name = name;
        }
        broadcast(&state, &lobby_envelope(&state));
    }

    pub async fn update_snapshot(&self, id: &str, snapshot: BoardSnapshot) {
        let mut state = self.state.write().await;
        if let Some(player) = state.players.get_mut(id) {
            player.snapshot = Some(snapshot);
        }
    }

    pub async fn set_target(&self, id: &str, target_id: Option<String>) {
        let mut state = self.state.write().await;
        if let Some(player) = state.players.get_mut(id) {
            player.target_id = target_id;
        }
    }

    /// Flips a ready flag and starts the countdown once the lobby has at
    /// least the minimum membership with everyone ready. The countdown is
    /// not cancellable: once the phase leaves `Lobby`, later toggles only
    /// change flags.
    pub async fn set_ready(self: Arc<Self>, id: &str, ready: bool) {
        let start = {
            let mut state = self.state.write().await;
            if let Some(player) = state.players.get_mut(id) {
                player.ready = ready;
            }
            broadcast(&state, &lobby_envelope(&state));

            let all_ready = state.players.len() >= MIN_PLAYERS
                && state.players.values().all(|p| p.ready);
            if state.phase == Phase::Lobby && all_ready {
                state.phase = Phase::Countdown;
                state.countdown = COUNTDOWN_START;
                true
            } else {
                false
            }
        };

        if start {
            info!("room {}: all players ready, starting countdown", self.code);
            tokio::spawn(self.run_countdown());
        }
    }

    async fn run_countdown(self: Arc<Self>) {
        for value in (1..=COUNTDOWN_START).rev() {
            {
                let mut state = self.state.write().await;
                state.countdown = value;
                broadcast(
                    &state,
                    &Envelope::new(msg::COUNTDOWN, &Countdown { value }),
                );
            }
            sleep(Duration::from_secs(1)).await;
        }
        self.start_game().await;
    }

    async fn start_game(self: Arc<Self>) {
        {
            let mut state = self.state.write().await;
            state.phase = Phase::Playing;
            state.seed = rand::thread_rng().gen();
            state.winner_id = None;

            let mut players: Vec<String> = state.players.keys().cloned().collect();
            players.sort();

            for player in state.players.values_mut() {
                player.alive = true;
                player.ready = false;
                player.snapshot = None;
            }

            info!(
                "room {}: game started with {} players, seed {}",
                self.code,
                players.len(),
                state.seed
            );
            broadcast(
                &state,
                &Envelope::new(
                    msg::GAME_START,
                    &GameStart {
                        seed: state.seed,
                        players,
                    },
                ),
            );
        }

        tokio::spawn(Arc::clone(&self).broadcast_loop());
    }

    /// Rebroadcasts everyone's latest snapshot while the match runs.
    async fn broadcast_loop(self: Arc<Self>) {
        let mut stop_rx = self.stop_tx.subscribe();
        let mut ticker = interval(BROADCAST_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.phase().await != Phase::Playing {
                        return;
                    }
                    self.send_opponent_updates().await;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn send_opponent_updates(&self) {
        let state = self.state.read().await;

        let mut all: Vec<OpponentState> = state
            .players
            .values()
            .map(|p| match &p.snapshot {
                Some(snap) => OpponentState {
                    player_id: p.id.clone(),
                    player_name: p.name.clone(),
                    score: snap.score,
                    level: snap.level,
                    lines: snap.lines,
                    alive: snap.alive,
                    board: snap.board.clone(),
                },
                None => OpponentState {
                    player_id: p.id.clone(),
                    player_name: p.name.clone(),
                    score: 0,
                    level: 1,
                    lines: 0,
                    alive: p.alive,
                    board: Vec::new(),
                },
            })
            .collect();
        all.sort_by(|a, b| a.player_id.cmp(&b.player_id));

        for player in state.players.values() {
            let opponents: Vec<OpponentState> = all
                .iter()
                .filter(|o| o.player_id != player.id)
                .cloned()
                .collect();
            player.send(Envelope::new(
                msg::OPPONENT_UPDATE,
                &OpponentUpdate { opponents },
            ));
        }
    }

    /// Routes an attack to the reporter's chosen target if that player is
    /// still a valid victim, otherwise to a random alive opponent. With no
    /// alive opponent the attack is dropped.
    pub async fn handle_lines_cleared(&self, attacker_id: &str, report: LinesCleared) {
        if report.attack_power == 0 {
            return;
        }

        let state = self.state.read().await;
        let Some(attacker) = state.players.get(attacker_id) else {
            return;
        };

        let chosen = attacker.target_id.clone().filter(|tid| {
            tid.as_str() != attacker_id
                && state.players.get(tid).map_or(false, |p| p.alive)
        });

        let target_id = match chosen {
            Some(id) => id,
            None => {
                let candidates: Vec<&String> = state
                    .players
                    .values()
                    .filter(|p| p.alive && p.id != attacker_id)
                    .map(|p| &p.id)
                    .collect();
                match candidates.choose(&mut rand::thread_rng()) {
                    Some(id) => (*id).clone(),
                    None => {
                        debug!(
                            "room {}: no alive opponent for {}, attack dropped",
                            self.code, attacker_id
                        );
                        return;
                    }
                }
            }
        };

        if let Some(target) = state.players.get(&target_id) {
            info!(
                "room {}: {} sends {} garbage lines to {}",
                self.code, attacker_id, report.attack_power, target_id
            );
            target.send(Envelope::new(
                msg::RECEIVE_GARBAGE,
                &ReceiveGarbage {
                    lines: report.attack_power,
                    attacker_id: attacker_id.to_string(),
                },
            ));
        }
    }

    pub async fn handle_player_dead(self: Arc<Self>, id: &str) {
        let mut state = self.state.write().await;
        if let Some(player) = state.players.get_mut(id) {
            player.alive = false;
            info!("room {}: player {} topped out", self.code, id);
        }
        Self::check_win(&self, &mut state);
    }

    /// Must be called with the state lock held. Ends the match once at most
    /// one player is alive; the survivor (if any) wins, everyone else
    /// shares last place.
    fn check_win(room: &Arc<Room>, state: &mut RoomState) {
        if state.phase != Phase::Playing || state.players.is_empty() {
            return;
        }

        let alive: Vec<(String, String)> = state
            .players
            .values()
            .filter(|p| p.alive)
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();
        if alive.len() > 1 {
            return;
        }

        state.phase = Phase::GameOver;
        let (winner_id, winner_name) = alive.into_iter().next().unwrap_or_default();
        state.winner_id = (!winner_id.is_empty()).then(|| winner_id.clone());

        let total = state.players.len() as u32;
        for player in state.players.values() {
            let rank = if player.id == winner_id { 1 } else { total };
            player.send(Envelope::new(
                msg::MATCH_OVER,
                &MatchOver {
                    winner_id: winner_id.clone(),
                    winner_name: winner_name.clone(),
                    your_rank: rank,
                },
            ));
        }
        info!(
            "room {}: match over, winner {:?}",
            room.code, state.winner_id
        );

        let room = Arc::clone(room);
        tokio::spawn(async move {
            sleep(GAME_OVER_LOBBY_DELAY).await;
            room.return_to_lobby().await;
        });
    }

    async fn return_to_lobby(&self) {
        let mut state = self.state.write().await;
        if state.phase != Phase::GameOver {
            return;
        }
        state.phase = Phase::Lobby;
        for player in state.players.values_mut() {
            player.ready = false;
            player.alive = true;
        }
        info!("room {}: back to lobby", self.code);
        broadcast(&state, &lobby_envelope(&state));
    }
}

fn lobby_envelope(state: &RoomState) -> Envelope {
    let mut players: Vec<LobbyPlayer> = state
        .players
        .values()
        .map(|p| LobbyPlayer {
            player_id: p.id.clone(),
            name: p.name.clone(),
            ready: p.ready,
        })
        .collect();
    players.sort_by(|a, b| a.player_id.cmp(&b.player_id));
    Envelope::new(msg::LOBBY_UPDATE, &LobbyUpdate { players })
}

fn broadcast(state: &RoomState, envelope: &Envelope) {
    for player in state.players.values() {
        player.send(envelope.clone());
    }
}
