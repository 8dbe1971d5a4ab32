//! Integration tests for the multiplayer matchmaking stack.
//!
//! These tests validate cross-crate behavior and real network flows: the
//! wire protocol, cross-client determinism, and full lobby-to-match
//! lifecycles against a live server on an ephemeral port.

use client::network::{Client, Connection, ServerEvent};
use server::registry::Registry;
use server::routes;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

/// Boots a server on an ephemeral port and returns its HTTP base URL.
async fn spawn_server() -> String {
    let registry = Arc::new(Registry::new());
    let app = routes::router(registry);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}", addr)
}

/// Waits (with a timeout) for the first event the predicate accepts.
async fn wait_for<F>(connection: &mut Connection, mut accept: F) -> ServerEvent
where
    F: FnMut(&ServerEvent) -> bool,
{
    timeout(Duration::from_secs(10), async {
        loop {
            let event = connection
                .next_event()
                .await
                .expect("connection closed while waiting for event");
            if accept(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use shared::protocol::{msg, Envelope, GameStart, Ready};

    #[test]
    fn envelope_shape_on_the_wire() {
        let env = Envelope::new(msg::READY, &Ready { ready: true });
        let text = serde_json::to_string(&env).unwrap();
        assert_eq!(text, r#"{"type":"ready","payload":{"ready":true}}"#);
    }

    #[test]
    fn envelope_two_step_decode() {
        let text = r#"{"type":"game_start","payload":{"seed":42,"players":["a","b"]}}"#;
        let env: Envelope = serde_json::from_str(text).unwrap();
        assert_eq!(env.kind, msg::GAME_START);

        let start: GameStart = env.decode().unwrap();
        assert_eq!(start.seed, 42);
        assert_eq!(start.players.len(), 2);
    }

    #[test]
    fn unknown_envelope_type_still_parses() {
        // The outer decode succeeds; handlers drop the unknown tag.
        let env: Envelope =
            serde_json::from_str(r#"{"type":"telepathy","payload":{"thought":1}}"#).unwrap();
        assert_eq!(env.kind, "telepathy");
    }
}

/// DETERMINISM TESTS
mod determinism_tests {
    use shared::{GameState, PieceGenerator};

    #[test]
    fn generators_with_equal_seeds_agree_indefinitely() {
        for seed in [0u64, 1, 7, u64::MAX] {
            let mut a = PieceGenerator::new(seed);
            let mut b = PieceGenerator::new(seed);
            for _ in 0..140 {
                assert_eq!(a.next_piece().kind, b.next_piece().kind);
            }
        }
    }

    #[test]
    fn identical_play_produces_identical_boards() {
        let mut a = GameState::new(2024);
        let mut b = GameState::new(2024);

        for _ in 0..15 {
            a.move_left();
            b.move_left();
            a.rotate();
            b.rotate();
            a.hard_drop();
            b.hard_drop();
        }

        assert_eq!(a.board.to_flat(), b.board.to_flat());
        assert_eq!(a.score, b.score);
        assert_eq!(a.lines, b.lines);
    }
}

/// FRONT DESK TESTS
mod front_desk_tests {
    use super::*;

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let base = spawn_server().await;
        let body = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn create_then_list_rooms() {
        let base = spawn_server().await;
        let api = Client::new(&base);

        let created = api.create_room("alice").await.unwrap();
        assert!(!created.join_token.is_empty());

        let rooms = api.list_rooms().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, created.room_id);
        assert_eq!(rooms[0].phase, "lobby");
        assert_eq!(rooms[0].player_count, 0);
    }

    #[tokio::test]
    async fn joining_unknown_room_fails() {
        let base = spawn_server().await;
        let api = Client::new(&base);

        let err = api.join_room("ZZZZ2", "bob").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn join_token_is_single_use() {
        let base = spawn_server().await;
        let api = Client::new(&base);

        let created = api.create_room("alice").await.unwrap();
        let _connection = api
            .connect(&created.room_id, &created.join_token)
            .await
            .unwrap();

        // The same token again must be rejected at the handshake.
        let second = api.connect(&created.room_id, &created.join_token).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn token_must_match_room() {
        let base = spawn_server().await;
        let api = Client::new(&base);

        let first = api.create_room("alice").await.unwrap();
        let second = api.create_room("carol").await.unwrap();

        let crossed = api.connect(&second.room_id, &first.join_token).await;
        assert!(crossed.is_err());
    }
}

/// MATCH LIFECYCLE TESTS
mod match_tests {
    use super::*;
    use shared::PieceGenerator;

    /// Admits two players into one room and returns their connections.
    async fn two_player_room(base: &str) -> (Client, Connection, Connection, String) {
        let api = Client::new(base);

        let created = api.create_room("alice").await.unwrap();
        let joined = api.join_room(&created.room_id, "bob").await.unwrap();

        let conn_a = api
            .connect(&created.room_id, &created.join_token)
            .await
            .unwrap();
        let conn_b = api.connect(&joined.room_id, &joined.join_token).await.unwrap();

        (api, conn_a, conn_b, created.room_id)
    }

    #[tokio::test]
    async fn full_match_flow_countdown_seed_and_garbage() {
        let base = spawn_server().await;
        let (_api, mut conn_a, mut conn_b, _room) = two_player_room(&base).await;

        // Both players see themselves and each other in the lobby.
        let id_a = match wait_for(&mut conn_a, |e| matches!(e, ServerEvent::AssignId { .. })).await
        {
            ServerEvent::AssignId { player_id } => player_id,
            _ => unreachable!(),
        };
        wait_for(&mut conn_b, |e| matches!(e, ServerEvent::AssignId { .. })).await;
        wait_for(&mut conn_a, |e| match e {
            ServerEvent::LobbyUpdate(lobby) => lobby.players.len() == 2,
            _ => false,
        })
        .await;

        conn_a.handle().send_ready(true);
        conn_b.handle().send_ready(true);

        // Countdown runs 3, 2, 1 at one-second cadence.
        let mut values = Vec::new();
        while values.len() < 3 {
            if let ServerEvent::Countdown(value) =
                wait_for(&mut conn_a, |e| matches!(e, ServerEvent::Countdown(_))).await
            {
                values.push(value);
            }
        }
        assert_eq!(values, vec![3, 2, 1]);

        let start_a = match wait_for(&mut conn_a, |e| matches!(e, ServerEvent::GameStart(_))).await
        {
            ServerEvent::GameStart(start) => start,
            _ => unreachable!(),
        };
        let start_b = match wait_for(&mut conn_b, |e| matches!(e, ServerEvent::GameStart(_))).await
        {
            ServerEvent::GameStart(start) => start,
            _ => unreachable!(),
        };

        // One shared seed, one shared roster, identical piece sequences.
        assert_eq!(start_a.seed, start_b.seed);
        assert_eq!(start_a.players, start_b.players);
        assert_eq!(start_a.players.len(), 2);

        let mut gen_a = PieceGenerator::new(start_a.seed);
        let mut gen_b = PieceGenerator::new(start_b.seed);
        for _ in 0..7 {
            assert_eq!(gen_a.next_piece().kind, gen_b.next_piece().kind);
        }

        // A four-line clear routes its garbage to the only opponent.
        conn_a.handle().send_lines_cleared(4, 4);
        let garbage =
            wait_for(&mut conn_b, |e| matches!(e, ServerEvent::ReceiveGarbage { .. })).await;
        match garbage {
            ServerEvent::ReceiveGarbage { lines, attacker_id } => {
                assert_eq!(lines, 4);
                assert_eq!(attacker_id, id_a);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn surviving_player_wins_when_opponent_dies() {
        let base = spawn_server().await;
        let (_api, mut conn_a, mut conn_b, _room) = two_player_room(&base).await;

        conn_a.handle().send_ready(true);
        conn_b.handle().send_ready(true);
        wait_for(&mut conn_a, |e| matches!(e, ServerEvent::GameStart(_))).await;
        wait_for(&mut conn_b, |e| matches!(e, ServerEvent::GameStart(_))).await;

        conn_b.handle().send_player_dead();

        let over_a = match wait_for(&mut conn_a, |e| matches!(e, ServerEvent::MatchOver(_))).await
        {
            ServerEvent::MatchOver(over) => over,
            _ => unreachable!(),
        };
        let over_b = match wait_for(&mut conn_b, |e| matches!(e, ServerEvent::MatchOver(_))).await
        {
            ServerEvent::MatchOver(over) => over,
            _ => unreachable!(),
        };

        assert_eq!(over_a.your_rank, 1);
        assert_eq!(over_b.your_rank, 2);
        assert_eq!(over_a.winner_name, "alice");
        assert_eq!(over_a.winner_id, over_b.winner_id);
    }

    #[tokio::test]
    async fn disconnect_mid_match_awards_the_survivor() {
        let base = spawn_server().await;
        let (_api, mut conn_a, conn_b, _room) = two_player_room(&base).await;

        conn_a.handle().send_ready(true);
        conn_b.handle().send_ready(true);
        wait_for(&mut conn_a, |e| matches!(e, ServerEvent::GameStart(_))).await;

        // Dropping the connection tears down both pumps client-side; the
        // server notices and treats it as a death.
        drop(conn_b);

        let over = match wait_for(&mut conn_a, |e| matches!(e, ServerEvent::MatchOver(_))).await {
            ServerEvent::MatchOver(over) => over,
            _ => unreachable!(),
        };
        assert_eq!(over.your_rank, 1);
        assert_eq!(over.winner_name, "alice");
    }

    #[tokio::test]
    async fn in_progress_room_rejects_new_joins() {
        let base = spawn_server().await;
        let (api, mut conn_a, mut conn_b, room_id) = two_player_room(&base).await;

        conn_a.handle().send_ready(true);
        conn_b.handle().send_ready(true);
        wait_for(&mut conn_a, |e| matches!(e, ServerEvent::GameStart(_))).await;

        let err = api.join_room(&room_id, "late").await.unwrap_err();
        assert!(err.to_string().contains("in progress"));
    }

    #[tokio::test]
    async fn empty_room_is_reaped_from_listing() {
        let base = spawn_server().await;
        let api = Client::new(&base);

        let created = api.create_room("alice").await.unwrap();
        let conn = api
            .connect(&created.room_id, &created.join_token)
            .await
            .unwrap();
        assert_eq!(api.list_rooms().await.unwrap().len(), 1);

        drop(conn);

        // Give the server a moment to process the disconnect.
        let mut rooms = api.list_rooms().await.unwrap();
        for _ in 0..50 {
            if rooms.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            rooms = api.list_rooms().await.unwrap();
        }
        assert!(rooms.is_empty());
    }
}
