//! The HTTP front desk.
//!
//! Room admission happens here, over plain request/response, before the
//! realtime upgrade: creating or joining a room hands back a room code and
//! a single-use token the client then presents to `/play`.

use crate::connection;
use crate::registry::Registry;
use crate::room::Phase;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use shared::protocol::{
    CreateRoomRequest, CreateRoomResponse, ErrorResponse, JoinRoomRequest, JoinRoomResponse,
    ListRoomsResponse,
};
use std::sync::Arc;

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/create-room", post(create_room))
        .route("/join-room", post(join_room))
        .route("/list-rooms", get(list_rooms))
        .route("/play", get(connection::ws_play))
        .route("/health", get(health))
        .with_state(registry)
}

async fn health() -> &'static str {
    "ok"
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "Player".to_string()
    } else {
        trimmed.to_string()
    }
}

async fn create_room(
    State(registry): State<Arc<Registry>>,
    Json(request): Json<CreateRoomRequest>,
) -> Response {
    let player_name = normalize_name(&request.player_name);

    let room = registry.create_room().await;
    let player_id = registry.generate_player_id().await;
    let token = registry
        .add_pending_join(room.code().to_string(), player_name.clone(), player_id)
        .await;

    info!(
        "room {} created for player {:?} (pending token)",
        room.code(),
        player_name
    );
    (
        StatusCode::OK,
        Json(CreateRoomResponse {
            room_id: room.code().to_string(),
            join_token: token,
        }),
    )
        .into_response()
}

async fn join_room(
    State(registry): State<Arc<Registry>>,
    Json(request): Json<JoinRoomRequest>,
) -> Response {
    let code = request.room_id.trim().to_uppercase();
    let Some(room) = registry.room(&code).await else {
        return error_response(StatusCode::NOT_FOUND, format!("room {:?} not found", code));
    };

    if room.phase().await != Phase::Lobby {
        return error_response(
            StatusCode::CONFLICT,
            "game already in progress".to_string(),
        );
    }

    let player_name = normalize_name(&request.player_name);
    let player_id = registry.generate_player_id().await;
    let token = registry
        .add_pending_join(code.clone(), player_name.clone(), player_id)
        .await;

    info!(
        "player {:?} joining room {} (pending token)",
        player_name, code
    );
    (
        StatusCode::OK,
        Json(JoinRoomResponse {
            room_id: code,
            join_token: token,
        }),
    )
        .into_response()
}

async fn list_rooms(State(registry): State<Arc<Registry>>) -> Json<ListRoomsResponse> {
    Json(ListRoomsResponse {
        rooms: registry.list_rooms().await,
    })
}
