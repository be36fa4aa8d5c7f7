//! WebSocket admission and per-connection startup.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, RawQuery, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use owo_colors::OwoColorize;
use std::io::IsTerminal;

use super::admission::AdmissionRequest;
use super::client::{read_pump, write_pump, Client, Outbound, PumpLimits};
use super::state::AppState;
use crate::protocol::MessageType;

/// Validate the query, then upgrade. Nothing is stored for a request that
/// fails validation.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> Response {
    let request = match AdmissionRequest::from_query(query.as_deref(), state.config.min_game_token_len) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, request))
}

/// Register the player and its new client, then announce the updated player
/// list. The list is broadcast before the registry lock is released so the
/// lists of concurrent admissions reach the hub in admission order.
pub(crate) async fn admit(state: &AppState, request: &AdmissionRequest) -> (Arc<Client>, Outbound) {
    let mut registry = state.registry.lock().await;
    let (hub, player) = registry.ensure_game_and_player(
        &request.game_id,
        &request.player_token,
        request.order,
        request.expected_players,
    );
    let (client, outbound) = player.attach(hub.clone(), state.config.send_queue_size).await;
    let player_list = registry
        .game(&request.game_id)
        .map(|game| game.player_list())
        .unwrap_or_default();
    tracing::debug!(game = %request.game_id, %player_list, "sending player list");
    hub.broadcast_message(MessageType::PlayerList, player_list.as_bytes())
        .await;
    (client, outbound)
}

async fn handle_socket(socket: WebSocket, state: AppState, request: AdmissionRequest) {
    let limits = PumpLimits::from(state.config.as_ref());
    let (sink, stream) = socket.split();

    let (client, outbound) = admit(&state, &request).await;

    if std::io::stdout().is_terminal() {
        let hello = format!("{} {}", "[CONNECT]".bold().green(), request.player_token.bold());
        tracing::info!(%hello, game = %request.game_id, order = request.order);
    } else {
        tracing::info!(player = %request.player_token, game = %request.game_id, order = request.order, "client connected");
    }

    tokio::spawn(write_pump(client.clone(), sink, outbound, limits));
    tokio::spawn(read_pump(client, stream, limits));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    const GAME: &str = "anycards_abcdef";

    fn request(token: &str, order: u32) -> AdmissionRequest {
        AdmissionRequest {
            game_id: GAME.to_string(),
            player_token: token.to_string(),
            order,
            expected_players: 2,
        }
    }

    async fn last_player_list(out: &mut Outbound) -> Option<Bytes> {
        let mut last = None;
        while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(100), out.recv()).await {
            if frame.first() == Some(&MessageType::PlayerList.tag()) {
                last = Some(frame);
            }
        }
        last
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admissions_end_with_the_full_player_list() {
        let full = Bytes::from_static(b"\x032 QWxp:1 Qm9i:2");
        for _ in 0..20 {
            let state = AppState::default();
            let (alice_req, bob_req) = (request("QWxp:1", 1), request("Qm9i:2", 2));
            let ((_alice, mut alice_out), (_bob, mut bob_out)) =
                tokio::join!(admit(&state, &alice_req), admit(&state, &bob_req));

            assert_eq!(last_player_list(&mut alice_out).await, Some(full.clone()));
            assert_eq!(last_player_list(&mut bob_out).await, Some(full.clone()));
        }
    }

    #[tokio::test]
    async fn admission_announces_the_player_list_to_everyone() {
        let state = AppState::default();
        let (_alice, mut alice_out) = admit(&state, &request("QWxp:1", 1)).await;
        assert_eq!(
            last_player_list(&mut alice_out).await,
            Some(Bytes::from_static(b"\x032 QWxp:1"))
        );

        let (_bob, mut bob_out) = admit(&state, &request("Qm9i:2", 2)).await;
        let full = Some(Bytes::from_static(b"\x032 QWxp:1 Qm9i:2"));
        assert_eq!(last_player_list(&mut alice_out).await, full);
        assert_eq!(last_player_list(&mut bob_out).await, full);
    }
}
