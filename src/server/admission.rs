//! Checks applied to a websocket request before anything is upgraded or
//! stored.

use std::collections::HashMap;

use crate::error::AdmissionError;

pub const PLAYER_KEY: &str = "Player";
pub const GAME_TOKEN_KEY: &str = "GameToken";
pub const NUM_PLAYERS_KEY: &str = "NumPlayers";

/// A validated request to join a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRequest {
    pub game_id: String,
    pub player_token: String,
    pub order: u32,
    /// Zero when the caller does not know.
    pub expected_players: usize,
}

impl AdmissionRequest {
    /// Parse and validate the raw query string of an upgrade request.
    pub fn from_query(query: Option<&str>, min_game_token_len: usize) -> Result<Self, AdmissionError> {
        let params = single_values(query.unwrap_or(""));
        let player_token = params.get(PLAYER_KEY).cloned().unwrap_or_default();
        let game_id = params.get(GAME_TOKEN_KEY).cloned().unwrap_or_default();
        if player_token.is_empty() || game_id.is_empty() {
            return Err(AdmissionError::MissingParameters);
        }
        if !is_valid_game_token(&game_id, min_game_token_len) {
            return Err(AdmissionError::InvalidGameToken);
        }
        let order = player_order(&player_token).ok_or(AdmissionError::InvalidPlayer)?;
        let expected_players = match params.get(NUM_PLAYERS_KEY).map(String::as_str) {
            None | Some("") => 0,
            Some(n) => n.parse().map_err(|_| AdmissionError::InvalidPlayerCount)?,
        };
        tracing::debug!(%player_token, game = %game_id, expected_players, "websocket request");
        Ok(AdmissionRequest {
            game_id,
            player_token,
            order,
            expected_players,
        })
    }
}

/// Decode a query string keeping only keys that appear exactly once.
fn single_values(query: &str) -> HashMap<String, String> {
    let mut seen: HashMap<String, Option<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        seen.entry(key.into_owned())
            .and_modify(|v| *v = None)
            .or_insert_with(|| Some(value.into_owned()));
    }
    seen.into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
}

/// A game token is `<appid>_<players' token>`. Only the length and the
/// alphabet are checked here.
pub fn is_valid_game_token(token: &str, min_len: usize) -> bool {
    token.len() >= min_len
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// A player token is `<name>:<order>`. Returns the order number when the
/// token has exactly two parts and the second is a non-negative integer.
/// Order 0 is accepted.
pub fn player_order(token: &str) -> Option<u32> {
    let mut parts = token.split(':');
    let (_name, order, rest) = (parts.next()?, parts.next()?, parts.next());
    if rest.is_some() {
        return None;
    }
    order.parse().ok()
}
