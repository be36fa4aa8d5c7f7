//! Volatile, in-memory state of every active game.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::client::{Client, Outbound};
use super::hub::Hub;
use crate::protocol;

/// The part of a player the connection pumps need: the token for lost-player
/// notices and the idle counter that pongs reset.
#[derive(Debug)]
pub struct PlayerLiveness {
    token: String,
    idle_count: AtomicU32,
}

impl PlayerLiveness {
    pub fn new(token: String) -> Self {
        PlayerLiveness {
            token,
            idle_count: AtomicU32::new(0),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn idle_count(&self) -> u32 {
        self.idle_count.load(Ordering::Acquire)
    }

    pub fn reset_idle(&self) {
        self.idle_count.store(0, Ordering::Release);
    }

    /// Count one more cleanup tick of silence and return the new total.
    pub fn tick(&self) -> u32 {
        self.idle_count.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Serialize for PlayerLiveness {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Player", 2)?;
        s.serialize_field("token", &self.token)?;
        s.serialize_field("idleCount", &self.idle_count())?;
        s.end()
    }
}

/// One participant of a game, tracked independently of its connection.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct Player {
    liveness: Arc<PlayerLiveness>,
    #[serde(skip)]
    client: Option<Arc<Client>>,
}

impl Player {
    fn new(token: &str) -> Self {
        Player {
            liveness: Arc::new(PlayerLiveness::new(token.to_string())),
            client: None,
        }
    }

    pub fn token(&self) -> &str {
        self.liveness.token()
    }

    pub fn idle_count(&self) -> u32 {
        self.liveness.idle_count()
    }

    pub(crate) fn tick(&self) -> u32 {
        self.liveness.tick()
    }

    pub fn client(&self) -> Option<&Arc<Client>> {
        self.client.as_ref()
    }

    /// Replace whatever connection this player had with a fresh client
    /// registered on `hub`. The old client is fully destroyed first.
    pub async fn attach(&mut self, hub: Hub, queue_size: usize) -> (Arc<Client>, Outbound) {
        if let Some(previous) = self.client.take() {
            previous.destroy().await;
        }
        let (client, outbound) = Client::connect(hub, self.liveness.clone(), queue_size).await;
        self.client = Some(client.clone());
        self.liveness.reset_idle();
        (client, outbound)
    }

    /// Destroy the attached client, if any.
    pub async fn disconnect(&self) {
        if let Some(client) = &self.client {
            client.destroy().await;
        }
    }
}

/// One game session and the hub that relays between its players.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    players: BTreeMap<u32, Player>,
    idle_count: u32,
    /// Zero while unknown.
    #[serde(rename = "numPlayers")]
    expected_players: usize,
    #[serde(skip)]
    hub: Hub,
}

impl Game {
    fn new(id: &str, expected_players: usize) -> Self {
        Game {
            players: BTreeMap::new(),
            idle_count: 0,
            expected_players,
            hub: Hub::spawn(id),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn expected_players(&self) -> usize {
        self.expected_players
    }

    pub fn idle_count(&self) -> u32 {
        self.idle_count
    }

    pub fn player(&self, order: u32) -> Option<&Player> {
        self.players.get(&order)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Still waiting for players: expected count unknown or not yet reached.
    pub fn is_forming(&self) -> bool {
        self.expected_players == 0 || self.players.len() < self.expected_players
    }

    /// `"<expected> <tok1> <tok2> ..."`, tokens by ascending order number.
    pub fn player_list(&self) -> String {
        protocol::player_list(self.expected_players, self.players.values().map(Player::token))
    }

    pub(crate) fn tick_idle(&mut self) -> u32 {
        self.idle_count += 1;
        self.idle_count
    }

    pub(crate) fn reset_idle(&mut self) {
        self.idle_count = 0;
    }

    pub(crate) fn remove_player(&mut self, order: u32) -> Option<Player> {
        self.players.remove(&order)
    }

    pub(crate) fn orders(&self) -> Vec<u32> {
        self.players.keys().copied().collect()
    }

    /// Destroy every attached client.
    pub async fn disconnect_all(&self) {
        for player in self.players.values() {
            player.disconnect().await;
        }
    }
}

/// Every game known to the process, plus the cleanup cycle counter.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    cleanup_counter: u64,
    games: HashMap<String, Game>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn game(&self, id: &str) -> Option<&Game> {
        self.games.get(id)
    }

    pub(crate) fn game_mut(&mut self, id: &str) -> Option<&mut Game> {
        self.games.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn cleanup_counter(&self) -> u64 {
        self.cleanup_counter
    }

    pub(crate) fn count_cleanup_cycle(&mut self) -> u64 {
        self.cleanup_counter += 1;
        self.cleanup_counter
    }

    pub(crate) fn game_ids(&self) -> Vec<String> {
        self.games.keys().cloned().collect()
    }

    pub(crate) fn remove_game(&mut self, id: &str) -> Option<Game> {
        self.games.remove(id)
    }

    /// Make sure the game and the player at `order` exist, creating either
    /// as needed, and return the game's hub with the player.
    ///
    /// A new game gets its hub started here. An unknown expected count is
    /// filled in by the first caller that knows it. An existing player has
    /// its idle count reset, since being admitted again means it is alive.
    pub fn ensure_game_and_player(
        &mut self,
        game_id: &str,
        player_token: &str,
        order: u32,
        expected_players: usize,
    ) -> (Hub, &mut Player) {
        let game = self.games.entry(game_id.to_string()).or_insert_with(|| {
            tracing::info!(game = %game_id, "new game created");
            Game::new(game_id, expected_players)
        });
        if game.expected_players == 0 {
            if expected_players != 0 {
                tracing::info!(game = %game_id, expected_players, "number of players set");
                game.expected_players = expected_players;
            }
        } else if expected_players != 0 && expected_players != game.expected_players {
            tracing::debug!(
                game = %game_id,
                kept = game.expected_players,
                ignored = expected_players,
                "conflicting player count ignored"
            );
        }
        let hub = game.hub.clone();
        let player = game
            .players
            .entry(order)
            .and_modify(|p| p.liveness.reset_idle())
            .or_insert_with(|| {
                tracing::info!(game = %game_id, order, "player added");
                Player::new(player_token)
            });
        (hub, player)
    }

    /// Destroy every attached client and forget all games.
    pub async fn reset(&mut self) {
        for game in self.games.values() {
            game.disconnect_all().await;
        }
        *self = Registry::default();
    }

    /// Pretty JSON snapshot for operators, newline-terminated.
    pub fn dump(&self) -> serde_json::Result<String> {
        let mut encoded = serde_json::to_string_pretty(self)?;
        encoded.push('\n');
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;
    use bytes::Bytes;
    use std::time::Duration;

    const GAME: &str = "anycards_abcdef";

    async fn recv(out: &mut Outbound) -> Option<Bytes> {
        tokio::time::timeout(Duration::from_secs(1), out.recv())
            .await
            .expect("timed out waiting for outbound frame")
    }

    #[tokio::test]
    async fn ensure_creates_then_reuses() {
        let mut reg = Registry::new();
        let (_, player) = reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        assert_eq!(player.idle_count(), 0);
        assert!(player.client().is_none());

        reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 0);
        assert_eq!(reg.len(), 1);
        let game = reg.game(GAME).unwrap();
        assert_eq!(game.len(), 2);
        assert_eq!(game.expected_players(), 2);
    }

    #[tokio::test]
    async fn expected_count_first_writer_wins() {
        let mut reg = Registry::new();
        reg.ensure_game_and_player(GAME, "QWxp:1", 1, 0);
        assert_eq!(reg.game(GAME).unwrap().expected_players(), 0);
        reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 3);
        reg.ensure_game_and_player(GAME, "Q2Fy:3", 3, 4);
        assert_eq!(reg.game(GAME).unwrap().expected_players(), 3);
    }

    #[tokio::test]
    async fn readmission_resets_idle_count() {
        let mut reg = Registry::new();
        {
            let (_, player) = reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
            player.liveness.tick();
            player.liveness.tick();
            assert_eq!(player.idle_count(), 2);
        }
        let (_, player) = reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        assert_eq!(player.idle_count(), 0);
    }

    #[tokio::test]
    async fn player_list_is_ordered_by_order_number() {
        let mut reg = Registry::new();
        reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 3);
        reg.ensure_game_and_player(GAME, "QWxpY2U=:1", 1, 3);
        assert_eq!(reg.game(GAME).unwrap().player_list(), "3 QWxpY2U=:1 Qm9i:2");
    }

    #[tokio::test]
    async fn reconnect_destroys_previous_client_first() {
        let mut reg = Registry::new();
        let (hub, bob) = reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 2);
        let (_bob_client, mut bob_out) = bob.attach(hub, 8).await;

        let (hub, alice) = reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        let (old, mut old_out) = alice.attach(hub.clone(), 8).await;
        let (new, mut new_out) = alice.attach(hub.clone(), 8).await;
        assert!(old.is_terminated());
        assert!(!new.is_terminated());
        assert_ne!(old.id(), new.id());

        hub.broadcast_message(MessageType::Chat, b"after").await;

        assert_eq!(recv(&mut bob_out).await.unwrap(), Bytes::from_static(b"\x04QWxp:1"));
        assert_eq!(recv(&mut bob_out).await.unwrap(), Bytes::from_static(b"\x01after"));
        // The old client left before its notice; the new one joined after it.
        assert_eq!(recv(&mut old_out).await, None);
        assert_eq!(recv(&mut new_out).await.unwrap(), Bytes::from_static(b"\x01after"));
    }

    #[tokio::test]
    async fn dump_has_operator_shape() {
        let mut reg = Registry::new();
        reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        reg.count_cleanup_cycle();

        let value: serde_json::Value = serde_json::from_str(&reg.dump().unwrap()).unwrap();
        assert_eq!(value["cleanupCounter"], 1);
        let game = &value["games"][GAME];
        assert_eq!(game["numPlayers"], 2);
        assert_eq!(game["idleCount"], 0);
        assert_eq!(game["players"]["1"]["token"], "QWxp:1");
        assert_eq!(game["players"]["1"]["idleCount"], 0);
    }

    #[tokio::test]
    async fn reset_destroys_clients_and_clears_state() {
        let mut reg = Registry::new();
        let (hub, alice) = reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        let (client, _out) = alice.attach(hub, 8).await;
        reg.count_cleanup_cycle();

        reg.reset().await;

        assert!(client.is_terminated());
        assert!(reg.is_empty());
        assert_eq!(reg.cleanup_counter(), 0);
    }
}
