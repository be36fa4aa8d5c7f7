//! Periodic eviction of silent players and games that never filled up.
//!
//! Each tick counts one unit of idleness against every player and against
//! every game still forming. Pongs and re-admissions reset a player's count;
//! a game's count only matters until it has all its players.

use tokio::time::{self, MissedTickBehavior};

use super::registry::Registry;
use super::state::AppState;

/// Tick thresholds. An entity goes once its idle count exceeds these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub player_ticks: u32,
    pub formation_ticks: u32,
}

impl From<&crate::config::Config> for Timeouts {
    fn from(cfg: &crate::config::Config) -> Self {
        Timeouts {
            player_ticks: cfg.player_timeout_ticks(),
            formation_ticks: cfg.formation_timeout_ticks(),
        }
    }
}

/// What one sweep removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub incomplete_games: Vec<String>,
    pub empty_games: Vec<String>,
    pub players: Vec<(String, u32)>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.incomplete_games.is_empty() && self.empty_games.is_empty() && self.players.is_empty()
    }
}

/// One cleanup pass over every game. Works from a snapshot of the game ids
/// so removals never disturb the iteration.
pub async fn sweep(registry: &mut Registry, timeouts: Timeouts) -> SweepReport {
    let mut report = SweepReport::default();
    for game_id in registry.game_ids() {
        let Some(game) = registry.game_mut(&game_id) else {
            continue;
        };

        if game.is_forming() {
            if game.tick_idle() > timeouts.formation_ticks {
                tracing::info!(game = %game_id, "deleting incomplete game that has passed its time limit");
                game.disconnect_all().await;
                registry.remove_game(&game_id);
                report.incomplete_games.push(game_id);
                continue;
            }
        } else {
            game.reset_idle();
        }

        for order in game.orders() {
            let Some(player) = game.player(order) else {
                continue;
            };
            if player.tick() > timeouts.player_ticks {
                tracing::info!(game = %game_id, order, "deleting idle player");
                player.disconnect().await;
                game.remove_player(order);
                report.players.push((game_id.clone(), order));
            }
        }

        if game.is_empty() {
            tracing::info!(game = %game_id, "discarding game with no players left");
            registry.remove_game(&game_id);
            report.empty_games.push(game_id);
        }
    }
    report
}

/// Run a sweep every cleanup period until the process ends.
pub async fn run_cleanup(state: AppState) {
    let period = state.config.cleanup_period();
    let timeouts = Timeouts::from(state.config.as_ref());
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let mut registry = state.registry.lock().await;
        let cycle = registry.count_cleanup_cycle();
        let report = sweep(&mut registry, timeouts).await;
        if !report.is_empty() {
            tracing::debug!(cycle, ?report, games_left = registry.len(), "cleanup finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    const GAME: &str = "anycards_abcdef";
    const TIMEOUTS: Timeouts = Timeouts {
        player_ticks: 3,
        formation_ticks: 5,
    };

    async fn sweep_times(reg: &mut Registry, n: usize) -> SweepReport {
        let mut last = SweepReport::default();
        for _ in 0..n {
            last = sweep(reg, TIMEOUTS).await;
        }
        last
    }

    #[tokio::test]
    async fn idle_count_grows_by_one_per_tick() {
        let mut reg = Registry::new();
        reg.ensure_game_and_player(GAME, "QWxp:1", 1, 1);
        sweep_times(&mut reg, 2).await;
        assert_eq!(reg.game(GAME).unwrap().player(1).unwrap().idle_count(), 2);
    }

    #[tokio::test]
    async fn incomplete_game_is_evicted_with_its_clients() {
        let mut reg = Registry::new();
        let (hub, alice) = reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        let (client, _out) = alice.attach(hub, 8).await;

        for _ in 0..TIMEOUTS.formation_ticks {
            // Keep the player itself alive so only the formation timeout applies.
            reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
            let report = sweep(&mut reg, TIMEOUTS).await;
            assert!(report.incomplete_games.is_empty());
        }
        assert_eq!(reg.game(GAME).unwrap().idle_count(), TIMEOUTS.formation_ticks);

        let report = sweep(&mut reg, TIMEOUTS).await;
        assert_eq!(report.incomplete_games, vec![GAME.to_string()]);
        assert!(reg.game(GAME).is_none());
        assert!(client.is_terminated());
    }

    #[tokio::test]
    async fn unknown_expected_count_counts_as_incomplete() {
        let mut reg = Registry::new();
        reg.ensure_game_and_player(GAME, "QWxp:1", 1, 0);
        sweep(&mut reg, TIMEOUTS).await;
        assert_eq!(reg.game(GAME).unwrap().idle_count(), 1);
    }

    #[tokio::test]
    async fn complete_game_is_never_evicted_for_formation() {
        let mut reg = Registry::new();
        reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 2);
        for _ in 0..(TIMEOUTS.formation_ticks * 3) {
            reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
            reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 2);
            let report = sweep(&mut reg, TIMEOUTS).await;
            assert!(report.is_empty());
        }
        assert_eq!(reg.game(GAME).unwrap().idle_count(), 0);
    }

    #[tokio::test]
    async fn silent_players_go_and_take_the_empty_game_with_them() {
        let mut reg = Registry::new();
        let (hub, alice) = reg.ensure_game_and_player(GAME, "QWxp:1", 1, 2);
        let (alice_client, _alice_out) = alice.attach(hub.clone(), 8).await;
        let (_, bob) = reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 2);
        let (_bob_client, mut bob_out) = bob.attach(hub, 8).await;

        // Bob keeps answering; Alice goes quiet.
        for _ in 0..TIMEOUTS.player_ticks {
            reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 2);
            assert!(sweep(&mut reg, TIMEOUTS).await.is_empty());
        }
        reg.ensure_game_and_player(GAME, "Qm9i:2", 2, 2);
        let report = sweep(&mut reg, TIMEOUTS).await;
        assert_eq!(report.players, vec![(GAME.to_string(), 1)]);
        assert!(alice_client.is_terminated());
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(1), bob_out.recv()).await.unwrap(),
            Some(Bytes::from_static(b"\x04QWxp:1"))
        );

        // Now Bob goes quiet too (already one tick in); the game disappears
        // in the same sweep that removes him.
        let report = sweep_times(&mut reg, TIMEOUTS.player_ticks as usize).await;
        assert_eq!(report.players, vec![(GAME.to_string(), 2)]);
        assert_eq!(report.empty_games, vec![GAME.to_string()]);
        assert!(reg.is_empty());
    }
}
